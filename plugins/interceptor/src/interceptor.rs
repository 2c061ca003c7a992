//! Paste interception: full documents go to the gateway, a placeholder comes back

use std::sync::Arc;

use splot_core::block::placeholder_with_tag;
use splot_core::{
    BlockId, DocumentContext, DocumentId, EventBus, PersistenceGateway, StoreRequest,
    SystemEvent,
};

use crate::classifier::is_full_html_document;
use crate::paste::PasteEvent;
use crate::surface::EditorSurface;

/// Per editing session settings
#[derive(Debug, Clone)]
pub struct InterceptorSettings {
    /// Anti-replay token issued for this session
    pub nonce: String,
    /// Where the Document Id comes from
    pub context: DocumentContext,
    /// Caller the nonce was issued to
    pub principal: Option<String>,
    /// Tag written into placeholders
    pub placeholder_tag: String,
}

impl InterceptorSettings {
    pub fn new(nonce: impl Into<String>, context: DocumentContext) -> Self {
        Self {
            nonce: nonce.into(),
            context,
            principal: None,
            placeholder_tag: splot_core::block::PLACEHOLDER_TAG.to_string(),
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_placeholder_tag(mut self, tag: impl Into<String>) -> Self {
        self.placeholder_tag = tag.into();
        self
    }
}

/// Attachment lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    Attached { surface_id: String },
}

/// A taken-over paste waiting for its store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStore {
    pub document: DocumentId,
    pub html: String,
}

/// Result of the synchronous half of paste handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not ours, the default paste proceeds
    PassThrough,
    /// Taken over but no Document Id could be found, nothing is stored
    Dropped,
    Pending(PendingStore),
}

/// Final outcome of one paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    PassedThrough,
    Dropped,
    /// Stored and the placeholder written into the surface
    Inserted { block_id: BlockId, placeholder: String },
    /// Stored, but the surface had nowhere to put the placeholder
    NotInserted { block_id: BlockId },
    /// The store call failed, the paste is lost
    Failed { reason: String },
}

/// Watches pastes on one surface and swaps full documents for placeholders
pub struct PasteInterceptor {
    gateway: Arc<dyn PersistenceGateway>,
    settings: InterceptorSettings,
    state: AttachState,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl PasteInterceptor {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, settings: InterceptorSettings) -> Self {
        Self {
            gateway,
            settings,
            state: AttachState::Detached,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &InterceptorSettings {
        &self.settings
    }

    pub fn state(&self) -> &AttachState {
        &self.state
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, AttachState::Attached { .. })
    }

    /// Host notification that a surface exists. Attaches on the first call
    /// only, returns whether this call attached.
    pub async fn on_surface_available(&mut self, surface: &EditorSurface) -> bool {
        if self.is_attached() {
            return false;
        }

        tracing::info!("Paste interceptor attached to surface {}", surface.id());
        self.state = AttachState::Attached {
            surface_id: surface.id().to_string(),
        };
        self.publish(SystemEvent::surface_attached(surface.id())).await;
        true
    }

    fn watches(&self, surface: &EditorSurface) -> bool {
        matches!(&self.state, AttachState::Attached { surface_id } if surface_id == surface.id())
    }

    /// Inspect a paste before the host does. Full documents are taken over:
    /// the default is prevented and propagation stopped.
    pub async fn intercept(&self, surface: &EditorSurface, event: &mut PasteEvent) -> Interception {
        if !self.watches(surface) {
            return Interception::PassThrough;
        }

        let Some(text) = event.payload.preferred_text() else {
            return Interception::PassThrough;
        };
        if !is_full_html_document(text) {
            return Interception::PassThrough;
        }

        let html = text.to_string();
        event.prevent_default();
        event.stop_propagation();

        tracing::debug!(
            "Intercepted full document paste ({} bytes) on {}",
            html.len(),
            surface.id()
        );
        self.publish(SystemEvent::paste_intercepted(surface.id(), html.len()))
            .await;

        match self.settings.context.resolve() {
            Some(document) => Interception::Pending(PendingStore { document, html }),
            None => {
                tracing::debug!("No document id available, dropping paste");
                Interception::Dropped
            }
        }
    }

    /// Store a taken-over paste and put its placeholder where the paste would
    /// have landed. Failures leave the surface untouched.
    pub async fn complete(
        &self,
        pending: PendingStore,
        surface: &mut EditorSurface,
    ) -> PasteOutcome {
        let mut request = StoreRequest::encoded(
            self.settings.nonce.clone(),
            pending.document,
            &pending.html,
        );
        request.principal = self.settings.principal.clone();

        let block_id = match self.gateway.store(request).await {
            Ok(block_id) => block_id,
            Err(e) => {
                tracing::debug!("Store failed, paste dropped: {}", e);
                return PasteOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let placeholder = placeholder_with_tag(&self.settings.placeholder_tag, &block_id);
        if !surface.insert_at_selection(&placeholder) {
            tracing::debug!("Surface {} has no selection, placeholder not inserted", surface.id());
            return PasteOutcome::NotInserted { block_id };
        }

        self.publish(SystemEvent::placeholder_inserted(surface.id(), block_id.clone()))
            .await;
        self.publish(SystemEvent::surface_changed(surface.id())).await;

        PasteOutcome::Inserted {
            block_id,
            placeholder,
        }
    }

    /// Run a paste through interception and, when taken over, completion
    pub async fn handle_paste(
        &self,
        surface: &mut EditorSurface,
        event: &mut PasteEvent,
    ) -> PasteOutcome {
        match self.intercept(surface, event).await {
            Interception::PassThrough => PasteOutcome::PassedThrough,
            Interception::Dropped => PasteOutcome::Dropped,
            Interception::Pending(pending) => self.complete(pending, surface).await,
        }
    }

    async fn publish(&self, event: SystemEvent) {
        if let Some(event_bus) = &self.event_bus {
            if let Err(e) = event_bus.publish_system_event(event).await {
                tracing::warn!("Failed to publish interceptor event: {}", e);
            }
        }
    }
}
