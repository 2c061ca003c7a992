//! Event system for decoupled communication between components

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::block::BlockId;
use crate::document::DocumentId;
use crate::error::Result;

/// Event bus for publishing and subscribing to system events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a system event to all subscribers
    async fn publish_system_event(&self, event: SystemEvent) -> Result<()>;

    /// Subscribe to system events
    async fn subscribe_system_events(
        &self,
        handler: Arc<dyn SystemEventHandler>,
    ) -> Result<SubscriptionId>;

    /// Unsubscribe from events
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Get the number of active subscriptions
    async fn subscription_count(&self) -> usize;
}

/// Handler for system events
#[async_trait]
pub trait SystemEventHandler: Send + Sync {
    /// Handle a system event
    async fn handle_system_event(&self, event: &SystemEvent) -> Result<()>;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str {
        "UnnamedSystemEventHandler"
    }
}

/// Unique identifier for event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Why a placeholder rendered as a diagnostic instead of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnresolvedReason {
    MissingId,
    NoDocumentContext,
    NotFound,
    StoreError,
}

/// System events that can occur during operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemEvent {
    /// An editing surface became available and the interceptor attached to it
    SurfaceAttached {
        surface_id: String,
        timestamp: SystemTime,
    },
    /// A paste was classified as a full document and taken over
    PasteIntercepted {
        surface_id: String,
        payload_len: usize,
        timestamp: SystemTime,
    },
    /// A document was written under a new block id
    BlockStored {
        document: DocumentId,
        block_id: BlockId,
        bytes: usize,
        timestamp: SystemTime,
    },
    /// A placeholder token was written into a surface
    PlaceholderInserted {
        surface_id: String,
        block_id: BlockId,
        timestamp: SystemTime,
    },
    /// Surface content changed, dependents should refresh
    SurfaceChanged {
        surface_id: String,
        timestamp: SystemTime,
    },
    /// A placeholder was expanded into a frame
    PlaceholderResolved {
        document: DocumentId,
        block_id: BlockId,
        timestamp: SystemTime,
    },
    /// A placeholder rendered as a diagnostic marker
    PlaceholderUnresolved {
        document: Option<DocumentId>,
        reason: UnresolvedReason,
        timestamp: SystemTime,
    },
    /// HTTP server is listening
    ServerStarted {
        address: String,
        timestamp: SystemTime,
    },
    /// An HTTP handler was registered
    HandlerRegistered {
        route: String,
        timestamp: SystemTime,
    },
    /// System error occurred
    Error {
        source: String,
        message: String,
        timestamp: SystemTime,
    },
}

impl SystemEvent {
    pub fn surface_attached(surface_id: impl Into<String>) -> Self {
        Self::SurfaceAttached {
            surface_id: surface_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn paste_intercepted(surface_id: impl Into<String>, payload_len: usize) -> Self {
        Self::PasteIntercepted {
            surface_id: surface_id.into(),
            payload_len,
            timestamp: SystemTime::now(),
        }
    }

    pub fn block_stored(document: DocumentId, block_id: BlockId, bytes: usize) -> Self {
        Self::BlockStored {
            document,
            block_id,
            bytes,
            timestamp: SystemTime::now(),
        }
    }

    pub fn placeholder_inserted(surface_id: impl Into<String>, block_id: BlockId) -> Self {
        Self::PlaceholderInserted {
            surface_id: surface_id.into(),
            block_id,
            timestamp: SystemTime::now(),
        }
    }

    pub fn surface_changed(surface_id: impl Into<String>) -> Self {
        Self::SurfaceChanged {
            surface_id: surface_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn placeholder_resolved(document: DocumentId, block_id: BlockId) -> Self {
        Self::PlaceholderResolved {
            document,
            block_id,
            timestamp: SystemTime::now(),
        }
    }

    pub fn placeholder_unresolved(document: Option<DocumentId>, reason: UnresolvedReason) -> Self {
        Self::PlaceholderUnresolved {
            document,
            reason,
            timestamp: SystemTime::now(),
        }
    }

    pub fn server_started(address: impl Into<String>) -> Self {
        Self::ServerStarted {
            address: address.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn handler_registered(route: impl Into<String>) -> Self {
        Self::HandlerRegistered {
            route: route.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            source: source.into(),
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Get the event type identifier
    pub fn event_type(&self) -> &str {
        match self {
            SystemEvent::SurfaceAttached { .. } => "surface_attached",
            SystemEvent::PasteIntercepted { .. } => "paste_intercepted",
            SystemEvent::BlockStored { .. } => "block_stored",
            SystemEvent::PlaceholderInserted { .. } => "placeholder_inserted",
            SystemEvent::SurfaceChanged { .. } => "surface_changed",
            SystemEvent::PlaceholderResolved { .. } => "placeholder_resolved",
            SystemEvent::PlaceholderUnresolved { .. } => "placeholder_unresolved",
            SystemEvent::ServerStarted { .. } => "server_started",
            SystemEvent::HandlerRegistered { .. } => "handler_registered",
            SystemEvent::Error { .. } => "error",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SystemEvent::SurfaceAttached { surface_id, .. } => {
                format!("Attached paste interceptor to {}", surface_id)
            }
            SystemEvent::PasteIntercepted {
                surface_id,
                payload_len,
                ..
            } => format!(
                "Intercepted {} byte document pasted into {}",
                payload_len, surface_id
            ),
            SystemEvent::BlockStored {
                document,
                block_id,
                bytes,
                ..
            } => format!("Stored {} bytes as {} on document {}", bytes, block_id, document),
            SystemEvent::PlaceholderInserted {
                surface_id,
                block_id,
                ..
            } => format!("Inserted placeholder {} into {}", block_id, surface_id),
            SystemEvent::SurfaceChanged { surface_id, .. } => {
                format!("Surface {} changed", surface_id)
            }
            SystemEvent::PlaceholderResolved {
                document, block_id, ..
            } => format!("Resolved {} on document {}", block_id, document),
            SystemEvent::PlaceholderUnresolved {
                document, reason, ..
            } => match document {
                Some(document) => {
                    format!("Unresolved placeholder on document {}: {:?}", document, reason)
                }
                None => format!("Unresolved placeholder without document: {:?}", reason),
            },
            SystemEvent::ServerStarted { address, .. } => {
                format!("Server listening on {}", address)
            }
            SystemEvent::HandlerRegistered { route, .. } => {
                format!("Registered handler {}", route)
            }
            SystemEvent::Error {
                source, message, ..
            } => format!("Error in {}: {}", source, message),
        }
    }
}

/// In-memory implementation of the event bus
pub struct InMemoryEventBus {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<dyn SystemEventHandler>>>,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_system_event(&self, event: SystemEvent) -> Result<()> {
        let handlers: Vec<Arc<dyn SystemEventHandler>> =
            self.subscriptions.read().await.values().cloned().collect();

        if handlers.is_empty() {
            tracing::trace!("No subscribers for event type: {}", event.event_type());
            return Ok(());
        }

        let mut handlers_called = 0;
        for handler in handlers {
            if let Err(e) = handler.handle_system_event(&event).await {
                tracing::error!(
                    "Handler {} failed to process event {}: {}",
                    handler.handler_name(),
                    event.event_type(),
                    e
                );
            } else {
                handlers_called += 1;
            }
        }

        tracing::debug!(
            "Routed event {} to {} handlers: {}",
            event.event_type(),
            handlers_called,
            event.description()
        );
        Ok(())
    }

    async fn subscribe_system_events(
        &self,
        handler: Arc<dyn SystemEventHandler>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new();
        tracing::debug!(
            "Created subscription {:?} for handler {}",
            id,
            handler.handler_name()
        );
        self.subscriptions.write().await.insert(id, handler);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.subscriptions.write().await.remove(&id).is_some() {
            tracing::debug!("Removed subscription: {:?}", id);
        } else {
            tracing::warn!("Attempted to remove non-existent subscription: {:?}", id);
        }
        Ok(())
    }

    async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

/// Handler that records every event it sees, used by tests across the workspace
#[derive(Default)]
pub struct RecordingHandler {
    events: RwLock<Vec<SystemEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SystemEvent> {
        self.events.read().await.clone()
    }

    /// Types of the recorded events in order
    pub async fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }
}

#[async_trait]
impl SystemEventHandler for RecordingHandler {
    async fn handle_system_event(&self, event: &SystemEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "recording-handler"
    }
}
