//! Paste events as delivered by the host during the capture phase

use crate::classifier::ClipboardPayload;

/// One paste on a surface, before any host handler has seen it
#[derive(Debug, Clone, Default)]
pub struct PasteEvent {
    pub payload: ClipboardPayload,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl PasteEvent {
    pub fn new(payload: ClipboardPayload) -> Self {
        Self {
            payload,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    /// The host must not insert the clipboard content itself
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Later handlers must not see the event
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}
