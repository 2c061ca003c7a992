//! Error handling for the splot system

use thiserror::Error;

/// Result type alias for splot operations
pub type Result<T> = std::result::Result<T, SplotError>;

/// Main error type for the splot system
#[derive(Error, Debug)]
pub enum SplotError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plugin-related errors
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Event bus errors
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network/server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Rendering errors
    #[error("Rendering error: {0}")]
    Rendering(String),

    /// Anti-replay token missing or not valid for the requested action
    #[error("Invalid authorization: {0}")]
    InvalidAuthorization(String),

    /// Document id or payload absent
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Caller may not modify the target document
    #[error("Insufficient permissions: {0}")]
    InsufficientPermission(String),

    /// Nothing stored under the requested key
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store request never produced a usable response
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Transport-encoded payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SplotError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new plugin error
    pub fn plugin<S: Into<String>>(msg: S) -> Self {
        Self::Plugin(msg.into())
    }

    /// Create a new event bus error
    pub fn event_bus<S: Into<String>>(msg: S) -> Self {
        Self::EventBus(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new server error
    pub fn server<S: Into<String>>(msg: S) -> Self {
        Self::Server(msg.into())
    }

    /// Create a new rendering error
    pub fn rendering<S: Into<String>>(msg: S) -> Self {
        Self::Rendering(msg.into())
    }

    pub fn invalid_authorization<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAuthorization(msg.into())
    }

    pub fn missing_input<S: Into<String>>(msg: S) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn insufficient_permission<S: Into<String>>(msg: S) -> Self {
        Self::InsufficientPermission(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Stable machine-readable name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            SplotError::Config(_) => "config",
            SplotError::Plugin(_) => "plugin",
            SplotError::EventBus(_) => "event_bus",
            SplotError::Storage(_) => "storage",
            SplotError::Server(_) => "server",
            SplotError::Rendering(_) => "rendering",
            SplotError::InvalidAuthorization(_) => "invalid_authorization",
            SplotError::MissingInput(_) => "missing_input",
            SplotError::InsufficientPermission(_) => "insufficient_permission",
            SplotError::NotFound(_) => "not_found",
            SplotError::Transport(_) => "transport_failure",
            SplotError::Decode(_) => "decode",
            SplotError::Io(_) => "io",
            SplotError::Json(_) => "json",
        }
    }

    /// Whether the error was raised before any storage effect could happen
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SplotError::InvalidAuthorization(_)
                | SplotError::MissingInput(_)
                | SplotError::InsufficientPermission(_)
                | SplotError::Decode(_)
        )
    }
}
