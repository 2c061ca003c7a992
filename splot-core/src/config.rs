//! Configuration management for the splot system

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::block::{LEGACY_PLACEHOLDER_TAG, PLACEHOLDER_TAG};
use crate::error::{Result, SplotError};

/// Main system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embed: EmbedConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SplotError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| SplotError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SplotError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SplotError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SplotError::Config("Invalid port number".to_string()));
        }

        for (name, path) in [
            ("server.store_path", &self.server.store_path),
            ("server.render_path", &self.server.render_path),
            ("server.nonce_path", &self.server.nonce_path),
        ] {
            if !path.starts_with('/') {
                return Err(SplotError::Config(format!(
                    "{} must start with '/': {}",
                    name, path
                )));
            }
        }

        if self.storage.backend == StorageBackend::JsonDir && self.storage.directory.is_none() {
            return Err(SplotError::Config(
                "storage.directory is required for the json_dir backend".to_string(),
            ));
        }

        if self.storage.documents.contains(&0) {
            return Err(SplotError::Config(
                "storage.documents must not contain 0".to_string(),
            ));
        }

        if self.embed.height.trim().is_empty() || self.embed.width.trim().is_empty() {
            return Err(SplotError::Config(
                "embed.width and embed.height must not be empty".to_string(),
            ));
        }

        if ![PLACEHOLDER_TAG, LEGACY_PLACEHOLDER_TAG].contains(&self.embed.placeholder_tag.as_str())
        {
            return Err(SplotError::Config(format!(
                "embed.placeholder_tag must be '{}' or '{}'",
                PLACEHOLDER_TAG, LEGACY_PLACEHOLDER_TAG
            )));
        }

        if self.security.nonce_secret.len() < 16 {
            return Err(SplotError::Config(
                "security.nonce_secret must be at least 16 characters".to_string(),
            ));
        }

        if self.security.nonce_tick_secs == 0 {
            return Err(SplotError::Config(
                "security.nonce_tick_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub enable_cors: bool,
    pub request_timeout_secs: Option<u64>,
    /// Endpoint accepting store requests
    pub store_path: String,
    /// Endpoint expanding placeholders in submitted text
    pub render_path: String,
    /// Endpoint issuing editor bootstrap data
    pub nonce_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
            request_timeout_secs: Some(30),
            store_path: "/api/splot-html".to_string(),
            render_path: "/api/render".to_string(),
            nonce_path: "/api/bootstrap".to_string(),
        }
    }
}

/// Storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    JsonDir,
}

/// Document storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub directory: Option<PathBuf>,
    /// Documents created at startup
    pub documents: Vec<u64>,
}

/// Presentation of the embedded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub sandbox: Vec<String>,
    pub width: String,
    pub height: String,
    pub border: String,
    /// Tag written by the interceptor
    pub placeholder_tag: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            sandbox: vec!["allow-scripts".to_string(), "allow-same-origin".to_string()],
            width: "100%".to_string(),
            height: "600px".to_string(),
            border: "1px solid #ccc".to_string(),
            placeholder_tag: PLACEHOLDER_TAG.to_string(),
        }
    }
}

/// Anti-replay tokens and edit permissions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub nonce_secret: String,
    /// Length of one validity tick, a token is accepted for two ticks
    pub nonce_tick_secs: u64,
    /// Any authenticated caller may edit any existing document
    pub allow_any_editor: bool,
    /// Per-user document grants used when `allow_any_editor` is off
    pub editors: HashMap<String, Vec<u64>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            nonce_secret: uuid::Uuid::new_v4().simple().to_string(),
            nonce_tick_secs: 12 * 60 * 60,
            allow_any_editor: true,
            editors: HashMap::new(),
        }
    }
}
