//! Anti-replay tokens and edit permission checks

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::SecurityConfig;
use crate::document::DocumentId;

/// Action every store request must carry a token for
pub const STORE_ACTION: &str = "cogdog_splot_html";

const TOKEN_HEX_LEN: usize = 20;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies action-bound, time-limited tokens.
///
/// A token is an HMAC keyed by the secret over the action, the caller and the
/// current tick; it verifies during the tick it was issued in and the following one.
#[derive(Clone)]
pub struct NonceManager {
    mac: HmacSha256,
    tick_secs: u64,
}

impl NonceManager {
    pub fn new(secret: impl AsRef<[u8]>, tick_secs: u64) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())
                .expect("HMAC accepts keys of any length"),
            tick_secs: tick_secs.max(1),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.nonce_secret.clone(), config.nonce_tick_secs)
    }

    fn current_tick(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now / self.tick_secs
    }

    fn token_for_tick(&self, action: &str, principal: Option<&str>, tick: u64) -> String {
        let mut mac = self.mac.clone();
        mac.update(action.as_bytes());
        mac.update(b"|");
        mac.update(principal.unwrap_or("").as_bytes());
        mac.update(b"|");
        mac.update(&tick.to_be_bytes());
        let mut token = hex::encode(mac.finalize().into_bytes());
        token.truncate(TOKEN_HEX_LEN);
        token
    }

    /// Issue a token for `action` on behalf of `principal`
    pub fn create(&self, action: &str, principal: Option<&str>) -> String {
        self.token_for_tick(action, principal, self.current_tick())
    }

    /// Check a token against the current and the previous tick
    pub fn verify(&self, token: &str, action: &str, principal: Option<&str>) -> bool {
        if token.len() != TOKEN_HEX_LEN {
            return false;
        }
        let tick = self.current_tick();
        [tick, tick.saturating_sub(1)]
            .iter()
            .any(|t| {
                let expected = self.token_for_tick(action, principal, *t);
                bool::from(expected.as_bytes().ct_eq(token.as_bytes()))
            })
    }
}

/// Decides whether a caller may modify a document
pub trait AccessPolicy: Send + Sync {
    fn can_edit(&self, principal: Option<&str>, document: DocumentId) -> bool;
}

/// Policy built from the security section of the configuration
#[derive(Debug, Clone, Default)]
pub struct ConfiguredAccessPolicy {
    allow_any_editor: bool,
    grants: HashMap<String, HashSet<DocumentId>>,
}

impl ConfiguredAccessPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let grants = config
            .editors
            .iter()
            .map(|(user, docs)| {
                let docs = docs.iter().copied().filter_map(DocumentId::new).collect();
                (user.clone(), docs)
            })
            .collect();

        Self {
            allow_any_editor: config.allow_any_editor,
            grants,
        }
    }

    /// Policy granting every caller every document
    pub fn allow_all() -> Self {
        Self {
            allow_any_editor: true,
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, user: impl Into<String>, document: DocumentId) -> Self {
        self.grants.entry(user.into()).or_default().insert(document);
        self
    }
}

impl AccessPolicy for ConfiguredAccessPolicy {
    fn can_edit(&self, principal: Option<&str>, document: DocumentId) -> bool {
        if self.allow_any_editor {
            return true;
        }
        principal
            .and_then(|user| self.grants.get(user))
            .is_some_and(|docs| docs.contains(&document))
    }
}
