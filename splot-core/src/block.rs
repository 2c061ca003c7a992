//! Block identifiers, storage keys and the placeholder token format

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Prefix of every generated block id
pub const BLOCK_ID_PREFIX: &str = "splot_html_";

/// Namespace for the per-document storage key of a block
pub const META_KEY_PREFIX: &str = "_cogdog_splot_html_";

/// Tag written into edited text
pub const PLACEHOLDER_TAG: &str = "placeholder";

/// Tag emitted by earlier versions, still resolved on render
pub const LEGACY_PLACEHOLDER_TAG: &str = "splot-html";

/// Identifier of one stored HTML document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId(String);

impl BlockId {
    /// Mint a fresh id.
    ///
    /// The suffix is the current time in microseconds (hex) followed by random
    /// bits, so ids stay unique across restarts as well as within one process.
    pub fn generate() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        let entropy = Uuid::new_v4().simple().to_string();
        Self(format!("{}{:x}{}", BLOCK_ID_PREFIX, micros, &entropy[..10]))
    }

    /// Parse an id taken from a placeholder attribute
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(is_id_char) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key this block lives under inside its document
    pub fn meta_key(&self) -> String {
        format!("{}{}", META_KEY_PREFIX, self.0)
    }

    /// Placeholder token referencing this block
    pub fn placeholder(&self) -> String {
        placeholder_with_tag(PLACEHOLDER_TAG, self)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BlockId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        BlockId::parse(&value).ok_or_else(|| format!("invalid block id: {:?}", value))
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Build a token with an explicit tag name
pub fn placeholder_with_tag(tag: &str, id: &BlockId) -> String {
    format!("[{} id=\"{}\"]", tag, id)
}

/// One placeholder occurrence found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    /// Byte range of the whole token
    pub range: Range<usize>,
    /// Tag name the token was written with
    pub tag: String,
    /// Raw `id` attribute, `None` when the token carries no id
    pub raw_id: Option<String>,
}

impl PlaceholderMatch {
    /// Parsed block id, `None` when absent or outside the id alphabet
    pub fn block_id(&self) -> Option<BlockId> {
        self.raw_id.as_deref().and_then(BlockId::parse)
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\[(placeholder|splot-html)((?:\s[^\]]*)?)\]").expect("valid token regex")
    })
}

fn id_attr_regex() -> &'static Regex {
    static ID_ATTR: OnceLock<Regex> = OnceLock::new();
    ID_ATTR.get_or_init(|| {
        Regex::new(r#"(?:^|\s)id\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"']+))"#)
            .expect("valid id attribute regex")
    })
}

/// Find every placeholder token in `text`, in order of appearance
pub fn scan_placeholders(text: &str) -> Vec<PlaceholderMatch> {
    token_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let tag = caps.get(1)?.as_str().to_string();
            let attrs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let raw_id = id_attr_regex().captures(attrs).and_then(|id| {
                id.get(1)
                    .or_else(|| id.get(2))
                    .or_else(|| id.get(3))
                    .map(|m| m.as_str().to_string())
            });
            Some(PlaceholderMatch {
                range: whole.range(),
                tag,
                raw_id,
            })
        })
        .collect()
}
