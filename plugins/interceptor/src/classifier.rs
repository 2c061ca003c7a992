//! Clipboard classification

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// What a paste turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Carries both a head and a body section
    FullDocument,
    /// Anything else, left to the default paste
    Fragment,
}

fn head_regex() -> &'static Regex {
    static HEAD: OnceLock<Regex> = OnceLock::new();
    HEAD.get_or_init(|| Regex::new(r"(?i)<head(?:[^A-Za-z0-9_\-]|$)").expect("valid head regex"))
}

fn body_regex() -> &'static Regex {
    static BODY: OnceLock<Regex> = OnceLock::new();
    BODY.get_or_init(|| Regex::new(r"(?i)<body(?:[^A-Za-z0-9_\-]|$)").expect("valid body regex"))
}

/// Whether `text` holds both `<head` and `<body` markers, in any order or case.
///
/// A marker must end at a non-identifier character, so `<header>` or
/// `<body-part>` do not count.
pub fn is_full_html_document(text: &str) -> bool {
    head_regex().is_match(text) && body_regex().is_match(text)
}

pub fn classify(text: &str) -> Classification {
    if is_full_html_document(text) {
        Classification::FullDocument
    } else {
        Classification::Fragment
    }
}

/// Representations offered by the clipboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub plain: Option<String>,
    pub html: Option<String>,
}

impl ClipboardPayload {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain: Some(text.into()),
            html: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            plain: None,
            html: Some(text.into()),
        }
    }

    pub fn with_html(mut self, text: impl Into<String>) -> Self {
        self.html = Some(text.into());
        self
    }

    /// Plain text when present, HTML as a fallback
    pub fn preferred_text(&self) -> Option<&str> {
        [self.plain.as_deref(), self.html.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.is_empty())
    }
}
