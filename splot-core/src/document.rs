//! Document identifiers and the shared lookup order used to find them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Query parameter set by frontend editing forms
pub const WRITE_ID_PARAM: &str = "wid";

/// Query parameter set by the back-office editor
pub const POST_PARAM: &str = "post";

/// Form field carrying the id on the editing page
pub const POST_ID_FIELD: &str = "post_ID";

/// Identifier of the text container being edited or rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Create an id, zero is never a usable document
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Parse a textual candidate such as a query value or form field
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().and_then(Self::new)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resolved document id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentIdSource {
    WriteIdParam,
    CurrentDocument,
    PostParam,
    FormField,
}

/// Every place a document id can be read from, consulted in one fixed order:
/// `wid` query parameter, current document, `post` query parameter, form field.
///
/// Both the interceptor and the server-side bootstrap use this same type so the
/// order cannot drift between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub write_id_param: Option<String>,
    pub current_document: Option<DocumentId>,
    pub post_param: Option<String>,
    pub form_field: Option<String>,
}

impl DocumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for rendering a known document
    pub fn for_document(id: DocumentId) -> Self {
        Self {
            current_document: Some(id),
            ..Self::default()
        }
    }

    /// Build from a query string such as `wid=12&x=y` (leading `?` allowed)
    pub fn from_query(query: &str) -> Self {
        let params: HashMap<String, String> =
            url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect();
        Self::from_params(&params)
    }

    /// Build from already-decoded query parameters
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            write_id_param: params.get(WRITE_ID_PARAM).cloned(),
            post_param: params.get(POST_PARAM).cloned(),
            ..Self::default()
        }
    }

    pub fn with_write_id_param(mut self, value: impl Into<String>) -> Self {
        self.write_id_param = Some(value.into());
        self
    }

    pub fn with_current_document(mut self, id: DocumentId) -> Self {
        self.current_document = Some(id);
        self
    }

    pub fn with_post_param(mut self, value: impl Into<String>) -> Self {
        self.post_param = Some(value.into());
        self
    }

    pub fn with_form_field(mut self, value: impl Into<String>) -> Self {
        self.form_field = Some(value.into());
        self
    }

    /// Resolve the id along with the source it came from.
    ///
    /// A source that is present but not a usable id falls through to the next one.
    pub fn resolve_with_source(&self) -> Option<(DocumentId, DocumentIdSource)> {
        let parse = |value: &Option<String>| value.as_deref().and_then(DocumentId::parse);

        parse(&self.write_id_param)
            .map(|id| (id, DocumentIdSource::WriteIdParam))
            .or_else(|| {
                self.current_document
                    .map(|id| (id, DocumentIdSource::CurrentDocument))
            })
            .or_else(|| parse(&self.post_param).map(|id| (id, DocumentIdSource::PostParam)))
            .or_else(|| parse(&self.form_field).map(|id| (id, DocumentIdSource::FormField)))
    }

    pub fn resolve(&self) -> Option<DocumentId> {
        self.resolve_with_source().map(|(id, _)| id)
    }
}
