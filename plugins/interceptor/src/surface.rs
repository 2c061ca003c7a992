//! Editing surfaces the interceptor writes placeholders into

use serde::{Deserialize, Serialize};

/// Selection range in byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
    pub start: usize,
    pub end: usize,
}

impl TextSelection {
    pub fn new(start: usize, end: usize) -> Self {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        Self { start, end }
    }

    /// Collapsed selection at `offset`
    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Text content plus the selection a paste would land on.
///
/// A textarea always has a caret; a content-editable region may have no
/// active selection, in which case nothing can be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSurface {
    id: String,
    content: String,
    selection: Option<TextSelection>,
    revision: u64,
}

impl EditorSurface {
    /// A textarea with the caret at the end of `content`
    pub fn plain_input(id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let caret = TextSelection::caret(content.len());
        Self {
            id: id.into(),
            content,
            selection: Some(caret),
            revision: 0,
        }
    }

    /// A rich text region without an active selection
    pub fn rich_text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            selection: None,
            revision: 0,
        }
    }

    /// Select `start..end`, clamped to the content and to char boundaries
    pub fn with_selection(mut self, start: usize, end: usize) -> Self {
        self.select(start, end);
        self
    }

    pub fn select(&mut self, start: usize, end: usize) {
        let selection = TextSelection::new(self.clamp(start), self.clamp(end));
        self.selection = Some(selection);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn selection(&self) -> Option<TextSelection> {
        self.selection
    }

    /// Incremented on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn clamp(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.content.len());
        while !self.content.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Replace the selection with `text` and collapse the caret after it.
    ///
    /// Returns `false` and leaves the surface untouched when there is no
    /// selection to insert at.
    pub fn insert_at_selection(&mut self, text: &str) -> bool {
        let Some(selection) = self.selection else {
            return false;
        };

        let start = self.clamp(selection.start);
        let end = self.clamp(selection.end).max(start);
        self.content.replace_range(start..end, text);
        self.selection = Some(TextSelection::caret(start + text.len()));
        self.revision += 1;
        true
    }
}
