//! Core data models for OffStack
//!
//! `Snippet` is the sole persisted entity. Inputs come in two shapes: a
//! `CreateSnippetInput` with the required fields, and a `SnippetPatch` where
//! every field is optional — only fields present on the patch are written,
//! absent fields are never touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored unit of captured or authored text with language/tag metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: String,
    pub title: String,
    pub code: String,
    pub language: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub folder_id: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Snippet {
    /// Searchable text below the title: code plus description.
    pub(crate) fn body_text(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => format!("{}\n{}", self.code, desc),
            _ => self.code.clone(),
        }
    }
}

/// Input for creating a snippet. `title` and `language` must be non-empty;
/// `code` may be the empty string (an empty scratch snippet is legal).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnippetInput {
    pub title: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// A partial set of field assignments applied to an existing snippet.
///
/// `None` means "leave the stored value alone" — there is deliberately no way
/// to null out a nullable column through a patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
}

impl SnippetPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.code.is_none()
            && self.language.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.folder_id.is_none()
            && self.is_favorite.is_none()
    }
}

/// Normalize a line of text for use as a title (truncate, collapse whitespace)
/// - Skips leading whitespace
/// - Collapses consecutive whitespace to single space
/// - Converts newlines/tabs to spaces
/// - Truncates at max_chars
/// - Trims trailing spaces
pub fn normalize_title(text: &str, max_chars: usize) -> String {
    let mut result = String::with_capacity(max_chars);
    let mut chars = text.chars().peekable();

    while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
        chars.next();
    }

    let mut last_was_space = false;
    let mut count = 0;

    for ch in chars {
        if count >= max_chars {
            break;
        }

        let ch = match ch {
            '\n' | '\t' | '\r' => ' ',
            c => c,
        };

        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }

        result.push(ch);
        count += 1;
    }

    while result.ends_with(' ') {
        result.pop();
    }

    result
}
