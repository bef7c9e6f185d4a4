//! Capture ingestion adapter
//!
//! Consumes `CapturePayload` events from the external capture pipeline (the
//! hotkey/clipboard side that classified the text) and turns them into
//! snippet creations. Store failures of any kind collapse into a single
//! capture-error signal: the producing pipeline cannot act on fine-grained
//! error distinctions, and a failed capture is reported once and dropped —
//! the user re-triggers capture.

use crate::error::StoreError;
use crate::models::{normalize_title, CreateSnippetInput, Snippet};
use crate::store::SnippetStore;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Event name the capture pipeline emits on a successful capture
pub const CAPTURE_EVENT: &str = "snippet-captured";
/// Event name for capture failures
pub const CAPTURE_ERROR_EVENT: &str = "snippet-capture-error";

/// Derived titles are cut at this many characters
const TITLE_MAX_CHARS: usize = 80;

/// Payload emitted when text is captured via hotkey
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    pub text: String,
    pub is_code: bool,
    #[serde(default)]
    pub source_app: Option<String>,
    pub platform: String,
    /// Capture time as reported by the pipeline; distinct from the store's
    /// own created_at/updated_at.
    pub timestamp: String,
}

/// Outcome of ingesting one capture payload
#[derive(Debug, Clone)]
pub enum CaptureSignal {
    Captured { snippet: Snippet },
    Error { message: String },
}

/// Markers that identify a language when the pipeline classified the capture
/// as code. First hit wins; order goes from distinctive to generic.
static LANGUAGE_MARKERS: Lazy<Vec<(&'static str, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        ("rust", &["fn ", "let mut ", "impl ", "pub fn", "::<"] as &[_]),
        ("python", &["def ", "import ", "elif ", "self."]),
        ("go", &["func ", "package main", ":= "]),
        ("java", &["public class ", "public static void", "System.out"]),
        ("c", &["#include", "printf(", "int main("]),
        ("shell", &["#!/bin/", "echo ", "fi\n"]),
        ("javascript", &["function ", "const ", "=> ", "console.log"]),
    ]
});

/// Infer a language tag from captured code. Returns "unknown" when nothing
/// distinctive is found.
pub fn infer_language(text: &str) -> &'static str {
    for (language, markers) in LANGUAGE_MARKERS.iter() {
        if markers.iter().any(|m| text.contains(m)) {
            return language;
        }
    }
    "unknown"
}

/// Title rule for raw captures: first non-empty line, whitespace-normalized,
/// truncated. Empty text yields an empty title, which the store rejects.
fn derive_title(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| normalize_title(line, TITLE_MAX_CHARS))
        .unwrap_or_default()
}

/// Turns capture events into snippet creations against one store
pub struct CaptureIngestor {
    store: Arc<SnippetStore>,
}

impl CaptureIngestor {
    pub fn new(store: Arc<SnippetStore>) -> Self {
        Self { store }
    }

    /// Ingest one payload. Never returns an error: every store failure is
    /// converted into a `CaptureSignal::Error` with a human-readable message.
    /// No retries — a failed capture is reported once and dropped.
    pub fn ingest(&self, payload: CapturePayload) -> CaptureSignal {
        let title = derive_title(&payload.text);
        let language = if payload.is_code {
            infer_language(&payload.text)
        } else {
            "unknown"
        };

        let input = CreateSnippetInput {
            title,
            code: payload.text,
            language: language.to_string(),
            ..Default::default()
        };

        match self.store.create(input) {
            Ok(snippet) => {
                debug!(id = %snippet.id, source_app = ?payload.source_app, "capture ingested");
                CaptureSignal::Captured { snippet }
            }
            // The row survived an index hiccup; report the capture as
            // degraded-but-successful rather than losing a valid capture.
            Err(StoreError::IndexStale { id }) => {
                warn!(id = %id, "capture indexed stale; row retained");
                match self.store.get_by_id(&id) {
                    Ok(Some(snippet)) => CaptureSignal::Captured { snippet },
                    _ => CaptureSignal::Error {
                        message: format!("capture stored but unreadable: {id}"),
                    },
                }
            }
            Err(e) => CaptureSignal::Error {
                message: format!("failed to store capture: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str, is_code: bool) -> CapturePayload {
        CapturePayload {
            text: text.to_string(),
            is_code,
            source_app: Some("Terminal".to_string()),
            platform: "macos".to_string(),
            timestamp: "2026-08-06T12:00:00Z".to_string(),
        }
    }

    fn ingestor() -> CaptureIngestor {
        let store = Arc::new(SnippetStore::new_in_memory().unwrap());
        store.capture_ingestor()
    }

    #[test]
    fn test_code_capture_creates_one_snippet() {
        let store = Arc::new(SnippetStore::new_in_memory().unwrap());
        let ingestor = store.capture_ingestor();

        let signal = ingestor.ingest(payload("func foo(){}", true));
        let snippet = match signal {
            CaptureSignal::Captured { snippet } => snippet,
            CaptureSignal::Error { message } => panic!("unexpected error: {message}"),
        };

        assert_eq!(snippet.code, "func foo(){}");
        assert_eq!(snippet.language, "go");
        assert_eq!(snippet.title, "func foo(){}");
        assert_eq!(store.list(1, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_capture_yields_error_and_no_snippet() {
        let store = Arc::new(SnippetStore::new_in_memory().unwrap());
        let ingestor = store.capture_ingestor();

        let signal = ingestor.ingest(payload("", true));
        assert!(matches!(signal, CaptureSignal::Error { .. }));
        assert!(store.list(1, 10).unwrap().is_empty());

        let signal = ingestor.ingest(payload("   \n\t", true));
        assert!(matches!(signal, CaptureSignal::Error { .. }));
        assert!(store.list(1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_non_code_capture_gets_unknown_language() {
        let ingestor = ingestor();
        // The text would classify as code, but the pipeline said it is not
        let signal = ingestor.ingest(payload("fn main() {}", false));
        match signal {
            CaptureSignal::Captured { snippet } => assert_eq!(snippet.language, "unknown"),
            CaptureSignal::Error { message } => panic!("unexpected error: {message}"),
        }
    }

    #[test]
    fn test_title_is_first_nonempty_line_truncated() {
        let ingestor = ingestor();
        let text = format!("\n\n  {}  \nsecond line", "x".repeat(200));
        let signal = ingestor.ingest(payload(&text, false));
        match signal {
            CaptureSignal::Captured { snippet } => {
                assert_eq!(snippet.title.chars().count(), TITLE_MAX_CHARS);
                assert!(snippet.title.starts_with('x'));
            }
            CaptureSignal::Error { message } => panic!("unexpected error: {message}"),
        }
    }

    #[test]
    fn test_infer_language() {
        assert_eq!(infer_language("fn main() { println!(); }"), "rust");
        assert_eq!(infer_language("def foo():\n    pass"), "python");
        assert_eq!(infer_language("SELECT * FROM t"), "unknown");
    }

    #[test]
    fn test_payload_deserializes_camel_case() {
        let json = r#"{
            "text": "hello",
            "isCode": false,
            "sourceApp": "Notes",
            "platform": "linux",
            "timestamp": "2026-08-06T12:00:00Z"
        }"#;
        let payload: CapturePayload = serde_json::from_str(json).unwrap();
        assert!(!payload.is_code);
        assert_eq!(payload.source_app.as_deref(), Some("Notes"));
    }
}
