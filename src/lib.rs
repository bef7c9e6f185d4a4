//! OffStack Core - persistence and search engine for the snippet manager
//!
//! This library implements the storage side of OffStack: the snippet entity
//! model, dynamic partial updates, deterministic pagination, trigram
//! full-text search kept in lockstep with the table, and the capture
//! ingestion edge that turns clipboard/hotkey captures into snippets.
//!
//! # Architecture
//! - `models`: Snippet, CreateSnippetInput, SnippetPatch
//! - `ids`: identifier and monotonic clock provider
//! - `database`: SQLite layer (schema, partial updates, pagination)
//! - `indexer`: Tantivy index with trigram tokenization
//! - `store`: SnippetStore, the public API composing the above
//! - `capture`: ingestion adapter for external capture events

mod capture;
mod database;
mod error;
mod ids;
mod indexer;
mod models;
mod store;

pub use capture::{
    infer_language, CaptureIngestor, CapturePayload, CaptureSignal, CAPTURE_ERROR_EVENT,
    CAPTURE_EVENT,
};
pub use error::{StoreError, StoreResult};
pub use ids::{fmt_timestamp, new_id, parse_timestamp, Clock};
pub use models::{normalize_title, CreateSnippetInput, Snippet, SnippetPatch};
pub use store::SnippetStore;
