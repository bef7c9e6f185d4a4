//! SnippetStore - the public persistence and search API
//!
//! Composes the SQLite database, the Tantivy indexer, and the id/clock
//! provider. Every mutation keeps the two storage structures in lockstep: the
//! row write commits first, the index entry second, and an index failure
//! flags the row stale instead of rolling back the edit.
//!
//! Async Cancellation Architecture:
//! `search` runs its blocking work on a spawn_blocking thread guarded by a
//! CancellationToken. Dropping the search future drops a DropGuard that
//! triggers the token; the blocking thread checks it at key checkpoints and
//! aborts mid-flight with `StoreError::Cancelled`.

use crate::capture::{CaptureIngestor, CapturePayload, CaptureSignal};
use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::ids::{new_id, Clock};
use crate::indexer::{Indexer, IndexerError, MAX_RESULTS, MIN_TRIGRAM_QUERY_LEN};
use crate::models::{CreateSnippetInput, Snippet, SnippetPatch};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Global fallback Tokio runtime for when async functions are called outside
/// any runtime context. Shared across all SnippetStore instances, never
/// dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// RAII guard that cancels a token when dropped. When the caller drops the
/// search future (explicit cancel, timeout), dropping this guard triggers the
/// cancellation token.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Thread-safe snippet store with SQLite + Tantivy
pub struct SnippetStore {
    db: Arc<Database>,
    indexer: Arc<Indexer>,
    clock: Clock,
}

impl SnippetStore {
    /// Open a store with a database at the given path. The search index lives
    /// in a `search_index` directory next to the database file. If the index
    /// is empty but the table is not (fresh index directory, crash before the
    /// first commit), the index is rebuilt from the table.
    pub fn open<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let db = Database::open(&db_path)?;

        let index_path = db_path
            .as_ref()
            .parent()
            .map(|p| p.join("search_index"))
            .unwrap_or_else(|| PathBuf::from("search_index"));
        let indexer = Indexer::new(&index_path)?;

        let store = Self {
            db: Arc::new(db),
            indexer: Arc::new(indexer),
            clock: Clock::new(),
        };
        store.rebuild_index_if_needed()?;

        Ok(store)
    }

    /// Create a store with an in-memory database and index (for testing)
    pub fn new_in_memory() -> StoreResult<Self> {
        Ok(Self {
            db: Arc::new(Database::open_in_memory()?),
            indexer: Arc::new(Indexer::new_in_memory()?),
            clock: Clock::new(),
        })
    }

    /// Get a tokio runtime handle - uses the current runtime if available,
    /// otherwise the global fallback
    fn runtime_handle(&self) -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    fn rebuild_index_if_needed(&self) -> StoreResult<()> {
        if self.indexer.num_docs() > 0 {
            return Ok(());
        }
        if self.db.count()? == 0 {
            return Ok(());
        }
        self.reindex_all()?;
        Ok(())
    }

    /// Upsert one snippet's searchable text and commit
    fn index_snippet(&self, snippet: &Snippet) -> Result<(), IndexerError> {
        self.indexer.add_document(
            &snippet.id,
            &snippet.title,
            &snippet.body_text(),
            snippet.updated_at.timestamp(),
        )?;
        self.indexer.commit()
    }

    /// Index write failed after the row write already stood. Flag the row for
    /// repair and surface the non-fatal IndexStale condition.
    fn degrade_to_stale(&self, id: &str, err: IndexerError) -> StoreError {
        warn!(id, error = %err, "index write failed; row retained and flagged stale");
        if let Err(mark_err) = self.db.mark_index_stale(id, true) {
            warn!(id, error = %mark_err, "failed to flag row stale");
        }
        StoreError::IndexStale { id: id.to_string() }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a snippet. `title` and `language` must be non-empty; `code` may
    /// be the empty string. The new row is indexed before this returns; on
    /// index failure the row stands and `IndexStale` is surfaced (the caller
    /// can still `get_by_id` the retained row).
    pub fn create(&self, input: CreateSnippetInput) -> StoreResult<Snippet> {
        if input.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
        if input.language.trim().is_empty() {
            return Err(StoreError::Validation("language must not be empty".into()));
        }

        let now = self.clock.now();
        let snippet = Snippet {
            id: new_id(),
            title: input.title,
            code: input.code,
            language: input.language,
            description: input.description,
            tags: input.tags,
            folder_id: input.folder_id,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_snippet(&snippet)?;
        debug!(id = %snippet.id, "created snippet");

        if let Err(e) = self.index_snippet(&snippet) {
            return Err(self.degrade_to_stale(&snippet.id, e));
        }

        Ok(snippet)
    }

    /// Apply a partial update. Only fields present on the patch change;
    /// `updated_at` is refreshed regardless. Fails with `NotFound` for an
    /// unknown id. The index entry is rebuilt with the row; on index failure
    /// the updated row stands and `IndexStale` is surfaced.
    pub fn update(&self, id: &str, patch: &SnippetPatch) -> StoreResult<()> {
        let updated = self
            .db
            .update_snippet(id, patch, self.clock.now())?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        debug!(id, "updated snippet");

        if let Err(e) = self.index_snippet(&updated) {
            return Err(self.degrade_to_stale(id, e));
        }

        Ok(())
    }

    /// Delete a snippet and its index entry. Deleting a missing id is a
    /// no-op, not an error.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let existed = self.db.delete_snippet(id)?;
        if existed {
            debug!(id, "deleted snippet");
        }

        let removed = self
            .indexer
            .delete_document(id)
            .and_then(|_| self.indexer.commit());
        if let Err(e) = removed {
            // No row left to flag; reindex_all rebuilds from the table and
            // drops the orphaned entry.
            warn!(id, error = %e, "index delete failed; entry orphaned until reindex");
            return Err(StoreError::IndexStale { id: id.to_string() });
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Pure lookup; absence is `None`, never an error
    pub fn get_by_id(&self, id: &str) -> StoreResult<Option<Snippet>> {
        Ok(self.db.get_by_id(id)?)
    }

    /// One page of snippets, most recently touched first, ties broken by id
    /// ascending. `page` and `limit` are 1-based; anything below 1 is a
    /// caller contract violation, not silently clamped.
    pub fn list(&self, page: u32, limit: u32) -> StoreResult<Vec<Snippet>> {
        if page < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "page must be >= 1, got {page}"
            )));
        }
        if limit < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "limit must be >= 1, got {limit}"
            )));
        }

        let offset = (page as u64 - 1) * limit as u64;
        Ok(self.db.list(limit, offset)?)
    }

    /// Full-text search, ranked by relevance with recency tie-breaks.
    ///
    /// Empty and whitespace-only queries return an empty result by explicit
    /// contract. Queries under 3 characters use the database LIKE fallback;
    /// everything else goes through the trigram index. Dropping the returned
    /// future (e.g. via a timeout) cancels the search at the next checkpoint.
    pub async fn search(&self, query: &str) -> StoreResult<Vec<Snippet>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let token = CancellationToken::new();
        let _guard = DropGuard::new(token.clone());

        let db = Arc::clone(&self.db);
        let indexer = Arc::clone(&self.indexer);
        let query_owned = trimmed.to_string();
        let token_clone = token.clone();

        // spawn_blocking via the resolved handle so this works both inside a
        // caller's runtime and from sync shells using the fallback runtime
        let handle = self
            .runtime_handle()
            .spawn_blocking(move || Self::search_sync(&db, &indexer, &query_owned, &token_clone));

        match handle.await {
            Ok(result) => result,
            // JoinError means the task panicked or was aborted
            Err(_) => Err(StoreError::Cancelled),
        }
    }

    /// Blocking search body; checks the cancellation token at each checkpoint
    fn search_sync(
        db: &Database,
        indexer: &Indexer,
        query: &str,
        token: &CancellationToken,
    ) -> StoreResult<Vec<Snippet>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let ids = if query.len() < MIN_TRIGRAM_QUERY_LEN {
            db.search_like(query, MAX_RESULTS)?
        } else {
            indexer.search(query, MAX_RESULTS)?
        };

        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Join ranked ids back to full rows, preserving rank order. Ids whose
        // row vanished under a concurrent delete are silently dropped.
        Ok(db.fetch_by_ids(&ids)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild the index from the table: clears the index, re-adds every row,
    /// clears all stale flags. Returns the number of rows indexed.
    pub fn reindex_all(&self) -> StoreResult<usize> {
        self.indexer.clear()?;

        let snippets = self.db.fetch_all()?;
        for snippet in &snippets {
            self.indexer.add_document(
                &snippet.id,
                &snippet.title,
                &snippet.body_text(),
                snippet.updated_at.timestamp(),
            )?;
        }
        self.indexer.commit()?;
        self.db.clear_stale_flags()?;

        info!(count = snippets.len(), "rebuilt search index");
        Ok(snippets.len())
    }

    /// Ids of rows whose index entry is pending repair
    pub fn stale_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.db.stale_ids()?)
    }

    /// Build a capture ingestor feeding this store
    pub fn capture_ingestor(self: &Arc<Self>) -> CaptureIngestor {
        CaptureIngestor::new(Arc::clone(self))
    }

    /// Ingest one capture payload (convenience over a standalone ingestor)
    pub fn ingest_capture(self: &Arc<Self>, payload: CapturePayload) -> CaptureSignal {
        self.capture_ingestor().ingest(payload)
    }

    #[cfg(test)]
    pub(crate) fn indexer_for_test(&self) -> &Indexer {
        &self.indexer
    }
}
