//! SQLite database layer for snippet storage
//!
//! Owns the snippets table: schema setup, row mapping, the dynamic
//! partial-update statement, pagination, and the LIKE fallback used for
//! queries too short to produce trigrams.

use crate::ids::{fmt_timestamp, parse_timestamp};
use crate::models::{Snippet, SnippetPatch};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Thread-safe database wrapper
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode + mmap for faster reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA mmap_size=67108864;
            PRAGMA cache_size=-32000;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS snippets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                code TEXT NOT NULL,
                language TEXT NOT NULL,
                description TEXT,
                tags TEXT,
                folder_id TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                index_stale INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snippets_updated ON snippets(updated_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snippets_stale ON snippets(index_stale)",
            [],
        )?;

        Ok(())
    }

    /// Insert a fully materialized snippet row
    pub fn insert_snippet(&self, snippet: &Snippet) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO snippets (id, title, code, language, description, tags, folder_id, is_favorite, index_stale, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)
            "#,
            params![
                snippet.id,
                snippet.title,
                snippet.code,
                snippet.language,
                snippet.description,
                snippet.tags.as_ref().map(encode_tags).transpose()?,
                snippet.folder_id,
                snippet.is_favorite as i64,
                fmt_timestamp(snippet.created_at),
                fmt_timestamp(snippet.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Apply a partial update as a single parameterized UPDATE statement.
    ///
    /// Only fields present on the patch appear in the column-set; absent
    /// fields are never written. `updated_at` is always refreshed. The UPDATE
    /// and the re-read of the resulting row run in one transaction.
    ///
    /// Returns the updated row, or None if the id does not exist.
    pub fn update_snippet(
        &self,
        id: &str,
        patch: &SnippetPatch,
        updated_at: DateTime<Utc>,
    ) -> DatabaseResult<Option<Snippet>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = &patch.title {
            sets.push("title = ?");
            values.push(Box::new(title.clone()));
        }
        if let Some(code) = &patch.code {
            sets.push("code = ?");
            values.push(Box::new(code.clone()));
        }
        if let Some(language) = &patch.language {
            sets.push("language = ?");
            values.push(Box::new(language.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(tags) = &patch.tags {
            sets.push("tags = ?");
            values.push(Box::new(encode_tags(tags)?));
        }
        if let Some(folder_id) = &patch.folder_id {
            sets.push("folder_id = ?");
            values.push(Box::new(folder_id.clone()));
        }
        if let Some(is_favorite) = patch.is_favorite {
            sets.push("is_favorite = ?");
            values.push(Box::new(is_favorite as i64));
        }

        sets.push("updated_at = ?");
        values.push(Box::new(fmt_timestamp(updated_at)));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE snippets SET {} WHERE id = ?", sets.join(", "));
        let affected = tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;

        if affected == 0 {
            return Ok(None);
        }

        let snippet = tx.query_row(
            "SELECT * FROM snippets WHERE id = ?1",
            [id],
            Self::row_to_snippet,
        )?;
        tx.commit()?;

        Ok(Some(snippet))
    }

    /// Delete a row by id. Returns whether a row was actually removed;
    /// deleting a missing id is not an error.
    pub fn delete_snippet(&self, id: &str) -> DatabaseResult<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM snippets WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Look up a single snippet by id
    pub fn get_by_id(&self, id: &str) -> DatabaseResult<Option<Snippet>> {
        let conn = self.conn.lock();
        let snippet = conn
            .query_row(
                "SELECT * FROM snippets WHERE id = ?1",
                [id],
                Self::row_to_snippet,
            )
            .optional()?;
        Ok(snippet)
    }

    /// Fetch one page, most recently touched first. Equal `updated_at` values
    /// are broken by id ascending so identical inputs always return identical
    /// output.
    pub fn list(&self, limit: u32, offset: u64) -> DatabaseResult<Vec<Snippet>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM snippets ORDER BY updated_at DESC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let snippets = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_snippet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snippets)
    }

    /// Fetch snippets by ids, preserving the order of the input ids
    pub fn fetch_by_ids(&self, ids: &[String]) -> DatabaseResult<Vec<Snippet>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM snippets WHERE id IN ({})", placeholders);

        let mut stmt = conn.prepare(&sql)?;
        let snippets: Vec<Snippet> = stmt
            .query_map(params_from_iter(ids.iter()), Self::row_to_snippet)?
            .collect::<Result<Vec<_>, _>>()?;

        // Re-sort to match input id order
        let mut by_id: HashMap<&str, Snippet> = snippets
            .iter()
            .map(|s| (s.id.as_str(), s.clone()))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id.as_str())).collect())
    }

    /// Fetch all snippets (for index rebuilding)
    pub fn fetch_all(&self) -> DatabaseResult<Vec<Snippet>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM snippets ORDER BY updated_at DESC")?;
        let snippets = stmt
            .query_map([], Self::row_to_snippet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snippets)
    }

    pub fn count(&self) -> DatabaseResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM snippets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// LIKE fallback for queries shorter than the trigram minimum.
    /// Matches title, code, and description; recency-ordered.
    pub fn search_like(&self, query: &str, limit: usize) -> DatabaseResult<Vec<String>> {
        let conn = self.conn.lock();
        let pattern = format!(
            "%{}%",
            query.to_lowercase().replace('%', "\\%").replace('_', "\\_")
        );
        let mut stmt = conn.prepare(
            r#"SELECT id FROM snippets
               WHERE LOWER(title) LIKE ?1 ESCAPE '\'
                  OR LOWER(code) LIKE ?1 ESCAPE '\'
                  OR LOWER(COALESCE(description, '')) LIKE ?1 ESCAPE '\'
               ORDER BY updated_at DESC, id ASC
               LIMIT ?2"#,
        )?;
        let ids = stmt
            .query_map(params![pattern, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Flag or clear the stale marker for one row
    pub fn mark_index_stale(&self, id: &str, stale: bool) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE snippets SET index_stale = ?1 WHERE id = ?2",
            params![stale as i64, id],
        )?;
        Ok(())
    }

    /// Rows flagged as stale, most recently touched first
    pub fn stale_ids(&self) -> DatabaseResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM snippets WHERE index_stale = 1 ORDER BY updated_at DESC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn clear_stale_flags(&self) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE snippets SET index_stale = 0 WHERE index_stale = 1", [])?;
        Ok(())
    }

    /// Convert a database row to a Snippet
    fn row_to_snippet(row: &rusqlite::Row) -> rusqlite::Result<Snippet> {
        let id: String = row.get("id")?;
        let title: String = row.get("title")?;
        let code: String = row.get("code")?;
        let language: String = row.get("language")?;
        let description: Option<String> = row.get("description")?;
        let tags_blob: Option<String> = row.get("tags")?;
        let folder_id: Option<String> = row.get("folder_id")?;
        let is_favorite: i64 = row.get("is_favorite")?;
        let created_str: String = row.get("created_at")?;
        let updated_str: String = row.get("updated_at")?;

        let tags = tags_blob.map(|blob| decode_tags(&blob, 5)).transpose()?;
        let created_at = parse_row_timestamp(&created_str, 9)?;
        let updated_at = parse_row_timestamp(&updated_str, 10)?;

        Ok(Snippet {
            id,
            title,
            code,
            language,
            description,
            tags,
            folder_id,
            is_favorite: is_favorite != 0,
            created_at,
            updated_at,
        })
    }
}

/// Serialize a tag list into the order-preserving JSON blob stored in the
/// `tags` column.
fn encode_tags(tags: &Vec<String>) -> rusqlite::Result<String> {
    serde_json::to_string(tags).map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(e))
    })
}

/// Deserialize the tags blob. A corrupt blob surfaces as a storage error,
/// never a panic.
fn decode_tags(blob: &str, column: usize) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_row_timestamp(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("malformed timestamp: {s}").into(),
        )
    })
}
