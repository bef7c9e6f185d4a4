//! Tantivy indexer for snippet search
//!
//! Full-text search with trigram (ngram) tokenization over the snippet title
//! and body (code + description). Queries are tokenized with the same trigram
//! analyzer used at indexing time. Queries under 3 characters produce no
//! trigrams and return empty; the store handles those via the LIKE fallback.

use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{NgramTokenizer, TextAnalyzer};
use tantivy::{DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Term};
use thiserror::Error;

/// Minimum query length for trigram search; shorter queries fall back to the
/// database LIKE scan.
pub const MIN_TRIGRAM_QUERY_LEN: usize = 3;

/// Maximum candidates returned from a single search
pub const MAX_RESULTS: usize = 500;

/// Maximum recency boost multiplier (0.1 = up to 10% boost for brand new rows)
const RECENCY_BOOST_MAX: f64 = 0.1;
const RECENCY_HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Matching trigrams in the title count double relative to the body.
const TITLE_BOOST: f32 = 2.0;
/// Contiguous whole-query matches get this on top.
const PHRASE_BOOST: f32 = 3.0;

/// Error type for indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Directory error: {0}")]
    Directory(#[from] tantivy::directory::error::OpenDirectoryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Tantivy-based indexer with trigram tokenization
pub struct Indexer {
    index: Index,
    writer: RwLock<IndexWriter>,
    reader: RwLock<IndexReader>,
    id_field: Field,
    title_field: Field,
    body_field: Field,
    updated_field: Field,
    #[cfg(test)]
    fail_next_commit: std::sync::atomic::AtomicBool,
}

impl Indexer {
    /// Create or open an indexer at the given path
    pub fn new(path: &Path) -> IndexerResult<Self> {
        std::fs::create_dir_all(path)?;
        let dir = tantivy::directory::MmapDirectory::open(path)?;
        let schema = Self::build_schema();
        let index = Index::open_or_create(dir, schema.clone())?;
        Self::register_tokenizer(&index);

        let writer = index.writer(50_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self::from_parts(index, writer, reader, schema))
    }

    /// Create an in-memory indexer (for testing)
    pub fn new_in_memory() -> IndexerResult<Self> {
        let schema = Self::build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::register_tokenizer(&index);

        let writer = index.writer(15_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self::from_parts(index, writer, reader, schema))
    }

    fn from_parts(index: Index, writer: IndexWriter, reader: IndexReader, schema: Schema) -> Self {
        Self {
            id_field: schema.get_field("id").unwrap(),
            title_field: schema.get_field("title").unwrap(),
            body_field: schema.get_field("body").unwrap(),
            updated_field: schema.get_field("updated_at").unwrap(),
            index,
            writer: RwLock::new(writer),
            reader: RwLock::new(reader),
            #[cfg(test)]
            fail_next_commit: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn build_schema() -> Schema {
        let mut builder = Schema::builder();

        // Raw-tokenized id: the delete term for upserts must match exactly
        builder.add_text_field("id", STRING | STORED);

        let text_field_indexing = TextFieldIndexing::default()
            .set_tokenizer("trigram")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
        builder.add_text_field("title", text_options.clone());
        builder.add_text_field("body", text_options);

        builder.add_i64_field("updated_at", FAST);
        builder.build()
    }

    /// Register the trigram tokenizer with the index
    fn register_tokenizer(index: &Index) {
        let tokenizer = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false).unwrap())
            .filter(tantivy::tokenizer::LowerCaser)
            .build();
        index.tokenizers().register("trigram", tokenizer);
    }

    /// Add or replace the searchable text for a snippet (upsert semantics)
    pub fn add_document(
        &self,
        id: &str,
        title: &str,
        body: &str,
        updated_at: i64,
    ) -> IndexerResult<()> {
        let writer = self.writer.write();

        let id_term = Term::from_field_text(self.id_field, id);
        writer.delete_term(id_term);

        let mut doc = tantivy::TantivyDocument::default();
        doc.add_text(self.id_field, id);
        doc.add_text(self.title_field, title);
        doc.add_text(self.body_field, body);
        doc.add_i64(self.updated_field, updated_at);

        writer.add_document(doc)?;

        Ok(())
    }

    pub fn delete_document(&self, id: &str) -> IndexerResult<()> {
        let writer = self.writer.write();
        let id_term = Term::from_field_text(self.id_field, id);
        writer.delete_term(id_term);
        Ok(())
    }

    pub fn commit(&self) -> IndexerResult<()> {
        #[cfg(test)]
        if self
            .fail_next_commit
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(IndexerError::Io(std::io::Error::other(
                "injected commit failure",
            )));
        }

        self.writer.write().commit()?;
        self.reader.write().reload()?;
        Ok(())
    }

    /// Arrange for the next commit() to fail (index-stale path testing)
    #[cfg(test)]
    pub(crate) fn inject_commit_failure(&self) {
        self.fail_next_commit
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Tokenize text with the registered trigram analyzer
    fn trigrams(&self, field: Field, text: &str) -> Vec<Term> {
        let mut tokenizer = self.index.tokenizers().get("trigram").unwrap();
        let mut stream = tokenizer.token_stream(text);
        let mut terms = Vec::new();
        while let Some(token) = stream.next() {
            terms.push(Term::from_field_text(field, &token.text));
        }
        terms
    }

    /// Build an OR query over trigram terms. For queries with 7+ trigrams,
    /// require most of them to match so that scattered single-word overlap
    /// in an unrelated snippet cannot survive retrieval.
    fn field_query(&self, field: Field, query: &str) -> Option<BooleanQuery> {
        let terms = self.trigrams(field, query);
        if terms.is_empty() {
            return None;
        }

        let num_terms = terms.len();
        let subqueries: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        let mut boolean = BooleanQuery::new(subqueries);

        if num_terms >= 7 {
            let ratio = if num_terms >= 20 {
                4 * num_terms / 5
            } else {
                num_terms * 2 / 3
            };
            boolean.set_minimum_number_should_match(ratio.max(5));
        }

        Some(boolean)
    }

    /// Phrase query over the full query's trigrams; fires only when the query
    /// appears contiguously in the field.
    fn phrase_query(&self, field: Field, query: &str) -> Option<Box<dyn Query>> {
        let terms = self.trigrams(field, query);
        if terms.len() < 2 {
            return None;
        }
        let phrase = PhraseQuery::new(terms);
        Some(Box::new(BoostQuery::new(Box::new(phrase), PHRASE_BOOST)))
    }

    /// Search the index, returning snippet ids ranked by relevance.
    /// Ranking blends BM25 (quantized so near-ties fall through) with an
    /// exponential recency decay over `updated_at` — ties go to the snippet
    /// touched most recently.
    pub fn search(&self, query: &str, limit: usize) -> IndexerResult<Vec<String>> {
        let reader = self.reader.read();
        let searcher = reader.searcher();

        let title_q = self.field_query(self.title_field, query);
        let body_q = self.field_query(self.body_field, query);
        if title_q.is_none() && body_q.is_none() {
            // Query too short for trigrams; the store's LIKE fallback owns this case
            return Ok(Vec::new());
        }

        let mut parts: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        if let Some(q) = title_q {
            parts.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(q), TITLE_BOOST)),
            ));
        }
        if let Some(q) = body_q {
            parts.push((Occur::Should, Box::new(q)));
        }
        if let Some(q) = self.phrase_query(self.title_field, query) {
            parts.push((Occur::Should, q));
        }
        if let Some(q) = self.phrase_query(self.body_field, query) {
            parts.push((Occur::Should, q));
        }
        let final_query = BooleanQuery::new(parts);

        // Blend BM25 with recency at collection time: the top-K heap works on
        // the blended score, so the true top results come out without a
        // separate sort step.
        let now = Utc::now().timestamp();
        let collector =
            TopDocs::with_limit(limit).tweak_score(move |segment_reader: &tantivy::SegmentReader| {
                let ts_reader = segment_reader
                    .fast_fields()
                    .i64("updated_at")
                    .expect("updated_at fast field");
                move |doc: DocId, score: Score| {
                    let updated_at = ts_reader.first(doc).unwrap_or(0);
                    // Quantize BM25 coarsely so minor doc-length differences
                    // are treated as ties, letting recency break them.
                    let base = ((score as u32).max(1) * 1000) as f64;
                    let age_secs = (now - updated_at).max(0) as f64;
                    let recency = (-age_secs * 2.0_f64.ln() / RECENCY_HALF_LIFE_SECS).exp();
                    base * (1.0 + RECENCY_BOOST_MAX * recency)
                }
            });

        let top_docs = searcher.search(&final_query, &collector)?;

        let mut ids = Vec::with_capacity(top_docs.len());
        for (_blended_score, doc_address) in top_docs {
            let doc: tantivy::TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                ids.push(id.to_string());
            }
        }

        Ok(ids)
    }

    pub fn clear(&self) -> IndexerResult<()> {
        let mut writer = self.writer.write();
        writer.delete_all_documents()?;
        writer.commit()?;
        drop(writer);
        self.reader.write().reload()?;
        Ok(())
    }

    /// Get the number of documents in the index
    pub fn num_docs(&self) -> u64 {
        self.reader.read().searcher().num_docs()
    }
}
