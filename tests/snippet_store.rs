//! On-disk lifecycle tests for the snippet store
//!
//! Everything here goes through the public API against a real database file
//! and index directory, including reopen/rebuild behavior that the in-memory
//! unit tests cannot cover.

use offstack_core::{
    CapturePayload, CaptureSignal, CreateSnippetInput, SnippetPatch, SnippetStore, StoreError,
};
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn input(title: &str, code: &str, language: &str) -> CreateSnippetInput {
    CreateSnippetInput {
        title: title.to_string(),
        code: code.to_string(),
        language: language.to_string(),
        ..Default::default()
    }
}

#[test]
fn snippets_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("offstack.db");

    let created = {
        let store = SnippetStore::open(&db_path).unwrap();
        store
            .create(CreateSnippetInput {
                title: "retry helper".into(),
                code: "fn retry() {}".into(),
                language: "rust".into(),
                description: Some("exponential backoff".into()),
                tags: Some(vec!["resilience".into(), "net".into()]),
                folder_id: None,
            })
            .unwrap()
    };

    let store = SnippetStore::open(&db_path).unwrap();
    let fetched = store.get_by_id(&created.id).unwrap().unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.tags, Some(vec!["resilience".into(), "net".into()]));
}

#[test]
fn index_rebuilds_when_index_dir_is_lost() {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("offstack.db");

    {
        let store = SnippetStore::open(&db_path).unwrap();
        store
            .create(input("quicksort partition", "fn qs() {}", "rust"))
            .unwrap();
    }

    // Lose the index directory; the table is the source of truth
    std::fs::remove_dir_all(dir.path().join("search_index")).unwrap();

    let store = SnippetStore::open(&db_path).unwrap();
    let results = rt.block_on(store.search("quicksort")).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "quicksort partition");
}

#[test]
fn update_and_search_stay_in_lockstep_on_disk() {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let store = SnippetStore::open(dir.path().join("offstack.db")).unwrap();

    let created = store
        .create(input("old terminology", "", "text"))
        .unwrap();
    assert_eq!(rt.block_on(store.search("terminology")).unwrap().len(), 1);

    store
        .update(
            &created.id,
            &SnippetPatch {
                title: Some("fresh wording".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert!(rt.block_on(store.search("terminology")).unwrap().is_empty());
    let results = rt.block_on(store.search("wording")).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, created.id);
}

#[test]
fn pagination_is_stable_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("offstack.db");

    {
        let store = SnippetStore::open(&db_path).unwrap();
        for i in 0..25 {
            store.create(input(&format!("snippet {i}"), "", "text")).unwrap();
        }
    }

    let store = SnippetStore::open(&db_path).unwrap();
    let p1 = store.list(1, 10).unwrap();
    let p2 = store.list(2, 10).unwrap();
    let p3 = store.list(3, 10).unwrap();
    assert_eq!((p1.len(), p2.len(), p3.len()), (10, 10, 5));
    assert_eq!(p1[0].title, "snippet 24");
    assert_eq!(p3[4].title, "snippet 0");
    assert_eq!(store.list(1, 10).unwrap(), p1);
}

#[test]
fn capture_roundtrip_through_public_api() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SnippetStore::open(dir.path().join("offstack.db")).unwrap());

    let signal = store.ingest_capture(CapturePayload {
        text: "def handler(event):\n    return event".into(),
        is_code: true,
        source_app: Some("Editor".into()),
        platform: "linux".into(),
        timestamp: "2026-08-06T09:30:00Z".into(),
    });

    let snippet = match signal {
        CaptureSignal::Captured { snippet } => snippet,
        CaptureSignal::Error { message } => panic!("capture failed: {message}"),
    };
    assert_eq!(snippet.language, "python");
    assert_eq!(snippet.title, "def handler(event):");

    let fetched = store.get_by_id(&snippet.id).unwrap().unwrap();
    assert_eq!(fetched.code, "def handler(event):\n    return event");
}

#[test]
fn typed_errors_reach_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnippetStore::open(dir.path().join("offstack.db")).unwrap();

    assert!(matches!(
        store.create(input("", "", "text")).unwrap_err(),
        StoreError::Validation(_)
    ));
    assert!(matches!(
        store.update("nope", &SnippetPatch::default()).unwrap_err(),
        StoreError::NotFound { .. }
    ));
    assert!(matches!(
        store.list(0, 1).unwrap_err(),
        StoreError::InvalidArgument(_)
    ));
}
