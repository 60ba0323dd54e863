use super::*;
use crate::sync::planner::SyncPlan;
use crate::test_support::{MemoryStore, StaticSource, StoreCall, target};
use std::time::Duration;
use tokio::sync::Notify;
use travis_github::RepoEntry;

fn executor(source: StaticSource, store: Arc<MemoryStore>) -> SyncExecutor {
    SyncExecutor::new(Arc::new(source), store).with_retry(RetryPolicy::fixed(3, Duration::ZERO))
}

fn create_file_call(parent: &str, name: &str) -> StoreCall {
    StoreCall::CreateFile {
        parent: parent.into(),
        name: name.into(),
    }
}

fn create_folder_call(parent: &str, name: &str) -> StoreCall {
    StoreCall::CreateFolder {
        parent: parent.into(),
        name: name.into(),
    }
}

#[tokio::test]
async fn imports_folder_and_file_and_drops_sentinel() {
    let store = MemoryStore::new();
    let source = StaticSource::new(vec![
        RepoEntry::folder("src"),
        RepoEntry::file("src/a.ts", Some("x".into())),
        RepoEntry::file("index.file", Some(String::new())),
    ]);
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.created_folders, 1);
    assert_eq!(outcome.created_files, 1);
    assert_eq!(outcome.failed_paths().count(), 0);
    assert_eq!(outcome.skipped_entries, 1);
    assert!(outcome.succeeded());
    assert!(outcome.fully_succeeded());
    assert_eq!(store.file("/src/a.ts").as_deref(), Some("x"));
    assert!(
        store
            .calls()
            .iter()
            .all(|call| !matches!(call, StoreCall::CreateFile { name, .. } if name == "index.file"))
    );
}

#[tokio::test]
async fn failed_folder_does_not_block_its_files() {
    let store = MemoryStore::new();
    store.fail_always("/src/deep");
    let source = StaticSource::new(vec![
        RepoEntry::folder("src"),
        RepoEntry::folder("src/deep"),
        RepoEntry::file("src/deep/x.ts", Some("x".into())),
    ]);
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    let calls = store.calls();
    let folder_attempts = calls
        .iter()
        .filter(|call| **call == create_folder_call("/src", "deep"))
        .count();
    assert_eq!(folder_attempts, 3);
    assert!(calls.contains(&create_file_call("/src/deep", "x.ts")));
    assert_eq!(outcome.failed_folders, vec!["src/deep"]);
    // The store has no /src/deep, so the file fails on its own account.
    assert_eq!(outcome.failed_files, vec!["src/deep/x.ts"]);
    assert_eq!(outcome.created_folders, 1);
    assert!(store.has_folder("/src"));
    assert!(!store.has_folder("/src/deep"));
    assert!(outcome.succeeded());
    assert!(!outcome.fully_succeeded());
}

#[tokio::test]
async fn folders_are_created_before_any_file() {
    let store = MemoryStore::new();
    let source = StaticSource::new(vec![
        RepoEntry::file("a/b/one.txt", Some("1".into())),
        RepoEntry::folder("a/b"),
        RepoEntry::file("top.txt", Some("t".into())),
        RepoEntry::folder("a"),
    ]);
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    assert!(outcome.fully_succeeded());
    let calls = store.calls();
    assert_eq!(
        calls,
        vec![
            create_folder_call("/", "a"),
            create_folder_call("/a", "b"),
            create_file_call("/a/b", "one.txt"),
            create_file_call("/", "top.txt"),
        ]
    );
}

#[tokio::test]
async fn hand_built_plan_recovers_missing_ancestors() {
    let store = MemoryStore::new();
    let executor = executor(StaticSource::default(), store.clone());
    let plan = SyncPlan {
        folders: vec![RepoEntry::folder("x/y/z")],
        files: vec![RepoEntry::file("p/q/r.txt", Some("r".into()))],
        ..SyncPlan::default()
    };

    let outcome = executor.run_plan(&target(), &plan).await;

    assert_eq!(outcome.created_folders, 5);
    assert_eq!(outcome.created_files, 1);
    assert_eq!(
        store.calls(),
        vec![
            create_folder_call("/", "x"),
            create_folder_call("/x", "y"),
            create_folder_call("/x/y", "z"),
            create_folder_call("/", "p"),
            create_folder_call("/p", "q"),
            create_file_call("/p/q", "r.txt"),
        ]
    );
}

#[tokio::test]
async fn content_is_fetched_only_when_not_inlined() {
    let store = MemoryStore::new();
    let source = Arc::new(
        StaticSource::new(vec![
            RepoEntry::file("inline.txt", Some("inline".into())),
            RepoEntry::file("lazy.txt", None),
        ])
        .with_content("lazy.txt", "fetched"),
    );
    let executor = SyncExecutor::new(source.clone(), store.clone())
        .with_retry(RetryPolicy::fixed(3, Duration::ZERO));

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.created_files, 2);
    assert_eq!(source.file_fetches(), vec!["lazy.txt"]);
    assert_eq!(store.file("/lazy.txt").as_deref(), Some("fetched"));
}

#[tokio::test]
async fn content_fetch_failure_skips_file_by_default() {
    let store = MemoryStore::new();
    let source = StaticSource::new(vec![
        RepoEntry::file("ok.txt", Some("ok".into())),
        RepoEntry::file("missing.txt", None),
    ]);
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.created_files, 1);
    assert_eq!(outcome.failed_files, vec!["missing.txt"]);
    assert!(outcome.degraded_files.is_empty());
    assert_eq!(store.file("/missing.txt"), None);
}

#[tokio::test]
async fn content_fetch_failure_can_create_placeholder() {
    let store = MemoryStore::new();
    let source = StaticSource::new(vec![RepoEntry::file("missing.txt", None)]);
    let executor =
        executor(source, store.clone()).with_content_policy(ContentFailurePolicy::Placeholder);

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.created_files, 1);
    assert_eq!(outcome.degraded_files, vec!["missing.txt"]);
    assert!(outcome.failed_files.is_empty());
    assert!(outcome.succeeded());
    assert!(!outcome.fully_succeeded());
    assert_eq!(store.file("/missing.txt").as_deref(), Some(""));
}

#[tokio::test]
async fn transient_store_failure_is_retried() {
    let store = MemoryStore::new();
    store.fail_times("/a.txt", 2);
    let source = StaticSource::new(vec![RepoEntry::file("a.txt", Some("a".into()))]);
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.created_files, 1);
    assert!(outcome.fully_succeeded());
    assert_eq!(store.calls().len(), 3);
}

#[tokio::test]
async fn every_file_is_accounted_for_once() {
    let store = MemoryStore::new();
    store.fail_always("/b.txt");
    let source = StaticSource::new(vec![
        RepoEntry::file("a.txt", Some("a".into())),
        RepoEntry::file("b.txt", Some("b".into())),
        RepoEntry::file("c.txt", None),
        RepoEntry::file("d.txt", None),
    ])
    .with_content("d.txt", "d");
    let executor = executor(source, store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.total_files, 4);
    assert_eq!(
        outcome.created_files + outcome.failed_files.len(),
        outcome.total_files
    );
    assert_eq!(outcome.summary(), "imported 2 files and 0 folders, 2 errors");
}

#[tokio::test]
async fn resync_into_populated_store_keeps_existing_folders() {
    let store = MemoryStore::new();
    let entries = vec![
        RepoEntry::folder("src"),
        RepoEntry::file("src/a.ts", Some("x".into())),
    ];
    executor(StaticSource::new(entries.clone()), store.clone())
        .run(&target())
        .await;

    let outcome = executor(StaticSource::new(entries), store.clone())
        .run(&target())
        .await;

    assert_eq!(outcome.created_folders, 0);
    assert!(outcome.failed_folders.is_empty());
    // Existing files are conflicts, reported once without retrying.
    assert_eq!(outcome.failed_files, vec!["src/a.ts"]);
    let file_attempts = store
        .calls()
        .iter()
        .filter(|call| **call == create_file_call("/src", "a.ts"))
        .count();
    assert_eq!(file_attempts, 2);
}

#[tokio::test]
async fn empty_repository_touches_nothing() {
    let store = MemoryStore::new();
    let executor = executor(StaticSource::new(Vec::new()), store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.status, RunStatus::EmptyRepository);
    assert!(!outcome.succeeded());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn fetch_failure_is_reported_not_raised() {
    let store = MemoryStore::new();
    let executor = executor(StaticSource::failing("rate limited"), store.clone());

    let outcome = executor.run(&target()).await;

    assert_eq!(outcome.status, RunStatus::FetchFailed("rate limited".into()));
    assert_eq!(outcome.summary(), "failed to fetch repository: rate limited");
    assert!(store.calls().is_empty());
    assert_eq!(executor.phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    let store = MemoryStore::new();
    let gate = Arc::new(Notify::new());
    let source = StaticSource::new(vec![RepoEntry::file("a.txt", Some("a".into()))])
        .gated(gate.clone());
    let executor = executor(source, store.clone());
    let first_target = target();

    let (first, second, ()) = tokio::join!(
        executor.run(&first_target),
        async {
            let outcome = executor.run(&target()).await;
            assert!(store.calls().is_empty());
            outcome
        },
        async {
            assert!(executor.is_running());
            gate.notify_one();
        }
    );

    assert_eq!(first.created_files, 1);
    assert_eq!(second.status, RunStatus::AlreadyRunning);
    assert_eq!(store.file_count(), 1);
    assert!(!executor.is_running());
}

#[tokio::test]
async fn progress_callback_sees_phases_and_items() {
    let store = MemoryStore::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let source = StaticSource::new(vec![
        RepoEntry::folder("src"),
        RepoEntry::file("src/a.ts", Some("x".into())),
    ]);
    let executor = executor(source, store).with_progress(Arc::new(move |event: SyncProgress| {
        sink.lock().unwrap().push(event);
    }));

    executor.run(&target()).await;

    let events = events.lock().unwrap();
    assert_eq!(
        events.first(),
        Some(&SyncProgress::Phase {
            phase: SyncPhase::Fetching
        })
    );
    assert!(events.contains(&SyncProgress::FolderCreated { path: "src".into() }));
    assert!(events.contains(&SyncProgress::FileCreated {
        path: "src/a.ts".into()
    }));
    assert_eq!(
        events.last(),
        Some(&SyncProgress::Phase {
            phase: SyncPhase::Reporting
        })
    );
}
