//! Integration tests for interrupt-and-resume

use crate::common::{day, fast_config, three_day_query, ScriptedFetcher};
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use timeline_harvester::collector::{
    CollectError, RecoveryController, RunContext, RunOutcome, RunTermination,
};
use timeline_harvester::resume::{CheckpointStore, ResumeError, RunLock};
use timeline_harvester::shutdown::ShutdownCoordinator;
use timeline_harvester::store::RecordStore;

/// Start a run that interrupts itself on the given fetch
async fn interrupted_run(data_dir: &Path, since: &str, page: usize) -> RunOutcome {
    let shutdown = ShutdownCoordinator::shared();
    let fetcher = ScriptedFetcher::new(5, 3).interrupt_at(since, page, shutdown.clone());

    let context = RunContext::new(data_dir, three_day_query(), fast_config());
    let outcome = RecoveryController::start(context, fetcher, false)
        .unwrap()
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();
    assert_eq!(outcome.termination, RunTermination::Interrupted);
    outcome
}

fn unique_urls(store: &Path) -> (u64, usize) {
    let mut urls = HashSet::new();
    let summary = RecordStore::replay(store, |record| {
        urls.insert(record.url);
        Ok(())
    })
    .unwrap();
    (summary.records, urls.len())
}

#[tokio::test]
async fn test_interrupt_after_first_window_then_resume() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-02", 0).await;

    // Window 0 is checkpointed; one record of window 1 made it to the store
    assert_eq!(interrupted.stored_records, 16);
    let checkpoint = CheckpointStore::new(&interrupted.checkpoint_path).read().unwrap();
    assert_eq!(checkpoint.boundary, day("2023-01-02"));
    assert_eq!(checkpoint.stored_records, 15);
    assert_eq!(checkpoint.remaining_quota, 15);

    let fetcher = ScriptedFetcher::new(5, 3);
    let calls = fetcher.calls();
    let outcome = RecoveryController::resume(&interrupted.checkpoint_path, fetcher, fast_config())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.termination, RunTermination::Done);
    assert_eq!(outcome.stored_records, 45);
    assert!(calls
        .lock()
        .unwrap()
        .iter()
        .all(|call| call.since >= day("2023-01-02")));

    let store = interrupted.checkpoint_path.with_file_name("records.jsonl");
    assert_eq!(unique_urls(&store), (45, 45));
}

#[tokio::test]
async fn test_interrupt_mid_window_then_resume() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-02", 1).await;
    assert_eq!(interrupted.stored_records, 21);

    let outcome = RecoveryController::resume(
        &interrupted.checkpoint_path,
        ScriptedFetcher::new(5, 3),
        fast_config(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    // Re-fetched records of window 1 count toward its quota but are not stored twice
    let window = &outcome.windows[0];
    assert_eq!(window.window.since, day("2023-01-02"));
    assert_eq!(window.duplicates, 6);
    assert_eq!(window.collected, 9);
    assert_eq!(outcome.stored_records, 45);

    let store = interrupted.checkpoint_path.with_file_name("records.jsonl");
    assert_eq!(unique_urls(&store), (45, 45));
}

#[tokio::test]
async fn test_resumed_window_quotas_match_original_schedule() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-03", 0).await;

    let outcome = RecoveryController::resume(
        &interrupted.checkpoint_path,
        ScriptedFetcher::new(5, 3),
        fast_config(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let quotas: Vec<u64> = outcome.windows.iter().map(|w| w.window.quota).collect();
    assert_eq!(quotas, vec![10]);
    assert_eq!(outcome.windows[0].window.index, 2);
}

#[tokio::test]
async fn test_resume_done_run_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let context = RunContext::new(dir.path(), three_day_query(), fast_config());
    let done = RecoveryController::start(context, ScriptedFetcher::new(5, 3), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let fetcher = ScriptedFetcher::new(5, 3);
    let calls = fetcher.calls();
    let outcome = RecoveryController::resume(&done.checkpoint_path, fetcher, fast_config())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.termination, RunTermination::Done);
    assert_eq!(outcome.stored_records, 45);
    assert!(outcome.windows.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_missing_checkpoint() {
    let dir = TempDir::new().unwrap();
    let result = RecoveryController::resume(
        &dir.path().join("nope").join("checkpoint.json"),
        ScriptedFetcher::new(5, 3),
        fast_config(),
    );
    assert!(matches!(result, Err(CollectError::CheckpointNotFound(_))));
}

#[tokio::test]
async fn test_resume_rejects_tampered_query() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-02", 0).await;

    let path = &interrupted.checkpoint_path;
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    value["query"]["quota"] = serde_json::json!(31);
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let result = RecoveryController::resume(path, ScriptedFetcher::new(5, 3), fast_config());
    assert!(matches!(
        result,
        Err(CollectError::Resume(ResumeError::FingerprintMismatch { .. }))
    ));
}

#[tokio::test]
async fn test_resume_rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-02", 0).await;

    let path = &interrupted.checkpoint_path;
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(99);
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let result = RecoveryController::resume(path, ScriptedFetcher::new(5, 3), fast_config());
    assert!(matches!(
        result,
        Err(CollectError::Resume(ResumeError::SchemaVersionMismatch { found: 99, .. }))
    ));
}

#[tokio::test]
async fn test_second_process_on_same_run_is_rejected() {
    let dir = TempDir::new().unwrap();
    let interrupted = interrupted_run(dir.path(), "2023-01-02", 0).await;

    let run_dir = interrupted.checkpoint_path.parent().unwrap();
    let _held = RunLock::try_acquire(run_dir).unwrap();

    let result = RecoveryController::resume(
        &interrupted.checkpoint_path,
        ScriptedFetcher::new(5, 3),
        fast_config(),
    );
    assert!(matches!(
        result,
        Err(CollectError::Resume(ResumeError::LockError(_)))
    ));
}
