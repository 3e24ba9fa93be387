//! End-to-end runs against a scripted fetcher

use crate::common::{day, fast_config, three_day_query, FetchCall, ScriptedFetcher};
use std::collections::HashSet;
use tempfile::TempDir;
use timeline_harvester::collector::{RecoveryController, RunContext, RunTermination, Termination};
use timeline_harvester::resume::{CheckpointStore, RunStatus};
use timeline_harvester::store::RecordStore;

#[tokio::test]
async fn test_three_day_run_collects_fifteen_per_day() {
    let dir = TempDir::new().unwrap();
    let query = three_day_query();
    let fetcher = ScriptedFetcher::new(5, 3);
    let calls = fetcher.calls();
    let closed = fetcher.closed();

    let context = RunContext::new(dir.path(), query.clone(), fast_config());
    let outcome = RecoveryController::start(context, fetcher, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.termination, RunTermination::Done);
    assert_eq!(outcome.stored_records, 45);
    assert_eq!(outcome.shortfall, 0);
    assert_eq!(outcome.run_id, query.run_id());

    let quotas: Vec<u64> = outcome.windows.iter().map(|w| w.window.quota).collect();
    assert_eq!(quotas, vec![10, 10, 10]);
    for report in &outcome.windows {
        assert_eq!(report.collected, 15);
        assert_eq!(report.pages, 3);
        assert_eq!(report.termination, Termination::QuotaReached);
    }

    // Earliest day first, three pages each, nothing after the quota was crossed
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 9);
    assert_eq!(calls[0], FetchCall { since: day("2023-01-01"), page: 0 });
    assert_eq!(calls[3], FetchCall { since: day("2023-01-02"), page: 0 });
    assert_eq!(calls[8], FetchCall { since: day("2023-01-03"), page: 2 });
    assert!(*closed.lock().unwrap());

    let checkpoint = CheckpointStore::new(&outcome.checkpoint_path).read().unwrap();
    assert_eq!(checkpoint.status, RunStatus::Done);
    assert_eq!(checkpoint.boundary, day("2023-01-04"));
    assert_eq!(checkpoint.stored_records, 45);
    assert_eq!(checkpoint.remaining_quota, 0);
    assert_eq!(checkpoint.completed_windows, 3);

    let store_path = outcome.checkpoint_path.with_file_name("records.jsonl");
    let mut urls = HashSet::new();
    let summary = RecordStore::replay(&store_path, |record| {
        assert!(urls.insert(record.url));
        Ok(())
    })
    .unwrap();
    assert_eq!(summary.records, 45);
    assert!(!summary.torn_tail);
}

#[tokio::test]
async fn test_short_windows_are_reported_not_failed() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new(5, 1);

    let context = RunContext::new(dir.path(), three_day_query(), fast_config());
    let outcome = RecoveryController::start(context, fetcher, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.termination, RunTermination::Done);
    assert_eq!(outcome.stored_records, 15);
    assert_eq!(outcome.shortfall, 15);
    for report in &outcome.windows {
        assert_eq!(report.shortfall(), 5);
    }

    let checkpoint = CheckpointStore::new(&outcome.checkpoint_path).read().unwrap();
    assert_eq!(checkpoint.shortfall, 15);
    assert_eq!(checkpoint.remaining_quota, 15);
}

#[tokio::test]
async fn test_existing_run_requires_force() {
    let dir = TempDir::new().unwrap();

    let context = RunContext::new(dir.path(), three_day_query(), fast_config());
    RecoveryController::start(context.clone(), ScriptedFetcher::new(5, 3), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let refused = RecoveryController::start(context.clone(), ScriptedFetcher::new(5, 3), false);
    assert!(matches!(
        refused,
        Err(timeline_harvester::collector::CollectError::RunExists(_))
    ));

    let fetcher = ScriptedFetcher::new(5, 1);
    let outcome = RecoveryController::start(context, fetcher, true)
        .unwrap()
        .run()
        .await
        .unwrap();
    // The old store was discarded, not appended to
    assert_eq!(outcome.stored_records, 15);
}

#[tokio::test]
async fn test_quota_smaller_than_days() {
    let dir = TempDir::new().unwrap();
    let query = timeline_harvester::Query::new("rust", day("2023-01-01"), day("2023-01-04"), 2).unwrap();
    let fetcher = ScriptedFetcher::new(5, 3);
    let calls = fetcher.calls();

    let context = RunContext::new(dir.path(), query, fast_config());
    let outcome = RecoveryController::start(context, fetcher, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let quotas: Vec<u64> = outcome.windows.iter().map(|w| w.window.quota).collect();
    assert_eq!(quotas, vec![0, 0, 2]);
    // Only the last window fetches: one page of 5 crosses a quota of 2
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(outcome.stored_records, 5);
    assert_eq!(outcome.termination, RunTermination::Done);
}
