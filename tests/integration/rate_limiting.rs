//! Integration tests for fetch pacing

use crate::common::{fast_config, three_day_query, ScriptedFetcher};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use timeline_harvester::collector::{RateLimiter, RecoveryController, RunContext};

#[tokio::test]
async fn test_rate_limiter_spaces_consecutive_waits() {
    let mut limiter = RateLimiter::new(Duration::from_millis(50));

    let start = Instant::now();
    limiter.wait().await;
    assert!(start.elapsed() < Duration::from_millis(40), "first wait is immediate");

    limiter.wait().await;
    limiter.wait().await;
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_run_respects_minimum_delay_across_windows() {
    let dir = TempDir::new().unwrap();
    let config = fast_config().with_rate_limit(Duration::from_millis(40));
    let context = RunContext::new(dir.path(), three_day_query(), config);

    let start = Instant::now();
    let outcome = RecoveryController::start(context, ScriptedFetcher::new(5, 3), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    // Nine fetches, eight gaps, including the gaps between windows
    assert_eq!(outcome.stored_records, 45);
    assert!(start.elapsed() >= Duration::from_millis(8 * 40));
}
