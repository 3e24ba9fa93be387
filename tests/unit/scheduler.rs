//! Unit tests for TimeWindowScheduler through the public API

use crate::common::day;
use timeline_harvester::collector::TimeWindowScheduler;
use timeline_harvester::Query;

#[test]
fn test_quotas_sum_to_query_quota() {
    for days in 1..=40u64 {
        for quota in [1u64, 2, 7, 30, 99, 1000, 12_345] {
            let since = day("2023-01-01");
            let until = since + chrono::Days::new(days);
            let query = Query::new("q", since, until, quota).unwrap();
            let windows = TimeWindowScheduler::for_query(&query).windows();

            assert_eq!(windows.len() as u64, days);
            assert_eq!(windows.iter().map(|w| w.quota).sum::<u64>(), quota, "days={days} quota={quota}");
        }
    }
}

#[test]
fn test_windows_are_contiguous_days() {
    let query = Query::new("q", day("2023-02-27"), day("2023-03-02"), 9).unwrap();
    let windows = TimeWindowScheduler::for_query(&query).windows();

    assert_eq!(windows.first().unwrap().since, query.since());
    assert_eq!(windows.last().unwrap().until, query.until());
    for pair in windows.windows(2) {
        assert_eq!(pair[0].until, pair[1].since);
        assert_eq!(pair[0].index + 1, pair[1].index);
    }
}

#[test]
fn test_windows_from_boundary_keep_original_quotas() {
    let query = Query::new("q", day("2023-01-01"), day("2023-01-04"), 31).unwrap();
    let scheduler = TimeWindowScheduler::for_query(&query);

    let rest = scheduler.windows_from(day("2023-01-02"));
    assert_eq!(rest.iter().map(|w| w.quota).collect::<Vec<_>>(), vec![10, 11]);
    assert!(scheduler.windows_from(query.until()).is_empty());
}
