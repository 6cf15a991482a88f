use std::collections::BTreeMap;
use std::path::PathBuf;

use autocommit_common::types::{ChangeEvent, ChangeKind};
use autocommit_daemon::watcher::aggregator::ChangeAggregator;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

const PATHS: &[&str] =
    &["/repo/a.rs", "/repo/b.md", "/repo/src/c.py", "/repo/docs/d.txt", "/repo/e.toml"];


fn kind() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Added),
        Just(ChangeKind::Modified),
        Just(ChangeKind::Deleted),
        Just(ChangeKind::Renamed),
    ]
}

/// (path index, kind, seconds offset)
fn events(max: usize) -> impl Strategy<Value = Vec<(usize, ChangeKind, i64)>> {
    prop::collection::vec((0..PATHS.len(), kind(), 0i64..3_600), 0..max)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn to_event((index, kind, secs): (usize, ChangeKind, i64)) -> ChangeEvent {
    ChangeEvent::observed(PATHS[index], kind, at(secs))
}

/// Last kind recorded per path, in recording order.
fn last_writer(events: &[(usize, ChangeKind, i64)]) -> BTreeMap<PathBuf, ChangeKind> {
    events.iter().map(|&(index, kind, _)| (PathBuf::from(PATHS[index]), kind)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn drained_set_holds_last_kind_per_path(batch in events(40)) {
        let aggregator = ChangeAggregator::new();
        for event in batch.iter().copied() {
            aggregator.record(to_event(event));
        }

        let set = aggregator.drain_all();
        let expected = last_writer(&batch);
        prop_assert_eq!(set.len(), expected.len());
        for (path, kind) in &expected {
            prop_assert_eq!(set.kind_of(path), Some(*kind));
        }
        prop_assert!(aggregator.is_empty());

        let first = batch.iter().map(|&(_, _, secs)| at(secs)).min();
        let last = batch.iter().map(|&(_, _, secs)| at(secs)).max();
        prop_assert_eq!(set.first_event_at(), first);
        prop_assert_eq!(set.last_event_at(), last);
    }

    #[test]
    fn restore_never_loses_paths_and_newer_events_win(before in events(20), during in events(20)) {
        let aggregator = ChangeAggregator::new();
        for event in before.iter().copied() {
            aggregator.record(to_event(event));
        }
        let drained = aggregator.drain_all();

        for event in during.iter().copied() {
            aggregator.record(to_event(event));
        }
        aggregator.restore(drained);

        let set = aggregator.drain_all();
        let mut expected = last_writer(&before);
        expected.extend(last_writer(&during));
        prop_assert_eq!(set.len(), expected.len());
        for (path, kind) in &expected {
            prop_assert_eq!(set.kind_of(path), Some(*kind));
        }

        let first = before.iter().chain(&during).map(|&(_, _, secs)| at(secs)).min();
        prop_assert_eq!(set.first_event_at(), first);
    }
}
