// Accumulates filtered change events into the pending set for the next commit.
//
// Rapid events on the same path coalesce: the last kind wins while the
// set remembers when the batch started.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use autocommit_common::types::{ChangeEvent, ChangeKind};
use chrono::{DateTime, Utc};

/// Changes waiting for the next flush, keyed by absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChangeSet {
    changes: BTreeMap<PathBuf, ChangeEvent>,
    first_event_at: Option<DateTime<Utc>>,
    last_event_at: Option<DateTime<Utc>>,
}

impl PendingChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, path: &std::path::Path) -> Option<&ChangeEvent> {
        self.changes.get(path)
    }

    pub fn kind_of(&self, path: &std::path::Path) -> Option<ChangeKind> {
        self.changes.get(path).map(|event| event.kind)
    }

    /// Events in path order.
    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.changes.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.changes.keys()
    }

    pub fn first_event_at(&self) -> Option<DateTime<Utc>> {
        self.first_event_at
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    fn upsert(&mut self, event: ChangeEvent) {
        let at = event.observed_at;
        self.first_event_at = Some(self.first_event_at.map_or(at, |first| first.min(at)));
        self.last_event_at = Some(self.last_event_at.map_or(at, |last| last.max(at)));
        self.changes.insert(event.path.clone(), event);
    }
}

#[derive(Debug, Default)]
pub struct ChangeAggregator {
    pending: Mutex<PendingChangeSet>,
}

impl ChangeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the pending set.
    pub fn record(&self, event: ChangeEvent) {
        self.pending.lock().expect("pending change set lock poisoned").upsert(event);
    }

    /// Take the whole pending set, leaving an empty one behind.
    pub fn drain_all(&self) -> PendingChangeSet {
        std::mem::take(&mut *self.pending.lock().expect("pending change set lock poisoned"))
    }

    /// Put a drained set back after an abandoned flush. Entries recorded
    /// since the drain are newer and win.
    pub fn restore(&self, drained: PendingChangeSet) {
        if drained.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().expect("pending change set lock poisoned");
        let newer = std::mem::replace(&mut *pending, drained);
        pending.first_event_at = match (pending.first_event_at, newer.first_event_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        pending.last_event_at = match (pending.last_event_at, newer.last_event_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        pending.changes.extend(newer.changes);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().expect("pending change set lock poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("pending change set lock poisoned").len()
    }
}
