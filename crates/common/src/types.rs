// Core domain types shared across all autocommit crates.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a single path in the working tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filesystem change observed by the watcher.
///
/// Events are immutable. Once folded into a pending change set they are
/// only reachable through that set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed file.
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self { path: path.into(), kind, observed_at: Utc::now() }
    }

    pub fn observed(
        path: impl Into<PathBuf>,
        kind: ChangeKind,
        observed_at: DateTime<Utc>,
    ) -> Self {

        Self { path: path.into(), kind, observed_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn change_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ChangeKind::Renamed).unwrap();
        assert_eq!(json, "\"renamed\"");
        let back: ChangeKind = serde_json::from_str("\"copied\"").unwrap();
        assert_eq!(back, ChangeKind::Copied);
    }

    #[test]
    fn change_kind_display_matches_wire_name() {
        assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
        assert_eq!(ChangeKind::Added.as_str(), "added");
    }

    #[test]
    fn change_event_observed_keeps_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = ChangeEvent::observed("/repo/src/main.rs", ChangeKind::Modified, at);
        assert_eq!(event.observed_at, at);
        assert_eq!(event.path, PathBuf::from("/repo/src/main.rs"));
    }

    #[test]
    fn change_event_json_roundtrip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = ChangeEvent::observed("/repo/a.py", ChangeKind::Added, at);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"added\""));
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
