// File watcher: inotify/fsevents → filter → aggregate → debounce.
// This module owns the first stage: turning raw notify events into
// `ChangeEvent`s for paths under the watch root.

pub mod aggregator;
pub mod debounce;
pub mod filter;

use anyhow::{Context, Result};
use autocommit_common::types::{ChangeEvent, ChangeKind};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

pub use aggregator::{ChangeAggregator, PendingChangeSet};
pub use debounce::DebounceTimer;
pub use filter::{FileChangeFilter, FsMetadata, MetadataProvider};

/// Capacity for the internal event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Watches the repository tree with the OS-native backend.
///
/// Events are sent to the returned receiver until the watcher is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn start(root: &Path, recursive: bool) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate_event(&event, &root_for_filter) {
                    if tx.blocking_send(change).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => error!(error = %e, "file watcher error"),
        })
        .context("failed to create file watcher")?;

        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        watcher
            .watch(&root, mode)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), recursive, "file watcher started");

        Ok((Self { _watcher: watcher, root }, rx))
    }

    /// The canonicalized root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        // Directories are not committable; their files report separately.
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        // Permission and timestamp changes carry no content.
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Translate a `notify::Event` into zero or more change events inside `root`.
fn translate_event(event: &Event, root: &Path) -> Vec<ChangeEvent> {
    let Some(kind) = change_kind(&event.kind) else {
        trace!(kind = ?event.kind, "skipping non-content event");
        return Vec::new();
    };

    // A paired rename reports [from, to]; the source side becomes a deletion.
    let paired_rename = matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both)));

    event
        .paths
        .iter()
        .enumerate()
        .filter(|(_, path)| {
            if path.starts_with(root) {
                true
            } else {
                warn!(path = %path.display(), "ignoring event outside watch root");
                false
            }
        })
        .map(|(index, path)| {
            let source_half = paired_rename && index == 0 && event.paths.len() > 1;
            let kind = if source_half { ChangeKind::Deleted } else { kind };
            ChangeEvent::new(path.clone(), kind)
        })
        .collect()
}
