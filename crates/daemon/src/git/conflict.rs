// Pre-commit conflict detection and bounded resolution.
//
// The check fetches the remote and dry-runs a three-way merge of the
// working tree snapshot against the upstream branch. Resolution pulls with
// a bounded number of attempts and never loops indefinitely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::runner::CommandRunner;
use super::worker::{GitCommandError, GitWorker};
use crate::config::Config;
use crate::error::AutoCommitError;

/// Slice used when sleeping between attempts so cancellation is noticed.
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSettings {
    pub remote: String,
    /// Fixed comparison branch; `None` means the current branch.
    pub target_branch: Option<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub auto_resolve: bool,
}

impl ConflictSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote: config.git.remote.clone(),
            target_branch: config.git.target_branch().map(str::to_string),
            max_retries: config.conflict.max_retry_attempts,
            retry_delay: config.conflict.retry_delay(),
            auto_resolve: config.conflict.auto_resolve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictVerdict {
    pub has_conflict: bool,
    pub reason: String,
    pub retries_used: u32,
    /// Local commits not yet on the upstream branch (informational).
    pub unpushed_commits: usize,
}

impl ConflictVerdict {
    fn clear(reason: impl Into<String>) -> Self {
        Self { has_conflict: false, reason: reason.into(), retries_used: 0, unpushed_commits: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Nothing to resolve.
    Clean,
    /// A pull merged upstream changes cleanly.
    Merged,
    /// A pull stopped on conflicts and everything was staged and committed.
    AutoResolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub kind: ResolutionKind,
    pub message: String,
    pub retries_used: u32,
}

impl Resolution {
    /// Whether HEAD or the working tree changed during resolution.
    pub fn moved_head(&self) -> bool {
        self.kind != ResolutionKind::Clean
    }
}

pub struct ConflictGuard<R: CommandRunner> {
    git: Arc<GitWorker<R>>,
    settings: ConflictSettings,
    cancel: Arc<AtomicBool>,
}

impl<R: CommandRunner> ConflictGuard<R> {
    pub fn new(git: Arc<GitWorker<R>>, settings: ConflictSettings) -> Self {
        Self { git, settings, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Share a cancellation flag; once set, retries stop between attempts.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &ConflictSettings {
        &self.settings
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn target_branch(&self, target: Option<&str>) -> Result<String, AutoCommitError> {
        if let Some(branch) = target.or(self.settings.target_branch.as_deref()) {
            return Ok(branch.to_string());
        }
        self.git.current_branch()?.ok_or_else(|| {
            AutoCommitError::Command(GitCommandError::UnexpectedOutput {
                command: "git branch --show-current".into(),
                output: "detached HEAD".into(),
            })
        })
    }

    /// Fetch and compare the working tree against `<remote>/<target>`.
    ///
    /// A failed fetch is a connectivity error, not a conflict. Unpushed
    /// local commits are reported but do not block.
    pub fn check_for_conflicts(
        &self,
        target: Option<&str>,
    ) -> Result<ConflictVerdict, AutoCommitError> {
        let remote = self.settings.remote.as_str();
        self.git.fetch(remote).map_err(|error| AutoCommitError::connectivity(remote, &error))?;

        let branch = self.target_branch(target)?;
        let upstream = format!("{remote}/{branch}");

        if !self.git.remote_ref_exists(remote, &branch)? {
            return Ok(ConflictVerdict::clear(format!("no upstream branch {upstream}")));
        }

        let unpushed = self.git.count_unpushed(&upstream)?;
        if unpushed > 0 {
            return Ok(ConflictVerdict {
                unpushed_commits: unpushed,
                ..ConflictVerdict::clear(format!(
                    "has unpushed commits ({unpushed} ahead of {upstream})"
                ))
            });
        }

        let base = self.git.merge_base("HEAD", &upstream)?;
        let ours = self.git.stash_snapshot()?.unwrap_or_else(|| "HEAD".to_string());
        let report = self.git.merge_tree(&base, &ours, &upstream)?;

        if has_conflict_markers(&report) {
            Ok(ConflictVerdict {
                has_conflict: true,
                ..ConflictVerdict::clear(format!("local changes conflict with {upstream}"))
            })
        } else {
            Ok(ConflictVerdict::clear(format!("no conflicts with {upstream}")))
        }
    }

    /// Check, and on conflict pull, up to `max_retries` attempts.
    pub fn resolve(
        &self,
        target: Option<&str>,
        max_retries: u32,
    ) -> Result<Resolution, AutoCommitError> {
        let branch = self.target_branch(target)?;
        let attempts = max_retries.max(1);
        let mut conflict_seen = false;
        let mut last_error = String::from("no attempt completed");
        let mut attempts_made = 0;

        for attempt in 0..attempts {
            if attempt > 0 && self.cancelled() {
                last_error = "cancelled during shutdown".into();
                break;
            }
            attempts_made += 1;

            match self.check_for_conflicts(Some(&branch)) {
                Err(error @ AutoCommitError::Connectivity { .. }) if !conflict_seen => {
                    // Cannot determine status; leave the retry budget alone.
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        branch = %branch,
                        attempt = attempt + 1,
                        error = %error,
                        "conflict check failed"
                    );
                    last_error = error.to_string();
                }
                Ok(verdict) if !verdict.has_conflict => {
                    debug!(branch = %branch, reason = %verdict.reason, "no conflict");
                    return Ok(Resolution {
                        kind: ResolutionKind::Clean,
                        message: "ready to commit".into(),
                        retries_used: attempt,
                    });
                }
                Ok(verdict) => {
                    conflict_seen = true;
                    warn!(
                        branch = %branch,
                        attempt = attempt + 1,
                        reason = %verdict.reason,
                        "conflict detected, pulling"
                    );
                    match self.pull_and_merge(&branch) {
                        Ok(kind) => {
                            let message = match kind {
                                ResolutionKind::AutoResolved => "auto-resolved",
                                _ => "merged upstream changes",
                            };
                            info!(
                                branch = %branch,
                                attempt = attempt + 1,
                                outcome = message,
                                "conflict resolved"
                            );
                            return Ok(Resolution {
                                kind,
                                message: message.into(),
                                retries_used: attempt,
                            });
                        }
                        Err(detail) => last_error = detail,
                    }
                }
            }

            if attempt + 1 < attempts {
                self.pause();
            }
        }

        Err(AutoCommitError::Conflict { branch, attempts: attempts_made, detail: last_error })
    }

    fn pull_and_merge(&self, branch: &str) -> Result<ResolutionKind, String> {
        let result = self
            .git
            .pull_no_edit(&self.settings.remote, branch)
            .map_err(|error| error.to_string())?;
        if result.success {
            return Ok(ResolutionKind::Merged);
        }

        let output = result.combined_output();
        if output.contains("CONFLICT") && self.settings.auto_resolve {
            warn!(
                branch = %branch,
                "pull stopped on conflicts; staging all files to finish the merge"
            );
            self.git.add_all().map_err(|error| error.to_string())?;
            self.git.commit_no_edit().map_err(|error| error.to_string())?;
            return Ok(ResolutionKind::AutoResolved);
        }

        let detail = output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("git pull failed");
        Err(detail.to_string())
    }

    fn pause(&self) {
        let deadline = Instant::now() + self.settings.retry_delay;
        loop {
            let now = Instant::now();
            if now >= deadline || self.cancelled() {
                return;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

fn conflict_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // merge-tree prints file content as a diff, so markers may carry a
    // leading `+` or space.
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[+ ]?(?:<{7}|={7}|>{7})(?:[ \t].*)?\r?$")
            .expect("conflict marker pattern should compile")
    })
}

pub fn has_conflict_markers(report: &str) -> bool {
    conflict_marker_pattern().is_match(report)
}
