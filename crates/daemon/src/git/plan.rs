// What a single flush is going to commit.

use std::collections::BTreeSet;
use std::fmt;

use autocommit_common::types::ChangeKind;
use serde::Serialize;

use super::worker::StatusEntry;

/// Aggregate change type of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Mixed,
}

impl ChangeType {
    /// Fold per-file kinds into one change type. Copies count as additions.
    /// Returns `None` for an empty input.
    pub fn from_kinds(kinds: impl IntoIterator<Item = ChangeKind>) -> Option<Self> {
        let mut folded: Option<Self> = None;
        for kind in kinds {
            let this = match kind {
                ChangeKind::Added | ChangeKind::Copied => Self::Added,
                ChangeKind::Modified => Self::Modified,
                ChangeKind::Deleted => Self::Deleted,
                ChangeKind::Renamed => Self::Renamed,
            };
            folded = match folded {
                None => Some(this),
                Some(previous) if previous == this => Some(previous),
                Some(_) => return Some(Self::Mixed),
            };
        }
        folded
    }

    /// Verb that opens the commit subject.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Added => "Add",
            Self::Modified => "Update",
            Self::Deleted => "Remove",
            Self::Renamed => "Rename",
            Self::Mixed => "Change",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_path: Option<String>,
}

impl From<&StatusEntry> for PlannedFile {
    fn from(entry: &StatusEntry) -> Self {
        Self { path: entry.path.clone(), kind: entry.kind, orig_path: entry.orig_path.clone() }
    }
}

/// Files a flush will stage and commit, derived from recorded changes
/// and live `git status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitPlan {
    pub change_type: ChangeType,
    pub files: Vec<PlannedFile>,
    pub branch: String,
}

impl CommitPlan {
    /// Intersect recorded repo-relative paths with status entries.
    ///
    /// A status entry is kept when its path, or the source of a rename,
    /// was recorded. Paths whose changes were reverted have no status entry
    /// and drop out. Returns `None` when nothing remains.
    pub fn build(
        recorded: &BTreeSet<String>,
        status: &[StatusEntry],
        branch: &str,
    ) -> Option<Self> {
        let files: Vec<PlannedFile> = status
            .iter()
            .filter(|entry| {
                recorded.contains(&entry.path)
                    || entry.orig_path.as_ref().is_some_and(|orig| recorded.contains(orig))
            })
            .map(PlannedFile::from)
            .collect();

        Self::from_files(files, branch)
    }

    /// Plan covering every status entry (used for dry-run previews).
    pub fn from_status(status: &[StatusEntry], branch: &str) -> Option<Self> {
        let files = status.iter().map(PlannedFile::from).collect();
        Self::from_files(files, branch)
    }

    fn from_files(files: Vec<PlannedFile>, branch: &str) -> Option<Self> {
        let change_type = ChangeType::from_kinds(files.iter().map(|file| file.kind))?;
        Some(Self { change_type, files, branch: branch.to_string() })
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|file| file.path.clone()).collect()
    }

    /// Pathspecs for `git add -A --`, including rename sources so the
    /// deletion side is staged too.
    pub fn stage_paths(&self) -> Vec<String> {
        let mut paths = BTreeSet::new();
        for file in &self.files {
            paths.insert(file.path.clone());
            if let Some(orig) = &file.orig_path {
                paths.insert(orig.clone());
            }
        }
        paths.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::worker::parse_porcelain_z;

    fn recorded(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    // ── ChangeType ─────────────────────────────────────────────────────

    #[test]
    fn single_kind_keeps_its_type() {
        assert_eq!(
            ChangeType::from_kinds([ChangeKind::Modified, ChangeKind::Modified]),
            Some(ChangeType::Modified)
        );
        assert_eq!(ChangeType::from_kinds([ChangeKind::Deleted]), Some(ChangeType::Deleted));
    }

    #[test]
    fn copies_fold_into_added() {
        let kinds = [ChangeKind::Copied, ChangeKind::Added];
        assert_eq!(ChangeType::from_kinds(kinds), Some(ChangeType::Added));
    }

    #[test]
    fn different_kinds_are_mixed() {
        let kinds = [ChangeKind::Added, ChangeKind::Deleted];
        assert_eq!(ChangeType::from_kinds(kinds), Some(ChangeType::Mixed));

    }

    #[test]
    fn empty_has_no_type() {
        assert_eq!(ChangeType::from_kinds(std::iter::empty()), None);
    }

    #[test]
    fn prefixes() {
        assert_eq!(ChangeType::Added.prefix(), "Add");
        assert_eq!(ChangeType::Modified.prefix(), "Update");
        assert_eq!(ChangeType::Deleted.prefix(), "Remove");
        assert_eq!(ChangeType::Renamed.prefix(), "Rename");
        assert_eq!(ChangeType::Mixed.prefix(), "Change");
    }

    // ── CommitPlan ─────────────────────────────────────────────────────

    #[test]
    fn plan_keeps_only_recorded_paths() {
        let status = parse_porcelain_z(" M a.py\0 M b.py\0?? scratch.log\0");
        let plan = CommitPlan::build(&recorded(&["a.py", "b.py"]), &status, "main").expect("plan");
        assert_eq!(plan.file_names(), vec!["a.py", "b.py"]);
        assert_eq!(plan.change_type, ChangeType::Modified);
        assert_eq!(plan.branch, "main");
    }

    #[test]
    fn reverted_paths_drop_out() {
        let status = parse_porcelain_z(" M a.py\0");
        assert!(CommitPlan::build(&recorded(&["b.py"]), &status, "main").is_none());
    }

    #[test]
    fn rename_matched_by_source_stages_both_sides() {
        let status = parse_porcelain_z("R  new.md\0old.md\0");
        let plan = CommitPlan::build(&recorded(&["old.md"]), &status, "main").expect("plan");
        assert_eq!(plan.change_type, ChangeType::Renamed);
        assert_eq!(plan.stage_paths(), vec!["new.md", "old.md"]);
    }

    #[test]
    fn mixed_kinds_make_mixed_plan() {
        let status = parse_porcelain_z("?? a.py\0 D b.py\0");
        let plan = CommitPlan::build(&recorded(&["a.py", "b.py"]), &status, "dev").expect("plan");
        assert_eq!(plan.change_type, ChangeType::Mixed);
    }

    #[test]
    fn from_status_covers_everything() {
        let status = parse_porcelain_z("?? a.py\0 M b.py\0");
        let plan = CommitPlan::from_status(&status, "main").expect("plan");
        assert_eq!(plan.files.len(), 2);
    }
}
