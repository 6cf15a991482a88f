// Decides which filesystem events are worth committing.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use autocommit_common::path::relative_slash_path;
use glob::{MatchOptions, Pattern};
use tracing::trace;

use crate::config::{ConfigError, MonitoringConfig};

/// Filesystem facts the filter needs; injectable for tests.
pub trait MetadataProvider: Send + Sync {
    fn is_dir(&self, path: &Path) -> bool;
    /// Last modification time, `None` if the file is gone or unreadable.
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsMetadata;

impl MetadataProvider for FsMetadata {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct FileChangeFilter {
    root: PathBuf,
    exclude: Vec<Pattern>,
    include: Vec<Pattern>,
    min_file_age: Duration,
}

impl FileChangeFilter {
    pub fn new(root: impl Into<PathBuf>, config: &MonitoringConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            root: root.into(),
            exclude: compile(&config.exclude_patterns)?,
            include: compile(&config.include_patterns)?,
            min_file_age: config.min_file_age(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn should_include(&self, path: &Path, metadata: &dyn MetadataProvider) -> bool {
        self.should_include_at(path, metadata, SystemTime::now())
    }

    /// Like `should_include` with an explicit clock (for testing).
    pub fn should_include_at(
        &self,
        path: &Path,
        metadata: &dyn MetadataProvider,
        now: SystemTime,
    ) -> bool {
        if metadata.is_dir(path) {
            return false;
        }

        let Ok(relative) = relative_slash_path(path, &self.root) else {
            trace!(path = %path.display(), "outside watch root");
            return false;
        };
        let components: Vec<&str> = relative.split('/').collect();

        let excluded_by =
            self.exclude.iter().find(|pattern| matches_any_window(pattern, &components));
        if let Some(pattern) = excluded_by {
            trace!(path = %relative, pattern = %pattern, "excluded");
            return false;
        }

        let included = self.include.iter().any(|pattern| matches_suffix(pattern, &components));
        if !self.include.is_empty() && !included {
            trace!(path = %relative, "not in include list");
            return false;
        }

        if !self.min_file_age.is_zero() {
            if let Some(modified) = metadata.modified(path) {
                let age = now.duration_since(modified).unwrap_or_default();
                if age < self.min_file_age {
                    trace!(path = %relative, age_ms = age.as_millis() as u64, "too fresh");
                    return false;
                }
            }
        }

        true
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw)
                .map_err(|error| ConfigError::Invalid(format!("invalid glob `{raw}`: {error}")))
        })
        .collect()
}

/// True if the pattern matches any contiguous run of components, so
/// directory patterns like `.git/*` hit files at any depth below.
fn matches_any_window(pattern: &Pattern, components: &[&str]) -> bool {
    (0..components.len()).any(|start| {
        (start + 1..=components.len())
            .any(|end| pattern.matches_with(&components[start..end].join("/"), MATCH_OPTIONS))
    })
}

/// True if the pattern matches a trailing run of components
/// (`*.rs` accepts `src/main.rs`).
fn matches_suffix(pattern: &Pattern, components: &[&str]) -> bool {
    (0..components.len())
        .any(|start| pattern.matches_with(&components[start..].join("/"), MATCH_OPTIONS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakeMetadata {
        dirs: HashSet<PathBuf>,
        modified: HashMap<PathBuf, SystemTime>,
    }

    impl MetadataProvider for FakeMetadata {
        fn is_dir(&self, path: &Path) -> bool {
            self.dirs.contains(path)
        }

        fn modified(&self, path: &Path) -> Option<SystemTime> {
            self.modified.get(path).copied()
        }
    }

    fn root() -> PathBuf {
        PathBuf::from("/work/repo")
    }

    fn filter(config: &MonitoringConfig) -> FileChangeFilter {
        FileChangeFilter::new(root(), config).unwrap()
    }

    fn defaults() -> FileChangeFilter {
        filter(&MonitoringConfig::default())
    }

    #[test]
    fn default_excludes_reject_pycache_and_git_internals() {
        let f = defaults();
        let meta = FakeMetadata::default();
        assert!(!f.should_include(&root().join("__pycache__/module.o"), &meta));
        assert!(!f.should_include(&root().join("pkg/__pycache__/module.o"), &meta));
        assert!(!f.should_include(&root().join(".git/objects/ab/cdef"), &meta));
        assert!(!f.should_include(&root().join(".git/index"), &meta));
        assert!(!f.should_include(&root().join("logs/server.log"), &meta));
        assert!(!f.should_include(&root().join("config/.env"), &meta));
        assert!(!f.should_include(&root().join(".env.local"), &meta));
    }

    #[test]
    fn include_pattern_matches_nested_file() {
        let config = MonitoringConfig {
            include_patterns: vec!["*.rs".into()],
            ..MonitoringConfig::default()
        };

        let f = filter(&config);
        let meta = FakeMetadata::default();
        assert!(f.should_include(&root().join("src/main.rs"), &meta));
        assert!(!f.should_include(&root().join("README.md"), &meta));
    }

    #[test]
    fn include_pattern_with_directory_is_anchored_right() {
        let config = MonitoringConfig {
            include_patterns: vec!["src/*.rs".into()],
            ..MonitoringConfig::default()
        };
        let f = filter(&config);
        let meta = FakeMetadata::default();
        assert!(f.should_include(&root().join("src/lib.rs"), &meta));
        assert!(f.should_include(&root().join("crates/x/src/lib.rs"), &meta));
        assert!(!f.should_include(&root().join("src/git/worker.rs"), &meta));
    }

    #[test]
    fn empty_include_list_accepts_everything_not_excluded() {
        let f = defaults();
        let meta = FakeMetadata::default();
        assert!(f.should_include(&root().join("docs/guide.md"), &meta));
        assert!(f.should_include(&root().join("Makefile"), &meta));
    }

    #[test]
    fn directories_are_rejected() {
        let f = defaults();
        let mut meta = FakeMetadata::default();
        meta.dirs.insert(root().join("src"));
        assert!(!f.should_include(&root().join("src"), &meta));
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let f = defaults();
        assert!(!f.should_include(Path::new("/etc/passwd"), &FakeMetadata::default()));
    }

    #[test]
    fn exclusion_does_not_match_partial_component() {
        let f = defaults();
        let meta = FakeMetadata::default();
        // `venv/*` must not swallow `myvenv/...`.
        assert!(f.should_include(&root().join("myvenv/notes.md"), &meta));
        assert!(!f.should_include(&root().join("venv/lib/site.py"), &meta));
    }

    #[test]
    fn fresh_files_are_rejected_when_min_age_set() {
        let config = MonitoringConfig { min_file_age_ms: 1_000, ..MonitoringConfig::default() };
        let f = filter(&config);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);

        let fresh = root().join("fresh.md");
        let settled = root().join("settled.md");
        let mut meta = FakeMetadata::default();
        meta.modified.insert(fresh.clone(), now - Duration::from_millis(200));
        meta.modified.insert(settled.clone(), now - Duration::from_secs(5));

        assert!(!f.should_include_at(&fresh, &meta, now));
        assert!(f.should_include_at(&settled, &meta, now));
        // Unknown age (deleted file) passes.
        assert!(f.should_include_at(&root().join("gone.md"), &meta, now));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let config =
            MonitoringConfig { exclude_patterns: vec!["[".into()], ..MonitoringConfig::default() };

        assert!(FileChangeFilter::new(root(), &config).is_err());
    }
}
