// Configuration for an auto-commit session.
//
// Default location: `<root>/.autocommit/config.toml`. A `.json` file is
// read and written as JSON instead.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::ensure_owner_only_dir;

/// Directory holding per-repository state: `<root>/.autocommit/`.
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(".autocommit")
}

/// Path to the default config file: `<root>/.autocommit/config.toml`.
pub fn default_config_path(root: &Path) -> PathBuf {
    state_dir(root).join("config.toml")
}

/// Top-level configuration. Loaded once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Raise the default log level to `debug`.
    pub debug: bool,
    pub monitoring: MonitoringConfig,
    pub commit: CommitConfig,
    pub conflict: ConflictConfig,
    pub scheduling: SchedulingConfig,
    pub branch: BranchConfig,
    pub git: GitConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Load from a specific path. Malformed files are an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = if is_json(path) {
            serde_json::from_str(&contents).map_err(ConfigError::Json)?
        } else {
            toml::from_str(&contents).map_err(ConfigError::Parse)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, writing defaults there first if it does not exist.
    ///
    /// Returns the config and whether a new file was created.
    pub fn load_or_init(path: &Path) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            return Self::load_from(path).map(|config| (config, false));
        }
        let config = Self::default();
        config.save_to(path)?;
        Ok((config, true))
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            let existed = parent.exists();
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            if !existed {
                ensure_owner_only_dir(parent)
                    .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
            }
        }
        let contents = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(ConfigError::Json)?
        } else {
            toml::to_string_pretty(self).map_err(ConfigError::Serialize)?
        };
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduling.commit_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduling.commit_delay_ms must be greater than 0".into(),
            ));
        }
        if self.commit.max_message_length < MIN_MESSAGE_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "commit.max_message_length must be at least {MIN_MESSAGE_LENGTH}"
            )));
        }
        if self.scheduling.enable_rate_limiting && self.scheduling.max_commits_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "scheduling.max_commits_per_hour must be greater than 0 with rate limiting on"
                    .into(),
            ));
        }
        if self.git.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("git.remote must not be empty".into()));
        }
        let monitoring = &self.monitoring;
        for pattern in monitoring.exclude_patterns.iter().chain(&monitoring.include_patterns) {
            glob::Pattern::new(pattern).map_err(|error| {
                ConfigError::Invalid(format!("invalid glob `{pattern}`: {error}"))
            })?;
        }
        Ok(())
    }

    /// Whether any step needs a configured remote.
    pub fn needs_remote(&self) -> bool {
        self.git.auto_push || self.conflict.enabled
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

const MIN_MESSAGE_LENGTH: usize = 10;

// ── Sections ───────────────────────────────────────────────────────

/// Which files are watched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Directory to watch, relative to the repository root.
    pub watch_directory: PathBuf,
    pub recursive: bool,
    pub exclude_patterns: Vec<String>,
    /// Empty accepts every file that is not excluded.
    pub include_patterns: Vec<String>,
    /// Ignore events for files modified less than this long ago (0 = off).
    pub min_file_age_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            watch_directory: PathBuf::from("."),
            recursive: true,
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|pattern| pattern.to_string()).collect(),
            include_patterns: Vec::new(),
            min_file_age_ms: 0,
        }
    }
}

impl MonitoringConfig {
    pub fn min_file_age(&self) -> Duration {
        Duration::from_millis(self.min_file_age_ms)
    }
}

const DEFAULT_EXCLUDES: &[&str] = &[
    "*.pyc",
    "__pycache__/*",
    ".git/*",
    "*.log",
    ".DS_Store",
    "node_modules/*",
    ".venv/*",
    "venv/*",
    "*.tmp",
    "*.temp",
    ".idea/*",
    ".vscode/*",
    "*.swp",
    "*.swo",
    ".env",
    ".env.*",
    "*.db",
    "*.sqlite",
    ".autocommit/*",
    ".github_token",
    "target/*",
];

/// Commit message synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommitConfig {
    pub include_timestamp: bool,
    /// Maximum message length in characters.
    pub max_message_length: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self { include_timestamp: true, max_message_length: 100 }
    }
}

/// Pre-commit conflict detection and bounded resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConflictConfig {
    pub enabled: bool,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Stage everything and commit when a pull stops on conflicts.
    pub auto_resolve: bool,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self { enabled: true, max_retry_attempts: 3, retry_delay_ms: 2_000, auto_resolve: true }
    }
}

impl ConflictConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Debounce and throughput settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Quiet period after the last change before a commit is attempted.
    pub commit_delay_ms: u64,
    pub max_commits_per_hour: u32,
    pub enable_rate_limiting: bool,
    /// Put changes back into the pending set when a flush is skipped.
    pub retain_skipped_changes: bool,
    /// How long shutdown waits for an in-flight commit.
    pub shutdown_grace_ms: u64,
    /// Delay before retrying changes held back by the branch allow-list or
    /// a detached HEAD.
    pub retry_interval_ms: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            commit_delay_ms: 5_000,
            max_commits_per_hour: 60,
            enable_rate_limiting: true,
            retain_skipped_changes: true,
            shutdown_grace_ms: 30_000,
            retry_interval_ms: 30_000,
        }
    }
}

impl SchedulingConfig {
    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Branch allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BranchConfig {
    pub enable_branch_check: bool,
    pub allowed_branches: Vec<String>,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            enable_branch_check: true,
            allowed_branches: vec!["main".into(), "master".into(), "develop".into()],
        }
    }
}

impl BranchConfig {
    pub fn allows(&self, branch: &str) -> bool {
        !self.enable_branch_check || self.allowed_branches.iter().any(|allowed| allowed == branch)
    }
}

/// Remote settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    /// Git remote name (defaults to `"origin"`).
    pub remote: String,
    /// Branch compared against for conflicts. Empty means the current branch.
    pub target_branch: String,
    pub auto_push: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { remote: "origin".into(), target_branch: String::new(), auto_push: true }
    }
}

impl GitConfig {
    pub fn target_branch(&self) -> Option<&str> {
        let branch = self.target_branch.trim();
        (!branch.is_empty()).then_some(branch)
    }
}

/// How git authenticates against the remote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Token,
    Ssh,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Token file, relative to the repository root.
    pub token_file: PathBuf,
    /// Private key; `~` is expanded.
    pub ssh_key_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: AuthMethod::Token,
            token_file: PathBuf::from(".github_token"),
            ssh_key_path: "~/.ssh/id_rsa".into(),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Json(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::Json(e) => write!(f, "config JSON error: {e}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
