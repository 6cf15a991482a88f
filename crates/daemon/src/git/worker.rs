use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use autocommit_common::types::ChangeKind;

use super::runner::{CommandResult, CommandRunner, ProcessCommandRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommandError {
    EmptyAddPaths,
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    UnexpectedOutput { command: String, output: String },
}

impl GitCommandError {
    /// The command line that failed, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            GitCommandError::EmptyAddPaths => None,
            GitCommandError::SpawnFailed { command, .. }
            | GitCommandError::CommandFailed { command, .. }
            | GitCommandError::UnexpectedOutput { command, .. } => Some(command),
        }
    }

    /// Best-effort detail text for logs and error chains.
    pub fn detail(&self) -> String {
        match self {
            GitCommandError::EmptyAddPaths => "no paths".to_string(),
            GitCommandError::SpawnFailed { message, .. } => message.clone(),
            GitCommandError::CommandFailed { stderr, .. } => stderr.trim().to_string(),
            GitCommandError::UnexpectedOutput { output, .. } => output.trim().to_string(),
        }
    }
}

impl Display for GitCommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitCommandError::EmptyAddPaths => write!(f, "git add requires at least one path"),
            GitCommandError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitCommandError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
            GitCommandError::UnexpectedOutput { command, output } => {
                write!(f, "`{command}` produced unexpected output: {}", output.trim())
            }
        }
    }
}

impl Error for GitCommandError {}

/// One line of `git status --porcelain=v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Two-letter status code, e.g. ` M`, `??`, `R `.
    pub code: String,
    /// Repo-relative path, slash separated.
    pub path: String,
    /// Source path for renames and copies.
    pub orig_path: Option<String>,
    pub kind: ChangeKind,
}

/// Map a porcelain XY code to a change kind.
pub fn classify_status_code(code: &str) -> ChangeKind {
    let mut chars = code.chars();
    let x = chars.next().unwrap_or(' ');
    let y = chars.next().unwrap_or(' ');

    if code == "??" || x == 'A' {
        ChangeKind::Added
    } else if x == 'D' || y == 'D' {
        ChangeKind::Deleted
    } else if x == 'R' || y == 'R' {
        ChangeKind::Renamed
    } else if x == 'C' || y == 'C' {
        ChangeKind::Copied
    } else {
        ChangeKind::Modified
    }
}

/// Parse NUL-terminated porcelain v1 output (`git status --porcelain=v1 -z`).
///
/// Rename and copy records carry the source path as an extra NUL field.
pub fn parse_porcelain_z(output: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0').filter(|field| !field.is_empty());

    while let Some(record) = fields.next() {
        if record.len() < 4 || !record.is_char_boundary(2) || !record.is_char_boundary(3) {
            continue;
        }
        let code = &record[..2];
        let path = record[3..].to_string();
        let orig_path = if code.contains('R') || code.contains('C') {
            fields.next().map(str::to_string)
        } else {
            None
        };

        entries.push(StatusEntry {
            code: code.to_string(),
            path,
            orig_path,
            kind: classify_status_code(code),
        });
    }

    entries
}

#[derive(Debug, Clone)]
pub struct GitWorker<R = ProcessCommandRunner> {
    repo_path: PathBuf,
    runner: R,
    env: Vec<(String, String)>,
}

impl GitWorker<ProcessCommandRunner> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_runner(repo_path, ProcessCommandRunner::default())
    }
}

impl<R: CommandRunner> GitWorker<R> {
    pub fn with_runner(repo_path: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            repo_path: repo_path.into(),
            runner,
            env: vec![("LC_ALL".to_string(), "C".to_string())],
        }
    }

    /// Extra environment passed to every invocation (auth, prompts).
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    // ── Repository discovery ───────────────────────────────────────────

    pub fn is_repository(&self) -> bool {
        self.run(args(&["rev-parse", "--git-dir"])).is_ok()
    }

    pub fn toplevel(&self) -> Result<PathBuf, GitCommandError> {
        let output = self.run(args(&["rev-parse", "--show-toplevel"]))?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    /// Current branch name, `None` on a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>, GitCommandError> {
        let output = self.run(args(&["branch", "--show-current"]))?;
        let branch = output.stdout.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    /// URL of a configured remote, `None` when the remote does not exist.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>, GitCommandError> {
        let argv = args(&["remote", "get-url", remote]);
        let result = self.run_raw(&argv)?;
        if result.success {
            return Ok(Some(result.stdout.trim().to_string()));
        }
        // `git remote get-url` exits 2 for an unknown remote.
        if result.code == Some(2) {
            return Ok(None);
        }
        Err(failure(&argv, result))
    }

    // ── Working tree ───────────────────────────────────────────────────

    pub fn status(&self) -> Result<Vec<StatusEntry>, GitCommandError> {
        let output = self.run(args(&["status", "--porcelain=v1", "-z", "--untracked-files=all"]))?;
        Ok(parse_porcelain_z(&output.stdout))
    }

    pub fn add_all(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(args(&["add", "-A"]))
    }

    pub fn add_paths<S: AsRef<str>>(
        &self,
        paths: &[S],
    ) -> Result<GitCommandOutput, GitCommandError> {
        if paths.is_empty() {
            return Err(GitCommandError::EmptyAddPaths);
        }

        let mut argv = args(&["add", "-A", "--"]);
        argv.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.run(argv)
    }

    pub fn commit(&self, message: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(vec!["commit".to_string(), "-m".to_string(), message.to_string()])
    }

    pub fn commit_no_edit(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(args(&["commit", "--no-edit"]))
    }

    /// Commit object capturing tracked working-tree changes without
    /// touching the index or the tree. `None` when there is nothing to stash.
    pub fn stash_snapshot(&self) -> Result<Option<String>, GitCommandError> {
        let output = self.run(args(&["stash", "create"]))?;
        let oid = output.stdout.trim();
        Ok((!oid.is_empty()).then(|| oid.to_string()))
    }

    // ── Remote interaction ─────────────────────────────────────────────

    pub fn fetch(&self, remote: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(args(&["fetch", remote]))
    }

    pub fn remote_ref_exists(&self, remote: &str, branch: &str) -> Result<bool, GitCommandError> {
        let reference = format!("refs/remotes/{remote}/{branch}");
        let argv = args(&["rev-parse", "--verify", "--quiet", &reference]);
        let result = self.run_raw(&argv)?;
        match (result.success, result.code) {
            (true, _) => Ok(true),
            (false, Some(1)) => Ok(false),
            _ => Err(failure(&argv, result)),
        }
    }

    /// Number of commits reachable from HEAD but not from `upstream`.
    pub fn count_unpushed(&self, upstream: &str) -> Result<usize, GitCommandError> {
        let range = format!("{upstream}..HEAD");
        let argv = args(&["rev-list", "--count", &range]);
        let output = self.run(argv.clone())?;
        output.stdout.trim().parse::<usize>().map_err(|_| GitCommandError::UnexpectedOutput {
            command: render(&argv),
            output: output.stdout.clone(),
        })
    }

    pub fn merge_base(&self, left: &str, right: &str) -> Result<String, GitCommandError> {
        let output = self.run(args(&["merge-base", left, right]))?;
        Ok(output.stdout.trim().to_string())
    }

    /// Three-way dry-run merge; returns the merge-tree report.
    pub fn merge_tree(
        &self,
        base: &str,
        ours: &str,
        theirs: &str,
    ) -> Result<String, GitCommandError> {
        let output = self.run(args(&["merge-tree", base, ours, theirs]))?;
        Ok(output.stdout)
    }

    /// `git pull --no-edit`. A non-zero exit is returned as data so the
    /// caller can inspect it for conflict markers.
    pub fn pull_no_edit(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<CommandResult, GitCommandError> {
        self.run_raw(&args(&["pull", "--no-edit", remote, branch]))
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(args(&["push", remote, branch]))
    }

    pub fn ls_remote_heads(&self, remote: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(args(&["ls-remote", "--heads", remote]))
    }

    // ── Plumbing ───────────────────────────────────────────────────────

    fn run_raw(&self, argv: &[String]) -> Result<CommandResult, GitCommandError> {
        self.runner.run(argv, &self.repo_path, &self.env).map_err(|error| {
            GitCommandError::SpawnFailed { command: render(argv), message: error.to_string() }
        })
    }

    fn run(&self, argv: Vec<String>) -> Result<GitCommandOutput, GitCommandError> {
        let result = self.run_raw(&argv)?;
        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }
        Err(failure(&argv, result))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn render(argv: &[String]) -> String {
    format!("git {}", argv.join(" "))
}

fn failure(argv: &[String], result: CommandResult) -> GitCommandError {
    let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };
    GitCommandError::CommandFailed { command: render(argv), code: result.code, stderr }
}
