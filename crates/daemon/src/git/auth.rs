// Credentials for talking to the remote.
//
// Credentials reach git only through environment variables on each
// invocation; nothing is written to git config files.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use super::runner::CommandRunner;
use super::worker::GitWorker;
use crate::config::{AuthConfig, AuthMethod};
use crate::error::AutoCommitError;
use crate::security::{read_secret_file, redact};

/// Environment variables consulted when no token file is present.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GIT_PASSWORD"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    TokenFile(PathBuf),
    EnvVar(&'static str),
    SshKey(PathBuf),
    Ambient,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenFile(path) => write!(f, "token file {}", path.display()),
            Self::EnvVar(name) => write!(f, "${name}"),
            Self::SshKey(path) => write!(f, "ssh key {}", path.display()),
            Self::Ambient => f.write_str("git defaults"),
        }
    }
}

#[derive(Clone)]
pub struct GitAuth {
    method: AuthMethod,
    source: CredentialSource,
    env: Vec<(String, String)>,
    token_hint: Option<String>,
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuth")
            .field("method", &self.method)
            .field("source", &self.source)
            .field("token", &self.token_hint)
            .finish_non_exhaustive()
    }
}

impl GitAuth {
    /// Resolve credentials from the process environment.
    pub fn resolve(config: &AuthConfig, repo_root: &Path) -> Result<Self> {
        Self::resolve_with(config, repo_root, |name| std::env::var(name).ok())
    }

    /// Resolve credentials with an injectable environment lookup.
    pub fn resolve_with(
        config: &AuthConfig,
        repo_root: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut auth = Self::bare(config.method);

        match config.method {
            AuthMethod::Token => {
                let token_path = if config.token_file.is_absolute() {
                    config.token_file.clone()
                } else {
                    repo_root.join(&config.token_file)
                };

                let found = match read_secret_file(&token_path)? {
                    Some(token) => Some((token, CredentialSource::TokenFile(token_path.clone()))),
                    None => TOKEN_ENV_VARS.iter().copied().find_map(|name| {
                        lookup(name)
                            .map(|value| value.trim().to_string())
                            .filter(|value| !value.is_empty())
                            .map(|token| (token, CredentialSource::EnvVar(name)))
                    }),
                };

                match found {
                    Some((token, source)) => {
                        auth.env.extend(token_env(&token));
                        auth.token_hint = Some(redact(&token));
                        auth.source = source;
                    }
                    None => warn!(
                        token_file = %token_path.display(),
                        "no access token found; falling back to git's own credentials"
                    ),
                }
            }
            AuthMethod::Ssh => {
                let key = expand_home(&config.ssh_key_path);
                if key.is_file() {
                    auth.env.extend(ssh_env(&key));
                    auth.source = CredentialSource::SshKey(key);
                } else {
                    warn!(key = %key.display(), "ssh key not found; using ssh defaults");
                }
            }
            AuthMethod::None => {}
        }

        debug!(method = ?auth.method, source = %auth.source, "resolved git credentials");
        Ok(auth)
    }

    /// No credentials beyond git's own configuration.
    pub fn ambient() -> Self {
        Self::bare(AuthMethod::None)
    }

    fn bare(method: AuthMethod) -> Self {
        Self { method, source: CredentialSource::Ambient, env: no_prompt_env(), token_hint: None }
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Whether explicit credentials were found.
    pub fn has_credentials(&self) -> bool {
        self.source != CredentialSource::Ambient
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

fn no_prompt_env() -> Vec<(String, String)> {
    vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
}

/// Pass an HTTP basic-auth header through git's environment config.
pub fn token_env(token: &str) -> Vec<(String, String)> {
    let credentials = STANDARD.encode(format!("x-access-token:{token}"));
    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        ("GIT_CONFIG_VALUE_0".to_string(), format!("Authorization: Basic {credentials}")),
    ]
}

pub fn ssh_env(key: &Path) -> Vec<(String, String)> {
    let quoted = key.display().to_string().replace('\'', r"'\''");
    vec![(
        "GIT_SSH_COMMAND".to_string(),
        format!("ssh -i '{quoted}' -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new"),
    )]
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Check the remote with `git ls-remote --heads`; returns the head count.
pub fn test_connection<R: CommandRunner>(
    git: &GitWorker<R>,
    remote: &str,
) -> Result<usize, AutoCommitError> {
    let output = git
        .ls_remote_heads(remote)
        .map_err(|error| AutoCommitError::connectivity(remote, &error))?;
    Ok(output.stdout.lines().filter(|line| !line.trim().is_empty()).count())
}

#[cfg(test)]
mod tests {
    use super::super::runner::testing::{fail, ok, ScriptedRunner};
    use super::*;
    use tempfile::tempdir;

    fn token_config() -> AuthConfig {
        AuthConfig::default()
    }

    fn value<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn token_file_wins_over_environment() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".github_token"), "file-token\n").unwrap();

        let auth =
            GitAuth::resolve_with(&token_config(), dir.path(), |_| Some("env-token".into()))
                .unwrap();
        assert_eq!(auth.source(), &CredentialSource::TokenFile(dir.path().join(".github_token")));
        let header = value(auth.env(), "GIT_CONFIG_VALUE_0").unwrap();
        let expected = STANDARD.encode("x-access-token:file-token");
        assert_eq!(header, format!("Authorization: Basic {expected}"));
    }

    #[test]
    fn absolute_token_file_ignores_repo_root() {
        let dir = tempdir().unwrap();
        let token_file = dir.path().join("secrets").join("token");
        std::fs::create_dir_all(token_file.parent().unwrap()).unwrap();
        std::fs::write(&token_file, "abs-token\n").unwrap();

        let config = AuthConfig { token_file: token_file.clone(), ..AuthConfig::default() };
        let auth =
            GitAuth::resolve_with(&config, Path::new("/nonexistent/repo"), |_| None).unwrap();
        assert_eq!(auth.source(), &CredentialSource::TokenFile(token_file));
        assert!(auth.has_credentials());
    }

    #[test]
    fn environment_token_used_when_file_missing() {
        let dir = tempdir().unwrap();
        let auth = GitAuth::resolve_with(&token_config(), dir.path(), |name| {
            (name == "GIT_PASSWORD").then(|| "pw-token".to_string())
        })
        .unwrap();
        assert_eq!(auth.source(), &CredentialSource::EnvVar("GIT_PASSWORD"));
        assert_eq!(value(auth.env(), "GIT_CONFIG_KEY_0"), Some("http.extraHeader"));
        assert!(auth.has_credentials());
    }

    #[test]
    fn no_token_falls_back_to_ambient() {
        let dir = tempdir().unwrap();
        let auth = GitAuth::resolve_with(&token_config(), dir.path(), |_| None).unwrap();
        assert!(!auth.has_credentials());
        assert_eq!(value(auth.env(), "GIT_TERMINAL_PROMPT"), Some("0"));
        assert_eq!(value(auth.env(), "GIT_CONFIG_COUNT"), None);
    }

    #[test]
    fn debug_output_never_contains_token() {
        let dir = tempdir().unwrap();
        let secret = |_: &str| Some("ghp_supersecretvalue".to_string());
        let auth = GitAuth::resolve_with(&token_config(), dir.path(), secret).unwrap();
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("alue"));
    }

    #[test]
    fn ssh_key_sets_ssh_command() {
        let dir = tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, "key").unwrap();

        let config = AuthConfig {
            method: AuthMethod::Ssh,
            ssh_key_path: key.display().to_string(),
            ..AuthConfig::default()
        };
        let auth = GitAuth::resolve_with(&config, dir.path(), |_| None).unwrap();
        let command = value(auth.env(), "GIT_SSH_COMMAND").unwrap();
        assert!(command.contains("StrictHostKeyChecking=accept-new"));
        assert!(command.contains(&key.display().to_string()));
    }

    #[test]
    fn missing_ssh_key_is_not_fatal() {
        let dir = tempdir().unwrap();
        let config = AuthConfig {
            method: AuthMethod::Ssh,
            ssh_key_path: dir.path().join("nope").display().to_string(),
            ..AuthConfig::default()
        };
        let auth = GitAuth::resolve_with(&config, dir.path(), |_| None).unwrap();
        assert!(!auth.has_credentials());
    }

    #[test]
    fn expand_home_handles_tilde_prefix() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
            assert_eq!(expand_home("~"), home);
        }
        assert_eq!(expand_home("/abs/key"), PathBuf::from("/abs/key"));
    }

    #[test]
    fn test_connection_counts_heads() {
        let runner = ScriptedRunner::new();
        let heads = "abc\trefs/heads/main\ndef\trefs/heads/dev\n";
        runner.respond("ls-remote --heads origin", ok(heads));

        let git = GitWorker::with_runner("/tmp/repo", runner);
        assert_eq!(test_connection(&git, "origin").unwrap(), 2);
    }

    #[test]
    fn test_connection_failure_is_connectivity() {
        let runner = ScriptedRunner::new();
        runner.respond("ls-remote", fail(128, "fatal: Authentication failed"));
        let git = GitWorker::with_runner("/tmp/repo", runner);
        let error = test_connection(&git, "origin").unwrap_err();
        assert!(matches!(error, AutoCommitError::Connectivity { .. }));
        assert!(error.to_string().contains("Authentication failed"));
    }
}
