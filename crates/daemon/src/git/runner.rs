// The single process boundary: every git invocation goes through a CommandRunner.

use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Combined output, stderr first, for matching on messages git may
    /// print to either stream.
    pub fn combined_output(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stderr);
        if !self.stderr.is_empty() && !self.stdout.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stdout);
        out
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<CommandResult, std::io::Error>;
}

/// Spawns the real `git` binary (or another program, for tests against a
/// wrapper script).
#[derive(Debug, Clone)]
pub struct ProcessCommandRunner {
    program: String,
}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self { program: "git".to_string() }
    }
}

impl ProcessCommandRunner {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by the git module tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub args: Vec<String>,
        pub cwd: PathBuf,
        pub env: Vec<(String, String)>,
        pub at: Instant,
    }

    impl Invocation {
        pub fn line(&self) -> String {
            self.args.join(" ")
        }
    }

    pub fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> CommandResult {
        CommandResult {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Responds by the longest registered prefix of the joined argument
    /// line. Each prefix holds a queue; the last queued response repeats.
    #[derive(Clone, Default)]
    pub struct ScriptedRunner {
        calls: Arc<Mutex<Vec<Invocation>>>,
        responses: Arc<Mutex<HashMap<String, VecDeque<CommandResult>>>>,
        delays: Arc<Mutex<HashMap<String, Duration>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, prefix: &str, result: CommandResult) -> &Self {
            self.responses
                .lock()
                .expect("scripted responses lock poisoned")
                .entry(prefix.to_string())
                .or_default()
                .push_back(result);
            self
        }

        /// Discard anything queued for `prefix` and script `result` alone.
        pub fn replace(&self, prefix: &str, result: CommandResult) -> &Self {
            self.responses
                .lock()
                .expect("scripted responses lock poisoned")
                .insert(prefix.to_string(), VecDeque::from([result]));
            self
        }

        pub fn delay(&self, prefix: &str, delay: Duration) -> &Self {
            let mut delays = self.delays.lock().expect("scripted delays lock poisoned");
            delays.insert(prefix.to_string(), delay);
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("scripted calls lock poisoned").clone()
        }

        pub fn lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::line).collect()
        }

        pub fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|call| call.line().starts_with(prefix)).count()
        }

        pub fn max_concurrent(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        fn longest_match<V>(map: &HashMap<String, V>, line: &str) -> Option<String> {
            map.keys()
                .filter(|prefix| line.starts_with(prefix.as_str()))
                .max_by_key(|prefix| prefix.len())
                .cloned()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            args: &[String],
            cwd: &Path,
            env: &[(String, String)],
        ) -> Result<CommandResult, std::io::Error> {
            let line = args.join(" ");
            self.calls.lock().expect("scripted calls lock poisoned").push(Invocation {
                args: args.to_vec(),
                cwd: cwd.to_path_buf(),
                env: env.to_vec(),
                at: Instant::now(),
            });

            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            let delay = {
                let delays = self.delays.lock().expect("scripted delays lock poisoned");
                Self::longest_match(&delays, &line).and_then(|key| delays.get(&key).copied())
            };
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }

            let result = {
                let mut responses =
                    self.responses.lock().expect("scripted responses lock poisoned");
                match Self::longest_match(&responses, &line) {
                    Some(key) => {
                        let queue = responses.get_mut(&key).expect("matched key exists");
                        if queue.len() > 1 {
                            queue.pop_front().expect("queue is non-empty")
                        } else {
                            queue.front().cloned().expect("queue is non-empty")
                        }
                    }
                    None => fail(128, &format!("unscripted command: git {line}")),
                }
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(result)
        }
    }
}
