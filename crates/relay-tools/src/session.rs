//! Persistent shell session used by the `bash` tool.
//!
//! Each command runs in a fresh `bash -c`, but the working directory and the
//! exported environment carry over between commands. After a successful
//! command the session adopts the directory the shell ended in and records
//! any variables named by `export`. Both are read back from the same shell
//! run, so a command is never executed twice. A restart returns both to
//! what they were when the session was created.
//!
//! The session is an explicit object. Orchestrators that should observe one
//! another's `cd`/`export` share an `Arc<CommandSession>`; isolated
//! conversations each create their own. Commands on one session are
//! serialised so state updates never interleave.

use crate::guard;
use relay_sandbox::{
    run_shell_command_capturing, ExecutionLimits, SandboxError, SandboxRunResult,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Message returned by a successful restart.
pub const RESTART_MESSAGE: &str = "Shell session restarted";

const EXIT_NOT_FOUND: i32 = 127;
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandFailure {
    Timeout { seconds: u64 },
    NotFound,
    PermissionDenied,
    Blocked { reason: String },
    Execution { message: String },
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::Timeout { seconds } => {
                write!(f, "command timed out after {seconds}s")
            }
            CommandFailure::NotFound => f.write_str("command not found"),
            CommandFailure::PermissionDenied => f.write_str("permission denied"),
            CommandFailure::Blocked { reason } => write!(f, "blocked for security: {reason}"),
            CommandFailure::Execution { message } => f.write_str(message),
        }
    }
}

/// Caller-visible result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandFailure>,
}

impl CommandOutcome {
    fn succeeded(stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            error: None,
        }
    }

    fn failed(error: CommandFailure, stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            error: Some(error),
        }
    }
}

struct SessionState {
    working_dir: PathBuf,
    env: HashMap<String, String>,
}

impl SessionState {
    /// Environment for a spawn: the session variables plus a `PWD` that
    /// matches the working directory, so `pwd` prints the logical path.
    fn spawn_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert("PWD".to_string(), self.working_dir.display().to_string());
        env
    }
}

/// Shell state shared across `bash` tool invocations.
pub struct CommandSession {
    initial_dir: PathBuf,
    initial_env: HashMap<String, String>,
    limits: ExecutionLimits,
    state: Mutex<SessionState>,
}

impl CommandSession {
    /// Session rooted at the process's current directory and environment.
    pub fn from_process(limits: ExecutionLimits) -> std::io::Result<Self> {
        let dir = std::env::current_dir()?;
        Ok(Self::with_origin(dir, std::env::vars().collect(), limits))
    }

    /// Session with an explicit starting directory and environment.
    pub fn with_origin(
        dir: impl Into<PathBuf>,
        env: HashMap<String, String>,
        limits: ExecutionLimits,
    ) -> Self {
        let dir = dir.into();
        Self {
            state: Mutex::new(SessionState {
                working_dir: dir.clone(),
                env: env.clone(),
            }),
            initial_dir: dir,
            initial_env: env,
            limits,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Current working directory.
    pub async fn working_dir(&self) -> PathBuf {
        self.state.lock().await.working_dir.clone()
    }

    /// Current value of a session variable.
    pub async fn env_var(&self, key: &str) -> Option<String> {
        self.state.lock().await.env.get(key).cloned()
    }

    /// Run `command`, or reset the session when `restart` is set.
    pub async fn execute(&self, command: &str, restart: bool) -> CommandOutcome {
        let mut state = self.state.lock().await;

        if restart {
            state.working_dir = self.initial_dir.clone();
            state.env = self.initial_env.clone();
            debug!(dir = %self.initial_dir.display(), "shell session restarted");
            return CommandOutcome::succeeded(Some(RESTART_MESSAGE.to_string()), None);
        }

        if let Err(blocked) = guard::screen(command) {
            warn!(command, reason = %blocked, "command rejected");
            return CommandOutcome::failed(
                CommandFailure::Blocked {
                    reason: blocked.reason,
                },
                None,
                None,
            );
        }

        let exports = exported_names(command);
        let mut tracked = vec!["PWD"];
        tracked.extend(exports.iter().map(String::as_str));

        let result = match run_shell_command_capturing(
            command,
            &state.working_dir,
            &state.spawn_env(),
            &self.limits,
            &tracked,
        )
        .await
        {
            Ok(result) => result,
            Err(err) => return CommandOutcome::failed(spawn_failure(err), None, None),
        };

        let stdout = captured(&result.stdout_lossy(), result.truncated);
        let stderr = captured(&result.stderr_lossy(), false);

        if !result.success {
            let failure = exit_failure(&result, stderr.as_deref());
            debug!(command, exit_code = result.exit_code, "command failed");
            return CommandOutcome::failed(failure, stdout, stderr);
        }

        adopt_directory(&mut state, result.variables.get("PWD"));
        for name in &exports {
            if let Some(value) = result.variables.get(name) {
                state.env.insert(name.clone(), value.clone());
            }
        }
        if !exports.is_empty() {
            debug!(?exports, "session variables exported");
        }

        CommandOutcome::succeeded(stdout, stderr)
    }
}

/// Move the session to the directory the shell ended in, if it changed.
fn adopt_directory(state: &mut SessionState, pwd: Option<&String>) {
    let Some(dir) = pwd.map(PathBuf::from) else {
        return;
    };
    if dir == state.working_dir || !dir.is_absolute() || !dir.is_dir() {
        return;
    }
    let previous = std::mem::replace(&mut state.working_dir, dir);
    state
        .env
        .insert("OLDPWD".to_string(), previous.display().to_string());
    debug!(dir = %state.working_dir.display(), "working directory changed");
}

/// Names passed to `export` anywhere in the command line. `export` with
/// options is skipped.
fn exported_names(command: &str) -> Vec<String> {
    let mut names = Vec::new();
    for words in guard::simple_commands(command) {
        let mut words = words
            .iter()
            .skip_while(|word| guard::SHELL_KEYWORDS.contains(&word.as_str()));
        if words.next().map(String::as_str) != Some("export") {
            continue;
        }
        let args: Vec<&String> = words.collect();
        if args.iter().any(|arg| arg.starts_with('-')) {
            continue;
        }
        for arg in args {
            let name = arg.split_once('=').map_or(arg.as_str(), |(key, _)| key);
            if guard::is_identifier(name) && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn captured(text: &str, truncated: bool) -> Option<String> {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let mut out = trimmed.to_string();
    if truncated {
        out.push_str("\n... (output truncated)");
    }
    Some(out)
}

fn spawn_failure(err: SandboxError) -> CommandFailure {
    match err {
        SandboxError::Timeout(seconds) => CommandFailure::Timeout { seconds },
        SandboxError::Spawn(io) => match io.kind() {
            std::io::ErrorKind::NotFound => CommandFailure::NotFound,
            std::io::ErrorKind::PermissionDenied => CommandFailure::PermissionDenied,
            _ => CommandFailure::Execution {
                message: io.to_string(),
            },
        },
        SandboxError::Execution(message) => CommandFailure::Execution { message },
    }
}

fn exit_failure(result: &SandboxRunResult, stderr: Option<&str>) -> CommandFailure {
    match result.exit_code {
        EXIT_NOT_FOUND => CommandFailure::NotFound,
        EXIT_NOT_EXECUTABLE => CommandFailure::PermissionDenied,
        _ if stderr.is_some_and(|s| s.contains("Permission denied")) => {
            CommandFailure::PermissionDenied
        }
        code => CommandFailure::Execution {
            message: format!("command exited with status {code}"),
        },
    }
}
