//! Process-level command execution for the shell tool.
//!
//! Runs one command through `/bin/bash -c` with an explicit working directory
//! and a fully-specified environment, under a wall-clock timeout and a cap on
//! how much stdout/stderr is retained. The command gets its own process group
//! so a timeout takes down everything it started.
//!
//! Callers that track shell state can ask for variables to be read back from
//! the same shell once the command has finished successfully.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// Default wall-clock limit for a single command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of bytes kept per output stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const SHELL: &str = "/bin/bash";

/// Limits applied to every command run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall-clock timeout; the process group is killed when it elapses.
    pub timeout: Duration,
    /// Bytes retained per stream. Output past this point is drained and dropped.
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Result from a command run.
#[derive(Debug, Clone)]
pub struct SandboxRunResult {
    /// Child process stdout, at most `max_output_bytes`.
    pub stdout: Vec<u8>,
    /// Child process stderr, at most `max_output_bytes`.
    pub stderr: Vec<u8>,
    /// Child process exit code. -1 when killed by a signal.
    pub exit_code: i32,
    /// Whether process exited with success status.
    pub success: bool,
    /// Whether either stream was cut at the output cap.
    pub truncated: bool,
    /// Requested variables as the shell left them; unset ones are absent.
    /// Empty unless the command succeeded and returned control to the shell.
    pub variables: HashMap<String, String>,
}

impl SandboxRunResult {
    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Errors returned by the command runner.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Command execution exceeded timeout.
    #[error("Command timed out after {0}s")]
    Timeout(u64),
    /// The shell could not be started.
    #[error("Failed to spawn shell: {0}")]
    Spawn(#[source] std::io::Error),
    /// Reading output or waiting on the child failed.
    #[error("Failed to execute command: {0}")]
    Execution(String),
}

/// Execute `command` with `cwd` and exactly the variables in `env`.
pub async fn run_shell_command(
    command: &str,
    cwd: &Path,
    env: &HashMap<String, String>,
    limits: &ExecutionLimits,
) -> Result<SandboxRunResult, SandboxError> {
    run_shell_command_capturing(command, cwd, env, limits, &[]).await
}

/// Execute `command` once and, if it exits 0, report the final values of
/// `variables` in the shell that ran it.
///
/// The values are written by a trailer appended to the script, so the
/// command itself is never repeated. Variable names must be shell
/// identifiers.
pub async fn run_shell_command_capturing(
    command: &str,
    cwd: &Path,
    env: &HashMap<String, String>,
    limits: &ExecutionLimits,
    variables: &[&str],
) -> Result<SandboxRunResult, SandboxError> {
    if let Some(bad) = variables.iter().find(|name| !is_identifier(name)) {
        return Err(SandboxError::Execution(format!("invalid variable name '{bad}'")));
    }

    let state_file = if variables.is_empty() {
        None
    } else {
        let file = tempfile::NamedTempFile::new()
            .map_err(|e| SandboxError::Execution(format!("cannot create state file: {e}")))?;
        Some(file)
    };
    let script = match &state_file {
        Some(file) => capture_script(command, variables, file.path())?,
        None => command.to_string(),
    };

    let mut cmd = Command::new(SHELL);
    cmd.arg("-c")
        .arg(&script)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(command, cwd = %cwd.display(), "spawning command");
    let mut result = run_with_timeout(cmd, limits).await?;

    if let (Some(file), true) = (&state_file, result.success) {
        let raw = tokio::fs::read(file.path())
            .await
            .map_err(|e| SandboxError::Execution(e.to_string()))?;
        result.variables = parse_captured(&raw, variables);
    }
    Ok(result)
}

/// The command, then a trailer that records `variables` NUL-separated into
/// `state_file` on success and exits with the command's status.
fn capture_script(
    command: &str,
    variables: &[&str],
    state_file: &Path,
) -> Result<String, SandboxError> {
    let target = shlex::try_quote(&state_file.to_string_lossy())
        .map_err(|e| SandboxError::Execution(e.to_string()))?
        .into_owned();
    // `=` marks a set variable so unset and empty can be told apart.
    let reads: Vec<String> = variables
        .iter()
        .map(|name| format!("\"${{{name}+=}}${{{name}}}\""))
        .collect();

    Ok(format!(
        "{command}\n__relay_status=$?\n\
         if [ \"$__relay_status\" -eq 0 ]; then printf '%s\\0' {} > {target}; fi\n\
         exit \"$__relay_status\"",
        reads.join(" ")
    ))
}

fn parse_captured(raw: &[u8], variables: &[&str]) -> HashMap<String, String> {
    if raw.is_empty() {
        return HashMap::new();
    }
    raw.split(|byte| *byte == 0)
        .zip(variables)
        .filter_map(|(value, name)| {
            let value = value.strip_prefix(b"=")?;
            Some((name.to_string(), String::from_utf8_lossy(value).into_owned()))
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn run_with_timeout(
    mut command: Command,
    limits: &ExecutionLimits,
) -> Result<SandboxRunResult, SandboxError> {
    let mut child = command.spawn().map_err(SandboxError::Spawn)?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let cap = limits.max_output_bytes;

    let collect = async {
        let (out, err) = tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
        let status = child
            .wait()
            .await
            .map_err(|e| SandboxError::Execution(e.to_string()))?;
        Ok::<_, SandboxError>((out?, err?, status))
    };

    let ((stdout, out_truncated), (stderr, err_truncated), status) =
        match tokio::time::timeout(limits.timeout, collect).await {
            Ok(collected) => collected?,
            Err(_) => {
                kill_process_group(pid);
                return Err(SandboxError::Timeout(limits.timeout.as_secs()));
            }
        };

    Ok(SandboxRunResult {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
        success: status.success(),
        truncated: out_truncated || err_truncated,
        variables: HashMap::new(),
    })
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // The leader has not been reaped yet, so the group id cannot be reused.
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Read a stream to EOF, keeping at most `cap` bytes.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> Result<(Vec<u8>, bool), SandboxError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| SandboxError::Execution(e.to_string()))?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok((kept, truncated))
}
