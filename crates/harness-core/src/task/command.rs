//! External commands as task bodies
//!
//! A command worker owns its child process: killing or replacing the task
//! drops the child handle, which kills the process.

use super::args::{TaskArgs, TaskSignature};
use super::runner::{TaskId, TaskRunner};
use crate::error::TaskError;
use anyhow::{Context, Result};
use harness_common::timestamp_millis;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time to wait for output readers after the process exits
const STREAM_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// One line of process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub timestamp_ms: i64,
    pub line: String,
}

/// Captured result of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<OutputLine>,
    pub stderr: Vec<OutputLine>,
}

/// Run a command to completion, logging its output.
///
/// # Returns
/// * `Ok(output)` if the command exited with status 0
/// * `Err` on spawn failure, non-zero exit (with the last stderr line) or timeout
pub async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    info!(
        cmd = %program,
        args = ?args,
        timeout_ms = duration_millis(timeout),
        "Running command"
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", program))?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;
    let stdout_handle = stream_lines(program.to_string(), "stdout", stdout);
    let stderr_handle = stream_lines(program.to_string(), "stderr", stderr);

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.context("Failed waiting for command")?,
        Err(_) => {
            warn!(
                cmd = %program,
                timeout_ms = duration_millis(timeout),
                "Command timed out, killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out process");
            }
            anyhow::bail!("Command '{}' timed out after {:?}", program, timeout);
        }
    };

    let output = CommandOutput {
        stdout: collect(stdout_handle).await,
        stderr: collect(stderr_handle).await,
    };

    if !status.success() {
        let last = output
            .stderr
            .last()
            .map(|l| l.line.as_str())
            .unwrap_or("no stderr output");
        anyhow::bail!("Command '{}' failed with {}: {}", program, status, last);
    }

    debug!(cmd = %program, lines = output.stdout.len(), "Command succeeded");
    Ok(output)
}

fn stream_lines<R>(program: String, stream: &'static str, reader: R) -> JoinHandle<Vec<OutputLine>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut captured = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(cmd = %program, stream, line = %line, "Command output");
            captured.push(OutputLine {
                timestamp_ms: timestamp_millis(),
                line,
            });
        }
        captured
    })
}

async fn collect(handle: JoinHandle<Vec<OutputLine>>) -> Vec<OutputLine> {
    match tokio::time::timeout(STREAM_FLUSH_TIMEOUT, handle).await {
        Ok(Ok(lines)) => lines,
        _ => Vec::new(),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Signature of command tasks: `program`, `args = []`, `timeout_ms`
pub fn command_signature() -> TaskSignature {
    TaskSignature::new()
        .required("program")
        .optional("args", Vec::<String>::new())
        .optional(
            "timeout_ms",
            harness_common::defaults::DEFAULT_WAIT_TIMEOUT_SECS.saturating_mul(1000),
        )
}

impl TaskRunner {
    /// Launch an external command as a task.
    ///
    /// The task fails if the command cannot start, exits non-zero or runs
    /// past `timeout`.
    pub fn launch_command(
        &mut self,
        id: Option<&str>,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<TaskId, TaskError> {
        let args = TaskArgs::new()
            .arg(program)
            .arg(args.to_vec())
            .arg(duration_millis(timeout));
        self.launch(id, &command_signature(), args, |args| async move {
            let program: String = args.get("program")?;
            let argv: Vec<String> = args.get("args")?;
            let timeout_ms: u64 = args.get("timeout_ms")?;
            run_command(&program, &argv, Duration::from_millis(timeout_ms)).await?;
            Ok(())
        })
    }
}
