//! Helpers for running agent child processes under a cancellation token.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::{CancelToken, Cancelled};

/// How often a waiting child is checked against the cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Run a command to completion, feeding `stdin` and capturing stdout/stderr.
///
/// Output is read on background threads so a chatty child cannot fill a pipe
/// and deadlock. The child is killed if `cancel` fires.
#[instrument(skip_all)]
pub fn run_captured(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    cancel.check()?;
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = spawn(&mut cmd)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(e) = child_stdin.write_all(input) {
            warn!(err = %e, "writing stdin failed, killing child");
            drop(child_stdin);
            let _ = child.kill();
            let _ = child.wait();
            let _ = join_output(stdout_handle);
            let _ = join_output(stderr_handle);
            return Err(e).context("write stdin");
        }
    }

    let status = wait_cancellable(&mut child, cancel)?;
    // A Ctrl-C reaches the child too; report the interrupt rather than its exit.
    cancel.check()?;

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

/// How an interactive child finished.
#[derive(Debug, Clone, Copy)]
pub struct InteractiveExit {
    pub status: ExitStatus,
    /// The user pressed Ctrl-C while the child owned the terminal.
    pub interrupted: bool,
}

/// Run a command attached to the user's terminal.
///
/// The child owns Ctrl-C while it runs: interrupts are recorded in the result
/// and never cancel `cancel`.
#[instrument(skip_all)]
pub fn run_interactive(mut cmd: Command, cancel: &CancelToken) -> Result<InteractiveExit> {
    cancel.check()?;
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    debug!("spawning interactive child process");
    let guard = cancel.foreground();
    let mut child = spawn(&mut cmd)?;
    let status = wait_cancellable(&mut child, cancel)?;
    drop(guard);
    let interrupted = cancel.take_interrupt();
    debug!(exit_code = ?status.code(), interrupted, "interactive command finished");
    Ok(InteractiveExit {
        status,
        interrupted,
    })
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            Err(e).with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()))
        }
    }
}

fn wait_cancellable(child: &mut Child, cancel: &CancelToken) -> Result<ExitStatus> {
    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).context("wait for command")? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing child");
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?;
            return Err(Cancelled.into());
        }
    }
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}
