//! Agent abstraction for interactive sessions and one-shot judgments.
//!
//! The [`Agent`] trait decouples the gate loop and skill execution from the
//! actual backend (`claude` or `codex`). Tests use scripted agents that return
//! predetermined answers without spawning processes.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::io::process::{InteractiveExit, run_captured, run_interactive};

/// How an interactive session ended. Always discarded by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    /// Non-zero exit code.
    Exited(i32),
    /// The user pressed Ctrl-C, or a signal ended the child.
    Interrupted,
}

/// Abstraction over agent backends.
pub trait Agent {
    fn name(&self) -> &str;

    /// Run a session attached to the terminal.
    ///
    /// `Err` only when the session could not be started at all.
    fn interactive(
        &self,
        system_prompt: &str,
        extra_args: &[String],
        cancel: &CancelToken,
    ) -> Result<SessionEnd>;

    /// Run one prompt to completion and return the agent's text answer.
    fn non_interactive(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// `claude` CLI backend.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    bin: String,
    workdir: PathBuf,
}

impl ClaudeAgent {
    pub fn new(bin: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            workdir: workdir.into(),
        }
    }
}

impl Agent for ClaudeAgent {
    fn name(&self) -> &str {
        "claude"
    }

    #[instrument(skip_all, fields(agent = "claude"))]
    fn interactive(
        &self,
        system_prompt: &str,
        extra_args: &[String],
        cancel: &CancelToken,
    ) -> Result<SessionEnd> {
        info!(workdir = %self.workdir.display(), "starting interactive claude session");
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--system-prompt")
            .arg(system_prompt)
            .args(extra_args)
            .current_dir(&self.workdir);
        let exit = run_interactive(cmd, cancel).context("run claude session")?;
        Ok(session_end(exit))
    }

    #[instrument(skip_all, fields(agent = "claude"))]
    fn non_interactive(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-p")
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg("--tools")
            .arg("")
            .arg("--disable-slash-commands")
            .arg("--no-session-persistence")
            .arg("--output-format")
            .arg("text")
            // A nested claude refuses to start when it sees this set.
            .env("CLAUDECODE", "")
            .current_dir(&self.workdir);
        one_shot(cmd, user_prompt, "claude", cancel)
    }
}

/// `codex` CLI backend.
#[derive(Debug, Clone)]
pub struct CodexAgent {
    bin: String,
    workdir: PathBuf,
}

impl CodexAgent {
    pub fn new(bin: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            workdir: workdir.into(),
        }
    }
}

impl Agent for CodexAgent {
    fn name(&self) -> &str {
        "codex"
    }

    #[instrument(skip_all, fields(agent = "codex"))]
    fn interactive(
        &self,
        system_prompt: &str,
        extra_args: &[String],
        cancel: &CancelToken,
    ) -> Result<SessionEnd> {
        info!(workdir = %self.workdir.display(), "starting interactive codex session");
        let mut cmd = Command::new(&self.bin);
        cmd.args(extra_args)
            .arg(system_prompt)
            .current_dir(&self.workdir);
        let exit = run_interactive(cmd, cancel).context("run codex session")?;
        Ok(session_end(exit))
    }

    #[instrument(skip_all, fields(agent = "codex"))]
    fn non_interactive(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("exec")
            .arg("--skip-git-repo-check")
            .arg("-")
            .current_dir(&self.workdir);
        let prompt = format!("{system_prompt}\n\n{user_prompt}");
        one_shot(cmd, &prompt, "codex exec", cancel)
    }
}

fn one_shot(cmd: Command, stdin: &str, label: &str, cancel: &CancelToken) -> Result<String> {
    let output = run_captured(cmd, Some(stdin.as_bytes()), cancel)
        .with_context(|| format!("run {label}"))?;
    if !output.status.success() {
        warn!(exit_code = ?output.status.code(), label, "agent command failed");
        return Err(anyhow!(
            "{label} failed with status {:?}: {}",
            output.status.code(),
            output.stderr_lossy().trim()
        ));
    }
    debug!(bytes = output.stdout.len(), label, "agent command completed");
    Ok(output.stdout_lossy())
}

fn session_end(exit: InteractiveExit) -> SessionEnd {
    if exit.interrupted {
        return SessionEnd::Interrupted;
    }
    match exit.status.code() {
        Some(0) => SessionEnd::Completed,
        Some(code) => SessionEnd::Exited(code),
        None => SessionEnd::Interrupted,
    }
}
