//! Iterative implement-and-gate workflow.
//!
//! `preflight` runs once, then each iteration is
//! session → diff → profile → mode → gate → pass / fail / re-enter,
//! bounded by `gate.max_iterations`.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{CancelToken, is_cancelled};
use crate::core::classifier::determine_mode;
use crate::core::registry::Registry;
use crate::core::report::Report;
use crate::io::agent::Agent;
use crate::io::artifacts::{OutputPaths, PlanInfo};
use crate::io::config::BonsaiConfig;
use crate::io::git::{VersionControl, detect_merge_base};
use crate::io::prompt::PromptBuilder;
use crate::io::repo::{build_diff_payload, compute_profile, has_changes, vcs_tree};
use crate::io::skill::{SkillExecutor, SkillInputs};
use crate::io::terminal::Confirm;
use crate::orchestrator::{Orchestrator, RunOptions};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightError {
    #[error("refusing to implement on {branch}: create a feature branch or use `git worktree add`")]
    ProtectedBranch { branch: String },
}

/// Mutable state of one gate run. Only changes between iterations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateSession {
    pub iteration: u32,
    pub merge_base: Option<String>,
    pub plan: Option<PlanInfo>,
    /// Findings carried into the next session prompt.
    pub findings: String,
}

impl GateSession {
    pub fn plan_intent(&self) -> Option<&str> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.intent.as_deref())
            .filter(|intent| !intent.is_empty())
    }
}

/// Why the gate loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStop {
    Passed { iteration: u32 },
    /// No merge base was detected, so nothing could be gated.
    NoMergeBase,
    NoChanges,
    Exhausted { iterations: u32 },
    Declined { iteration: u32 },
}

impl GateStop {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            GateStop::Passed { .. } | GateStop::NoMergeBase | GateStop::NoChanges
        )
    }
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub stop: GateStop,
    /// Report of the last gate run, if one happened.
    pub report: Option<Report>,
}

/// Reject protected branches, detect the merge base and consume a pending plan.
#[instrument(skip_all)]
pub fn preflight(
    vcs: &dyn VersionControl,
    config: &BonsaiConfig,
    outputs: &OutputPaths,
) -> Result<GateSession> {
    let branch = vcs.current_branch().context("detect branch")?;
    if config.routing.protected_branches.contains(&branch) {
        return Err(PreflightError::ProtectedBranch { branch }.into());
    }

    match vcs.is_linked_worktree() {
        Ok(true) => {}
        Ok(false) => eprintln!("warning: running in main worktree (not a git worktree)"),
        Err(err) => warn!(err = %err, "could not determine worktree status"),
    }

    let merge_base = detect_merge_base(vcs, &config.routing.merge_base_candidates);
    match &merge_base {
        Some(base) => println!("Merge base: {}", short_sha(base)),
        None => eprintln!("warning: could not detect merge base; gating may be limited"),
    }

    let plan = match outputs.consume_plan() {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("warning: failed to parse plan.json: {err:#}");
            None
        }
    };
    if let Some(intent) = plan
        .as_ref()
        .and_then(|plan| plan.intent.as_deref())
        .filter(|i| !i.is_empty())
    {
        println!("Consuming plan.json (intent: {intent})");
    }

    Ok(GateSession {
        iteration: 0,
        merge_base,
        plan,
        findings: String::new(),
    })
}

/// Collaborators of the gate loop.
pub struct GateLoop<'a> {
    pub vcs: &'a dyn VersionControl,
    /// Agent driving the interactive implementation session.
    pub session_agent: &'a dyn Agent,
    pub executor: &'a dyn SkillExecutor,
    pub registry: &'a Registry,
    pub prompts: &'a PromptBuilder,
    pub confirm: &'a dyn Confirm,
    pub config: &'a BonsaiConfig,
    pub outputs: &'a OutputPaths,
    pub repo_root: &'a Path,
    /// Passed through to the session agent.
    pub extra_args: &'a [String],
}

impl GateLoop<'_> {
    #[instrument(skip_all)]
    pub fn run(&self, session: &mut GateSession, cancel: &CancelToken) -> Result<GateOutcome> {
        let max_iterations = self.config.gate.max_iterations.max(1);

        for iteration in 1..=max_iterations {
            cancel.check()?;
            session.iteration = iteration;
            info!(iteration, max_iterations, "gate iteration");
            println!("\n═══ Implementation session {iteration}/{max_iterations} ═══\n");

            self.run_session(session, cancel)?;
            cancel.check()?;

            let Some(base) = session.merge_base.clone() else {
                println!("\nNo merge base; skipping governance gate");
                return Ok(stopped(GateStop::NoMergeBase, None));
            };

            match has_changes(self.vcs, &base) {
                Ok(true) => {}
                Ok(false) => {
                    println!("\nNo changes detected; skipping governance gate");
                    return Ok(stopped(GateStop::NoChanges, None));
                }
                Err(err) => {
                    warn!(err = %err, "change detection failed");
                    println!("\nNo changes detected; skipping governance gate");
                    return Ok(stopped(GateStop::NoChanges, None));
                }
            }

            let report = self.run_gate(session, &base, cancel)?;

            if !report.should_fail() {
                println!(
                    "\n✔ Governance gate passed ({}/{} skills passed)",
                    report.passed, report.total
                );
                self.save_artifacts(&base, &report);
                return Ok(stopped(GateStop::Passed { iteration }, Some(report)));
            }

            if iteration == max_iterations {
                eprintln!("\n✖ Governance gate failed after {max_iterations} iterations");
                print_failed_findings(&report);
                return Ok(stopped(
                    GateStop::Exhausted {
                        iterations: max_iterations,
                    },
                    Some(report),
                ));
            }

            print_failed_findings(&report);
            println!(
                "\nGovernance gate failed: {} blocking finding(s)",
                report.blocking_failed
            );
            if !self
                .confirm
                .confirm("\nRe-enter session to fix findings?", true)
            {
                return Ok(stopped(GateStop::Declined { iteration }, Some(report)));
            }
            session.findings = report.extract_findings();
        }

        Ok(stopped(
            GateStop::Exhausted {
                iterations: max_iterations,
            },
            None,
        ))
    }

    fn run_session(&self, session: &GateSession, cancel: &CancelToken) -> Result<()> {
        let findings = Some(session.findings.as_str()).filter(|findings| !findings.is_empty());
        let prompt = self
            .prompts
            .implementer(findings)
            .context("build implementer prompt")?;
        match self
            .session_agent
            .interactive(&prompt, self.extra_args, cancel)
        {
            Ok(end) => {
                debug!(?end, "session ended");
                Ok(())
            }
            Err(err) if is_cancelled(&err) => Err(err),
            Err(err) => Err(err).context("start implementation session"),
        }
    }

    fn run_gate(&self, session: &GateSession, base: &str, cancel: &CancelToken) -> Result<Report> {
        let profile =
            compute_profile(self.vcs, base, &self.config.routing).context("compute diff profile")?;
        let mode = determine_mode(&profile, &self.config.diff, session.plan_intent());
        println!(
            "\nGovernance mode: {mode} (files:{} lines:{} dirs:{})",
            profile.files_changed,
            profile.diff_lines,
            profile.top_level_dirs.len()
        );

        let skills = self.registry.skills_for_mode(mode)?;
        let inputs = SkillInputs {
            repo_tree: vcs_tree(self.vcs)?.join("\n"),
            diff_payload: build_diff_payload(self.vcs, self.repo_root, base),
            base_ref: Some(base.to_string()),
        };
        let options = RunOptions {
            source: format!("mode:{mode}"),
            inputs,
            fail_fast: true,
            default_requires_diff: self.registry.defaults.requires_diff,
        };
        Orchestrator::new(self.executor)
            .run(&skills, &options, cancel, &mut |line: &str| println!("{line}"))
            .context("governance gate")
    }

    fn save_artifacts(&self, base: &str, report: &Report) {
        let patch = self.vcs.diff(base).unwrap_or_else(|err| {
            warn!(err = %err, "diff for last.patch failed");
            String::new()
        });
        match self.outputs.save_gate_artifacts(&patch, report) {
            Ok(paths) => {
                for path in paths {
                    println!("Saved: {}", path.display());
                }
            }
            Err(err) => eprintln!("warning: failed to save gate artifacts: {err:#}"),
        }
    }
}

fn stopped(stop: GateStop, report: Option<Report>) -> GateOutcome {
    GateOutcome { stop, report }
}

fn print_failed_findings(report: &Report) {
    for result in report.failed_results() {
        eprintln!("  {}", result.finding_line());
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
