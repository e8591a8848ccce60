//! `bonsai check`: run a bundle or a mode's skills once and write `ai-check.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::core::registry::{Registry, RegistryError, SkillSpec};
use crate::core::report::Report;
use crate::core::types::{GovernanceMode, UnknownModeError};
use crate::io::artifacts::OutputPaths;
use crate::io::git::VersionControl;
use crate::io::repo::{build_diff_payload, filter_scope, repo_tree, vcs_tree};
use crate::io::skill::{SkillExecutor, SkillInputs};
use crate::orchestrator::{Orchestrator, RunOptions};

pub const DEFAULT_BUNDLE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("--mode and --bundle are mutually exclusive")]
    Conflict,
    #[error(transparent)]
    UnknownMode(#[from] UnknownModeError),
}

/// Which skills a check runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillSelection {
    /// Author-ordered bundle.
    Bundle(String),
    /// Every skill wired to the mode, cheapest first.
    Mode(GovernanceMode),
}

impl SkillSelection {
    /// Combine `--bundle` and `--mode`. Neither means the default bundle.
    pub fn from_flags(bundle: Option<&str>, mode: Option<&str>) -> Result<Self, SelectionError> {
        match (bundle, mode) {
            (Some(_), Some(_)) => Err(SelectionError::Conflict),
            (_, Some(mode)) => Ok(SkillSelection::Mode(mode.parse()?)),
            (Some(bundle), None) => Ok(SkillSelection::Bundle(bundle.to_string())),
            (None, None) => Ok(SkillSelection::Bundle(DEFAULT_BUNDLE.to_string())),
        }
    }

    /// Report label, `bundle:<name>` or `mode:<MODE>`.
    pub fn source(&self) -> String {
        match self {
            SkillSelection::Bundle(name) => format!("bundle:{name}"),
            SkillSelection::Mode(mode) => format!("mode:{mode}"),
        }
    }

    pub fn resolve(&self, registry: &Registry) -> Result<Vec<SkillSpec>, RegistryError> {
        match self {
            SkillSelection::Bundle(name) => registry.skills_for_bundle(name),
            SkillSelection::Mode(mode) => registry.skills_for_mode(*mode),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub selection: SkillSelection,
    pub base: Option<String>,
    pub scope: Vec<String>,
    pub fail_fast: bool,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub report: Report,
    pub report_path: PathBuf,
}

/// Resolve skills, run them and persist the report.
///
/// `vcs` is `None` outside a git work tree: the tree then comes from a
/// directory walk and there is no diff payload.
#[instrument(skip_all, fields(source = %request.selection.source()))]
#[allow(clippy::too_many_arguments)]
pub fn run_check(
    request: &CheckRequest,
    registry: &Registry,
    executor: &dyn SkillExecutor,
    vcs: Option<&dyn VersionControl>,
    repo_root: &Path,
    outputs: &OutputPaths,
    cancel: &CancelToken,
    observer: &mut dyn FnMut(&str),
) -> Result<CheckOutcome> {
    let skills = request.selection.resolve(registry)?;

    let files = match vcs {
        Some(vcs) => filter_scope(vcs_tree(vcs)?, &request.scope),
        None => repo_tree(repo_root, &request.scope)?,
    };
    let diff_payload = match (vcs, request.base.as_deref()) {
        (Some(vcs), Some(base)) => build_diff_payload(vcs, repo_root, base),
        _ => String::new(),
    };
    let options = RunOptions {
        source: request.selection.source(),
        inputs: SkillInputs {
            repo_tree: files.join("\n"),
            diff_payload,
            base_ref: request.base.clone(),
        },
        fail_fast: request.fail_fast,
        default_requires_diff: registry.defaults.requires_diff,
    };

    let report = Orchestrator::new(executor).run(&skills, &options, cancel, observer)?;
    let report_path = outputs
        .write_check_report(&report)
        .context("write check report")?;
    Ok(CheckOutcome {
        report,
        report_path,
    })
}

/// Print the closing summary of a check run.
pub fn print_summary(outcome: &CheckOutcome, base: Option<&str>) {
    let report = &outcome.report;
    println!();
    println!("═══ bonsai check summary ═══");
    println!("Source: {}", report.source);
    println!(
        "Results: {}/{} passed ({} failed, {} skipped, {} blocking)",
        report.passed, report.total, report.failed, report.skipped, report.blocking_failed
    );
    println!("Output: {}", outcome.report_path.display());

    if !report.should_fail() {
        return;
    }
    if report.total > 0 && report.skipped == report.total {
        eprintln!(
            "\n✖ All {} skill(s) were skipped; no validation occurred",
            report.total
        );
        if base.is_none() {
            eprintln!("  hint: pass --base <ref> to provide diff context for requires_diff skills");
        }
    } else {
        eprintln!(
            "\n✖ {} skill(s) had blocking findings",
            report.blocking_failed
        );
    }
}
