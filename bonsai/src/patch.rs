//! `bonsai patch`: architect plan, confirmed patch emission, then validation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::cancel::{CancelToken, is_cancelled};
use crate::core::registry::{Registry, SkillSpec};
use crate::core::report::Report;
use crate::io::agent::Agent;
use crate::io::artifacts::{OutputPaths, PatchPlan};
use crate::io::config::BonsaiConfig;
use crate::io::git::{VersionControl, detect_merge_base};
use crate::io::prompt::{PromptBuilder, patch_plan_request};
use crate::io::repo::{build_diff_payload, repo_tree, vcs_tree};
use crate::io::skill::{SkillExecutor, SkillInputs};
use crate::io::terminal::Confirm;
use crate::orchestrator::{Orchestrator, RunOptions};

pub const PATCH_BUNDLE: &str = "patch";
const FALLBACK_BUNDLE: &str = "default";

#[derive(Debug, Clone)]
pub enum PatchOutcome {
    /// The plan was written but emission was declined.
    Aborted { plan_path: PathBuf },
    Validated { plan_path: PathBuf, report: Report },
}

impl PatchOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            PatchOutcome::Aborted { .. } => true,
            PatchOutcome::Validated { report, .. } => !report.should_fail(),
        }
    }
}

/// Collaborators of the three patch phases.
pub struct PatchWorkflow<'a> {
    /// `None` outside a git work tree.
    pub vcs: Option<&'a dyn VersionControl>,
    pub architect: &'a dyn Agent,
    pub patcher: &'a dyn Agent,
    pub executor: &'a dyn SkillExecutor,
    pub registry: &'a Registry,
    pub prompts: &'a PromptBuilder,
    pub confirm: &'a dyn Confirm,
    pub config: &'a BonsaiConfig,
    pub outputs: &'a OutputPaths,
    pub repo_root: &'a Path,
}

impl PatchWorkflow<'_> {
    #[instrument(skip_all)]
    pub fn run(&self, task: &str, cancel: &CancelToken) -> Result<PatchOutcome> {
        if task.trim().is_empty() {
            bail!("usage: bonsai patch \"<task description>\"");
        }

        println!("═══ Phase 1: Patch Architecture ═══");
        println!("Task: {task}\n");
        let system = self
            .prompts
            .patch_architect()
            .context("build architect prompt")?;
        let plan = self
            .architect
            .non_interactive(&system, &patch_plan_request(task), cancel)
            .context("patch architecture phase failed")?;
        let plan_path = self
            .outputs
            .write_patch_plan(&PatchPlan::new(task, &plan))?;
        info!(path = %plan_path.display(), "patch plan written");

        println!("{plan}\n");
        println!("─── Review the plan above ───");
        println!("(Plan saved to {})", plan_path.display());
        if !self.confirm.confirm("Proceed to patch emission?", false) {
            println!("Aborted.");
            return Ok(PatchOutcome::Aborted { plan_path });
        }

        println!("\n═══ Phase 2: Patch Emission ═══");
        let prompt = self
            .prompts
            .patcher(&plan, task)
            .context("build patcher prompt")?;
        match self.patcher.interactive(&prompt, &[], cancel) {
            Ok(end) => debug!(?end, "patch emission ended"),
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => eprintln!("warning: patch emission failed: {err:#}"),
        }
        cancel.check()?;

        println!("\n═══ Phase 3: Validation ═══");
        let report = self.validate(cancel)?;
        if report.should_fail() {
            eprintln!("\n✖ Patch validation failed. Review violations above.");
        } else {
            println!("\n✔ Patch surgery complete.");
        }
        Ok(PatchOutcome::Validated { plan_path, report })
    }

    fn validate(&self, cancel: &CancelToken) -> Result<Report> {
        let skills = self.patch_skills()?;
        let base = self
            .vcs
            .and_then(|vcs| detect_merge_base(vcs, &self.config.routing.merge_base_candidates));

        let (files, diff_payload) = match (self.vcs, base.as_deref()) {
            (Some(vcs), Some(base)) => (vcs_tree(vcs)?, build_diff_payload(vcs, self.repo_root, base)),
            (Some(vcs), None) => (vcs_tree(vcs)?, String::new()),
            (None, _) => (repo_tree(self.repo_root, &[])?, String::new()),
        };
        let options = RunOptions {
            source: format!("bundle:{PATCH_BUNDLE}"),
            inputs: SkillInputs {
                repo_tree: files.join("\n"),
                diff_payload,
                base_ref: base,
            },
            fail_fast: true,
            default_requires_diff: self.registry.defaults.requires_diff,
        };
        Orchestrator::new(self.executor)
            .run(&skills, &options, cancel, &mut |line: &str| println!("{line}"))
            .context("patch validation")
    }

    fn patch_skills(&self) -> Result<Vec<SkillSpec>> {
        match self.registry.skills_for_bundle(PATCH_BUNDLE) {
            Ok(skills) => Ok(skills),
            Err(err) => {
                debug!(err = %err, "falling back to default bundle");
                self.registry
                    .skills_for_bundle(FALLBACK_BUNDLE)
                    .context("no patch or default bundle")
            }
        }
    }
}
