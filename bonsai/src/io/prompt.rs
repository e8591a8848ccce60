//! Prompt rendering for skills, implementation sessions and patch surgery.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use minijinja::{Environment, context};

const VALIDATOR_TEMPLATE: &str = include_str!("prompts/validator.md");
const SKILL_INPUT_TEMPLATE: &str = include_str!("prompts/skill_input.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const PATCH_ARCHITECT_TEMPLATE: &str = include_str!("prompts/patch_architect.md");
const PATCHER_TEMPLATE: &str = include_str!("prompts/patcher.md");

/// Renders every prompt bonsai sends to an agent.
///
/// Repository documents (`CLAUDE.md`, `AGENTS.md`) are read from the repo root
/// when present and folded into system prompts.
pub struct PromptBuilder {
    env: Environment<'static>,
    repo_root: PathBuf,
}

impl PromptBuilder {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("validator", VALIDATOR_TEMPLATE)
            .expect("validator template should be valid");
        env.add_template("skill_input", SKILL_INPUT_TEMPLATE)
            .expect("skill_input template should be valid");
        env.add_template("implementer", IMPLEMENTER_TEMPLATE)
            .expect("implementer template should be valid");
        env.add_template("patch_architect", PATCH_ARCHITECT_TEMPLATE)
            .expect("patch_architect template should be valid");
        env.add_template("patcher", PATCHER_TEMPLATE)
            .expect("patcher template should be valid");
        Self {
            env,
            repo_root: repo_root.into(),
        }
    }

    /// System prompt for a non-interactive skill run.
    pub fn validator(&self, skill_body: &str, output_schema: &str) -> Result<String> {
        let template = self.env.get_template("validator")?;
        Ok(template.render(context! {
            constitution => self.repo_document("CLAUDE.md"),
            constraints => self.repo_document("AGENTS.md"),
            skill_body => skill_body.trim(),
            output_schema => output_schema.trim(),
        })?)
    }

    /// User prompt carrying the repository tree and optional diff.
    pub fn skill_input(&self, repo_tree: &str, diff: Option<&str>, base: Option<&str>) -> Result<String> {
        let template = self.env.get_template("skill_input")?;
        Ok(template.render(context! {
            repo_tree => repo_tree,
            diff => diff.filter(|diff| !diff.trim().is_empty()),
            base => base.unwrap_or_default(),
        })?)
    }

    /// System prompt for an interactive implementation session.
    pub fn implementer(&self, findings: Option<&str>) -> Result<String> {
        let template = self.env.get_template("implementer")?;
        Ok(template.render(context! {
            repo_root => self.repo_root.display().to_string(),
            constraints => self.repo_document("AGENTS.md"),
            findings => findings.map(str::trim).filter(|findings| !findings.is_empty()),
        })?)
    }

    pub fn patch_architect(&self) -> Result<String> {
        let template = self.env.get_template("patch_architect")?;
        Ok(template.render(context! {
            repo_root => self.repo_root.display().to_string(),
            constraints => self.repo_document("AGENTS.md"),
        })?)
    }

    /// Combined prompt handed to the patch emitter.
    pub fn patcher(&self, plan: &str, task: &str) -> Result<String> {
        let template = self.env.get_template("patcher")?;
        Ok(template.render(context! {
            repo_root => self.repo_root.display().to_string(),
            plan => plan.trim(),
            task => task.trim(),
        })?)
    }

    fn repo_document(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.repo_root.join(name))
            .ok()
            .map(|contents| contents.trim().to_string())
            .filter(|contents| !contents.is_empty())
    }
}

/// User prompt asking the architect to plan `task`.
pub fn patch_plan_request(task: &str) -> String {
    format!(
        "Plan a patch for the following task. Output the files to modify, exact regions, and assertions for correctness:\n\n{task}"
    )
}
