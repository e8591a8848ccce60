//! Test doubles for agents, version control, skill execution and confirmation.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use crate::cancel::CancelToken;
use crate::core::output::{OutputStatus, SkillOutput};
use crate::core::registry::SkillSpec;
use crate::io::agent::{Agent, SessionEnd};
use crate::io::git::VersionControl;
use crate::io::skill::{SkillExecutor, SkillInputs};
use crate::io::terminal::Confirm;

/// Valid passing output JSON for `skill`.
pub fn pass_output_json(skill: &str) -> String {
    serde_json::to_string(&output(skill, OutputStatus::Pass, 0)).unwrap_or_default()
}

/// Skill output with `blocking` findings.
pub fn output(skill: &str, status: OutputStatus, blocking: usize) -> SkillOutput {
    SkillOutput {
        skill: skill.to_string(),
        version: "v1".to_string(),
        status,
        blocking: (0..blocking).map(|i| format!("blocking finding {i}")).collect(),
        major: Vec::new(),
        warning: Vec::new(),
        info: Vec::new(),
    }
}

/// Agent answering non-interactive calls from a queue and recording every prompt.
#[derive(Default)]
pub struct ScriptedAgent {
    responses: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<(String, String)>>,
    sessions: RefCell<Vec<String>>,
    session_end: Option<SessionEnd>,
}

impl ScriptedAgent {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            session_end: Some(SessionEnd::Completed),
            ..Self::default()
        }
    }

    /// Interactive sessions end with `end`.
    pub fn with_session_end(mut self, end: SessionEnd) -> Self {
        self.session_end = Some(end);
        self
    }

    /// Interactive sessions fail to start.
    pub fn failing_sessions(mut self) -> Self {
        self.session_end = None;
        self
    }

    /// `(system, user)` prompts of every non-interactive call.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.borrow().clone()
    }

    /// System prompts of every interactive session.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn interactive(
        &self,
        system_prompt: &str,
        _extra_args: &[String],
        cancel: &CancelToken,
    ) -> Result<SessionEnd> {
        cancel.check()?;
        self.sessions.borrow_mut().push(system_prompt.to_string());
        self.session_end
            .ok_or_else(|| anyhow!("spawn scripted session: not found"))
    }

    fn non_interactive(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        cancel.check()?;
        self.prompts
            .borrow_mut()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent has no response left"))
    }
}

/// Version control with fixed answers.
#[derive(Debug, Clone)]
pub struct ScriptedVcs {
    /// `None` simulates a detached HEAD.
    pub branch: Option<String>,
    pub names: Vec<String>,
    pub name_status: Vec<String>,
    pub diff: String,
    pub untracked: Vec<String>,
    pub tracked: Vec<String>,
    /// Refs that exist.
    pub refs: Vec<String>,
    /// Merge base returned for any existing ref.
    pub merge_base: Option<String>,
    pub linked_worktree: bool,
    pub toplevel: PathBuf,
}

impl Default for ScriptedVcs {
    fn default() -> Self {
        Self {
            branch: Some("feature".to_string()),
            names: Vec::new(),
            name_status: Vec::new(),
            diff: String::new(),
            untracked: Vec::new(),
            tracked: Vec::new(),
            refs: vec!["main".to_string()],
            merge_base: Some("0123456789abcdef0123".to_string()),
            linked_worktree: true,
            toplevel: PathBuf::from("/repo"),
        }
    }
}

impl ScriptedVcs {
    /// A feature branch with one modified file under `path`.
    pub fn with_change(path: &str) -> Self {
        Self {
            names: vec![path.to_string()],
            name_status: vec![format!("M\t{path}")],
            diff: format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n+changed\n"),
            tracked: vec![path.to_string()],
            ..Self::default()
        }
    }
}

impl VersionControl for ScriptedVcs {
    fn current_branch(&self) -> Result<String> {
        self.branch
            .clone()
            .ok_or_else(|| anyhow!("detached HEAD (refuse to run)"))
    }

    fn diff_name_only(&self, _base: &str) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn diff_name_status(&self, _base: &str) -> Result<Vec<String>> {
        Ok(self.name_status.clone())
    }

    fn diff(&self, _base: &str) -> Result<String> {
        Ok(self.diff.clone())
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        Ok(self.untracked.clone())
    }

    fn tracked_files(&self) -> Result<Vec<String>> {
        Ok(self.tracked.clone())
    }

    fn merge_base(&self, a: &str, _b: &str) -> Result<String> {
        if !self.ref_exists(a) {
            return Err(anyhow!("unknown ref {a}"));
        }
        self.merge_base
            .clone()
            .ok_or_else(|| anyhow!("no merge base for {a}"))
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.refs.iter().any(|known| known == reference)
    }

    fn is_linked_worktree(&self) -> Result<bool> {
        Ok(self.linked_worktree)
    }

    fn show_toplevel(&self) -> Result<PathBuf> {
        Ok(self.toplevel.clone())
    }
}

/// Scripted result of one skill execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Pass,
    /// `fail` with this many blocking findings.
    Fail(usize),
    Error(String),
}

/// Skill executor returning queued outcomes per skill name (default: pass).
#[derive(Default)]
pub struct ScriptedSkillExecutor {
    outcomes: RefCell<HashMap<String, VecDeque<ScriptedOutcome>>>,
    calls: RefCell<Vec<String>>,
    inputs: RefCell<Vec<SkillInputs>>,
}

impl ScriptedSkillExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `skill`, consumed one per execution.
    pub fn script(self, skill: &str, outcomes: Vec<ScriptedOutcome>) -> Self {
        self.outcomes
            .borrow_mut()
            .entry(skill.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Names of executed skills, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Inputs of every execution, in call order.
    pub fn inputs(&self) -> Vec<SkillInputs> {
        self.inputs.borrow().clone()
    }
}

impl SkillExecutor for ScriptedSkillExecutor {
    fn run(&self, skill: &SkillSpec, inputs: &SkillInputs, cancel: &CancelToken) -> Result<SkillOutput> {
        cancel.check()?;
        self.calls.borrow_mut().push(skill.name.clone());
        self.inputs.borrow_mut().push(inputs.clone());
        if skill.unregistered {
            return Err(anyhow!(
                "skill '{}' is listed in a bundle but not registered",
                skill.name
            ));
        }
        let outcome = self
            .outcomes
            .borrow_mut()
            .get_mut(&skill.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedOutcome::Pass);
        match outcome {
            ScriptedOutcome::Pass => Ok(output(&skill.name, OutputStatus::Pass, 0)),
            ScriptedOutcome::Fail(blocking) => Ok(output(&skill.name, OutputStatus::Fail, blocking)),
            ScriptedOutcome::Error(message) => Err(anyhow!(message)),
        }
    }
}

/// Confirmation answering from a queue and recording every question.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str, default_yes: bool) -> bool {
        self.questions.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(default_yes)
    }
}

/// Registry document covering every governance mode.
pub const REGISTRY_YAML: &str = r#"
version: 1
defaults:
  skill_version: v1
  requires_diff: true
registry:
  - name: conventions
    cost: cheap
    mode: deterministic
    mandatory: true
    requires_diff: false
    run_when: { modes: [PATCH, NORMAL, STRUCTURAL, API, HEAVY, AUDIT] }
  - name: layering
    cost: moderate
    mode: heuristic
    mandatory: true
    run_when: { modes: [NORMAL, STRUCTURAL, HEAVY, AUDIT] }
  - name: api-review
    cost: moderate
    mode: semantic
    mandatory: false
    run_when: { modes: [API, HEAVY, AUDIT] }
  - name: deep-review
    cost: heavy
    mode: semantic
    mandatory: false
    run_when: { modes: [HEAVY, AUDIT] }
bundles:
  default: [conventions, layering]
  patch: [conventions]
"#;
