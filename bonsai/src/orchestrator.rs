//! Sequential skill execution with skip and fail-fast rules.
//!
//! Skills run one at a time in the order given. A skill that needs diff
//! context is skipped when no base was supplied; skipping never counts as a
//! failure. With fail-fast, the first failing mandatory skill stops the run and
//! the remaining skills are neither run nor counted.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{CancelToken, is_cancelled};
use crate::core::registry::{SkillSpec, effective_requires_diff};
use crate::core::report::{Report, SkillResult};
use crate::core::types::RequiresDiff;
use crate::io::skill::{SkillExecutor, SkillInputs};

/// Reason recorded for skills skipped for lack of a diff base.
pub const SKIP_NO_BASE: &str = "requires diff without base";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report label such as `mode:NORMAL` or `bundle:default`.
    pub source: String,
    pub inputs: SkillInputs,
    pub fail_fast: bool,
    /// Registry-wide `requires_diff` default.
    pub default_requires_diff: RequiresDiff,
}

pub struct Orchestrator<'a> {
    executor: &'a dyn SkillExecutor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a dyn SkillExecutor) -> Self {
        Self { executor }
    }

    /// Run `skills` in order and aggregate a report.
    ///
    /// `observer` receives one progress line per skill. Only cancellation
    /// aborts the run with an error; skill failures are recorded.
    #[instrument(skip_all, fields(source = %options.source, skills = skills.len()))]
    pub fn run(
        &self,
        skills: &[SkillSpec],
        options: &RunOptions,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&str),
    ) -> Result<Report> {
        let mut report = Report::new(options.source.clone());
        let has_base = options.inputs.base_ref.is_some();

        for skill in skills {
            cancel.check()?;

            if effective_requires_diff(skill, options.default_requires_diff) && !has_base {
                debug!(skill = %skill.name, "skipping skill without diff base");
                observer(&format!(
                    "  ⊘ {} [skipped: requires --base for diff context]",
                    skill.name
                ));
                report.record(SkillResult::skipped(&skill.name, skill.mandatory, SKIP_NO_BASE));
                continue;
            }

            observer(&format!("▶ Running: {} [{}]", skill.name, skill.cost));
            let result = match self.executor.run(skill, &options.inputs, cancel) {
                Ok(output) => {
                    let result = SkillResult::from_output(&skill.name, skill.mandatory, &output);
                    observer(&outcome_line(&result));
                    result
                }
                Err(err) if is_cancelled(&err) => return Err(err),
                Err(err) => {
                    warn!(skill = %skill.name, err = %format!("{err:#}"), "skill errored");
                    observer(&format!("  ✖ {} [error: {err:#}]", skill.name));
                    SkillResult::errored(&skill.name, skill.mandatory)
                }
            };

            let stop = options.fail_fast && result.failed() && skill.mandatory;
            report.record(result);
            if stop {
                info!(skill = %skill.name, "mandatory failure, stopping (fail-fast)");
                observer(&format!("✖ Mandatory failure (--fail-fast): {}", skill.name));
                break;
            }
        }

        debug!(summary = %report.summary_line(), "orchestrator finished");
        Ok(report)
    }
}

fn outcome_line(result: &SkillResult) -> String {
    let counts = format!(
        "(blocking:{} major:{} warning:{})",
        result.blocking, result.major, result.warning
    );
    if !result.failed() {
        format!("  ✔ {} {counts}", result.name)
    } else if result.mandatory {
        format!("  ✖ {} [mandatory] {counts}", result.name)
    } else {
        format!("  ⚠ {} [non-mandatory] {counts}", result.name)
    }
}
