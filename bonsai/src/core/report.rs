//! Aggregate results of one orchestrator run.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::core::output::{OutputStatus, SkillOutput};

/// Format of [`Report::timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Pass,
    Fail,
    Error,
    Skipped,
}

impl SkillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillStatus::Pass => "pass",
            SkillStatus::Fail => "fail",
            SkillStatus::Error => "error",
            SkillStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillResult {
    pub name: String,
    pub status: SkillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    pub blocking: usize,
    pub major: usize,
    pub warning: usize,
    pub exit_code: i32,
    pub mandatory: bool,
}

impl SkillResult {
    pub fn skipped(name: &str, mandatory: bool, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: SkillStatus::Skipped,
            skipped_reason: Some(reason.to_string()),
            blocking: 0,
            major: 0,
            warning: 0,
            exit_code: 0,
            mandatory,
        }
    }

    pub fn errored(name: &str, mandatory: bool) -> Self {
        Self {
            name: name.to_string(),
            status: SkillStatus::Error,
            skipped_reason: None,
            blocking: 0,
            major: 0,
            warning: 0,
            exit_code: 1,
            mandatory,
        }
    }

    /// Keeps the skill's own verdict; only `should_fail` sets the exit code.
    pub fn from_output(name: &str, mandatory: bool, output: &SkillOutput) -> Self {
        Self {
            name: name.to_string(),
            status: match output.status {
                OutputStatus::Pass => SkillStatus::Pass,
                OutputStatus::Fail => SkillStatus::Fail,
            },
            skipped_reason: None,
            blocking: output.blocking.len(),
            major: output.major.len(),
            warning: output.warning.len(),
            exit_code: i32::from(output.should_fail()),
            mandatory,
        }
    }

    pub fn failed(&self) -> bool {
        self.exit_code != 0
    }

    /// `SKILL: <name> | blocking: <n> | major: <n> | warning: <n>`
    pub fn finding_line(&self) -> String {
        format!(
            "SKILL: {} | blocking: {} | major: {} | warning: {}",
            self.name, self.blocking, self.major, self.warning
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub source: String,
    pub timestamp: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub blocking_failed: usize,
    pub results: Vec<SkillResult>,
}

impl Report {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            blocking_failed: 0,
            results: Vec::new(),
        }
    }

    /// Count one attempted skill. Keeps `total == passed + failed + skipped`.
    pub fn record(&mut self, result: SkillResult) {
        self.total += 1;
        if result.status == SkillStatus::Skipped {
            self.skipped += 1;
        } else if result.failed() {
            self.failed += 1;
            if result.mandatory {
                self.blocking_failed += 1;
            }
        } else {
            self.passed += 1;
        }
        self.results.push(result);
    }

    /// True when nothing was actually validated, or a mandatory skill failed.
    pub fn should_fail(&self) -> bool {
        (self.total > 0 && self.skipped == self.total) || self.blocking_failed > 0
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &SkillResult> {
        self.results.iter().filter(|result| result.failed())
    }

    /// Findings text carried into the next gate iteration.
    pub fn extract_findings(&self) -> String {
        self.failed_results()
            .map(SkillResult::finding_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn summary_line(&self) -> String {
        format!(
            "total={} passed={} failed={} skipped={} blocking_failed={}",
            self.total, self.passed, self.failed, self.skipped, self.blocking_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(status: OutputStatus, blocking: usize) -> SkillOutput {
        SkillOutput {
            skill: "s".to_string(),
            version: "v1".to_string(),
            status,
            blocking: vec!["b".to_string(); blocking],
            major: vec!["m".to_string()],
            warning: Vec::new(),
            info: Vec::new(),
        }
    }

    #[test]
    fn all_skipped_should_fail() {
        let mut report = Report::new("check");
        report.record(SkillResult::skipped("a", false, "requires diff without base"));
        report.record(SkillResult::skipped("b", true, "requires diff without base"));
        assert_eq!(report.blocking_failed, 0);
        assert!(report.should_fail());
    }

    #[test]
    fn empty_report_passes() {
        assert!(!Report::new("check").should_fail());
    }

    #[test]
    fn non_mandatory_failure_does_not_block() {
        let mut report = Report::new("check");
        report.record(SkillResult::from_output("a", false, &output(OutputStatus::Fail, 1)));
        report.record(SkillResult::from_output("b", true, &output(OutputStatus::Pass, 0)));
        assert_eq!((report.total, report.passed, report.failed), (2, 1, 1));
        assert!(!report.should_fail());
    }

    #[test]
    fn fail_without_blocking_findings_keeps_verdict_but_counts_as_passed() {
        let result = SkillResult::from_output("a", true, &output(OutputStatus::Fail, 0));
        assert_eq!(result.status, SkillStatus::Fail);
        assert_eq!(result.exit_code, 0);
        assert!(!result.failed());

        let mut report = Report::new("check");
        report.record(result);
        assert_eq!((report.passed, report.failed, report.blocking_failed), (1, 0, 0));
        assert!(!report.should_fail());
        assert_eq!(report.extract_findings(), "");
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"status\":\"fail\""));
    }

    #[test]
    fn mandatory_error_blocks() {
        let mut report = Report::new("check");
        report.record(SkillResult::errored("a", true));
        assert_eq!(report.blocking_failed, 1);
        assert!(report.should_fail());
    }

    #[test]
    fn extract_findings_lists_failures_in_order() {
        let mut report = Report::new("gate");
        report.record(SkillResult::from_output("first", true, &output(OutputStatus::Fail, 2)));
        report.record(SkillResult::from_output("ok", true, &output(OutputStatus::Pass, 0)));
        report.record(SkillResult::errored("broken", false));
        assert_eq!(
            report.extract_findings(),
            "SKILL: first | blocking: 2 | major: 1 | warning: 0\n\
             SKILL: broken | blocking: 0 | major: 0 | warning: 0"
        );
    }

    #[test]
    fn serde_round_trip_preserves_results() {
        let mut report = Report::new("check");
        report.record(SkillResult::skipped("a", false, "requires diff without base"));
        report.record(SkillResult::from_output("b", true, &output(OutputStatus::Fail, 1)));
        let json = serde_json::to_string_pretty(&report).expect("serialize");
        assert!(json.contains("\"skipped_reason\": \"requires diff without base\""));
        assert_eq!(json.matches("skipped_reason").count(), 1);
        let back: Report = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }

    #[test]
    fn timestamp_uses_compact_local_format() {
        let report = Report::new("check");
        assert_eq!(report.timestamp.len(), 15);
        assert_eq!(report.timestamp.as_bytes()[8], b'-');
    }
}
