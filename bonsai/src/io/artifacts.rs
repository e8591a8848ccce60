//! Artifact files under the configured output directory.
//!
//! Downstream tooling reads these files, so names and layouts are stable.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::report::Report;

pub const CHECK_REPORT_FILE: &str = "ai-check.json";
pub const PATCH_PLAN_FILE: &str = "patch-plan.json";
pub const PLAN_FILE: &str = "plan.json";
pub const CONSUMED_PLAN_FILE: &str = "plan.consumed.json";
pub const LAST_PATCH_FILE: &str = "last.patch";
pub const LAST_REPORT_FILE: &str = "last.report.json";

/// Metadata consumed from a pending `plan.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanInfo {
    /// `null` and a missing key both read as no intent.
    #[serde(default)]
    pub intent: Option<String>,
    /// Planner constraints, kept verbatim (usually an object such as `{"max_files": 3}`).
    #[serde(default)]
    pub constraints: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPlan {
    pub task: String,
    pub plan: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl PatchPlan {
    pub fn new(task: &str, plan: &str) -> Self {
        Self {
            task: task.to_string(),
            plan: plan.to_string(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

/// Paths of every artifact for one repository.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    dir: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn check_report(&self) -> PathBuf {
        self.dir.join(CHECK_REPORT_FILE)
    }

    pub fn patch_plan(&self) -> PathBuf {
        self.dir.join(PATCH_PLAN_FILE)
    }

    pub fn plan(&self) -> PathBuf {
        self.dir.join(PLAN_FILE)
    }

    pub fn consumed_plan(&self) -> PathBuf {
        self.dir.join(CONSUMED_PLAN_FILE)
    }

    pub fn last_patch(&self) -> PathBuf {
        self.dir.join(LAST_PATCH_FILE)
    }

    pub fn last_report(&self) -> PathBuf {
        self.dir.join(LAST_REPORT_FILE)
    }

    pub fn write_check_report(&self, report: &Report) -> Result<PathBuf> {
        let path = self.check_report();
        write_json(&path, report)?;
        Ok(path)
    }

    pub fn write_patch_plan(&self, plan: &PatchPlan) -> Result<PathBuf> {
        let path = self.patch_plan();
        write_json(&path, plan)?;
        Ok(path)
    }

    /// Persist the accepted change: `last.patch` (only when non-empty) and `last.report.json`.
    pub fn save_gate_artifacts(&self, patch: &str, report: &Report) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::new();
        if !patch.is_empty() {
            let path = self.last_patch();
            write_atomic(&path, patch)?;
            saved.push(path);
        }
        let path = self.last_report();
        write_json(&path, report)?;
        saved.push(path);
        Ok(saved)
    }

    /// Read a pending `plan.json` and rename it so it is never consumed twice.
    ///
    /// A missing file yields `Ok(None)`. A malformed one is left in place and
    /// reported as an error for the caller to downgrade.
    pub fn consume_plan(&self) -> Result<Option<PlanInfo>> {
        let path = self.plan();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let plan: PlanInfo =
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        let consumed = self.consumed_plan();
        if let Err(err) = fs::rename(&path, &consumed) {
            warn!(err = %err, path = %path.display(), "failed to mark plan consumed");
        } else {
            debug!(path = %consumed.display(), "plan consumed");
        }
        Ok(Some(plan))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("artifact path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace artifact {}", path.display()))?;
    Ok(())
}
