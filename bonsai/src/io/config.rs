//! Layered bonsai configuration.
//!
//! Resolution order, later layers overriding earlier ones key by key:
//! built-in defaults, the user file, `<repo>/.bonsai.toml`, then `BONSAI_*`
//! environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::classifier::DiffThresholds;

/// Repo-local configuration file name.
pub const REPO_CONFIG_FILE: &str = ".bonsai.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BonsaiConfig {
    pub diff: DiffThresholds,
    pub routing: RoutingConfig,
    pub gate: GateConfig,
    pub agents: AgentsConfig,
    pub output: OutputConfig,
    pub skills: SkillsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path prefixes that count as public surface.
    pub public_surface_prefixes: Vec<String>,
    /// Substrings that mark a path as structural.
    pub structural_patterns: Vec<String>,
    /// Refs tried in order when detecting the merge base.
    pub merge_base_candidates: Vec<String>,
    /// Branches the gate loop refuses to run on.
    pub protected_branches: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            public_surface_prefixes: strings(&["api/", "sdk/", "public/", "cmd/", "cli/"]),
            structural_patterns: strings(&[
                "control/",
                "orchestrator/",
                "state_machine/",
                "persistence/",
                "auth/",
            ]),
            merge_base_candidates: strings(&["main", "master", "origin/main", "origin/master"]),
            protected_branches: strings(&["main", "master"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub max_iterations: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    pub claude_bin: String,
    pub codex_bin: String,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            claude_bin: "claude".to_string(),
            codex_bin: "codex".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Artifact directory, relative to the repo root unless absolute.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("ai/out"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SkillsConfig {
    /// Extra skill roots searched after the repo and before the user directory.
    pub extra_dirs: Vec<PathBuf>,
}

impl BonsaiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.diff.heavy_diff_lines == 0 {
            return Err(anyhow!("diff.heavy_diff_lines must be > 0"));
        }
        if self.diff.heavy_files_changed == 0 {
            return Err(anyhow!("diff.heavy_files_changed must be > 0"));
        }
        if self.diff.patch_max_files == 0 {
            return Err(anyhow!("diff.patch_max_files must be > 0"));
        }
        if self.gate.max_iterations == 0 {
            return Err(anyhow!("gate.max_iterations must be > 0"));
        }
        if self.agents.claude_bin.trim().is_empty() {
            return Err(anyhow!("agents.claude_bin must not be empty"));
        }
        if self.agents.codex_bin.trim().is_empty() {
            return Err(anyhow!("agents.codex_bin must not be empty"));
        }
        Ok(())
    }

    /// Output directory resolved against `repo_root`.
    pub fn output_dir(&self, repo_root: &Path) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            repo_root.join(&self.output.dir)
        }
    }
}

/// User configuration directory: `$XDG_CONFIG_HOME/bonsai` or `~/.config/bonsai`.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(xdg).join("bonsai"));
    }
    env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join("bonsai"))
}

/// Load configuration for `repo_root` from every layer, including the process environment.
pub fn load_config(repo_root: &Path) -> Result<BonsaiConfig> {
    let user_file = user_config_dir().map(|dir| dir.join("config.toml"));
    let env_vars: HashMap<String, String> = env::vars().collect();
    load_layered(
        user_file.as_deref(),
        &repo_root.join(REPO_CONFIG_FILE),
        &env_vars,
    )
}

/// Merge file layers (either may be missing) and environment overrides.
pub fn load_layered(
    user_file: Option<&Path>,
    repo_file: &Path,
    env_vars: &HashMap<String, String>,
) -> Result<BonsaiConfig> {
    let mut merged = toml::Value::try_from(BonsaiConfig::default())
        .context("serialize default config")?;
    for path in user_file.into_iter().chain([repo_file]) {
        if let Some(layer) = read_layer(path)? {
            debug!(path = %path.display(), "applying config layer");
            merge_values(&mut merged, layer);
        }
    }
    let mut cfg: BonsaiConfig = merged.try_into().context("deserialize merged config")?;
    apply_env(&mut cfg, env_vars);
    cfg.validate()?;
    Ok(cfg)
}

fn read_layer(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: toml::Value =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env(cfg: &mut BonsaiConfig, env_vars: &HashMap<String, String>) {
    let number = |key: &str| -> Option<usize> {
        let raw = env_vars.get(key)?;
        match raw.trim().parse::<usize>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring non-numeric environment override");
                None
            }
        }
    };
    let text = |key: &str| env_vars.get(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = number("BONSAI_DIFF_HEAVY_LINES") {
        cfg.diff.heavy_diff_lines = value;
    }
    if let Some(value) = number("BONSAI_DIFF_HEAVY_FILES") {
        cfg.diff.heavy_files_changed = value;
    }
    if let Some(value) = number("BONSAI_DIFF_PATCH_MAX_FILES") {
        cfg.diff.patch_max_files = value;
    }
    if let Some(value) = number("BONSAI_GATE_MAX_ITERATIONS") {
        match u32::try_from(value) {
            Ok(value) => cfg.gate.max_iterations = value,
            Err(_) => warn!(value, "ignoring out-of-range BONSAI_GATE_MAX_ITERATIONS"),
        }
    }
    if let Some(value) = text("BONSAI_CLAUDE_BIN") {
        cfg.agents.claude_bin = value.clone();
    }
    if let Some(value) = text("BONSAI_CODEX_BIN") {
        cfg.agents.codex_bin = value.clone();
    }
    if let Some(value) = text("BONSAI_OUTPUT_DIR") {
        cfg.output.dir = PathBuf::from(value);
    }
    if let Some(value) = text("BONSAI_SKILLS_EXTRA_DIRS") {
        cfg.skills.extra_dirs = value
            .split(':')
            .filter(|part| !part.trim().is_empty())
            .map(PathBuf::from)
            .collect();
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
