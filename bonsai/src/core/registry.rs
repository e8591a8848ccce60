//! Skill registry: bundle resolution and mode-based selection.
//!
//! The registry document lists skills in declaration order and maps bundle
//! names to author-ordered skill lists. Bundle order is authoritative and never
//! re-sorted; mode selection is sorted by (cost rank, execution-mode rank).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{Cost, ExecutionMode, GovernanceMode, RequiresDiff};

/// Rank assigned to a cost or execution mode missing from the ordering table.
pub const UNKNOWN_RANK: usize = 99;

const DEFAULT_SKILL_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("bundle not found: {name} (available: {})", .available.join(", "))]
    BundleNotFound {
        name: String,
        available: Vec<String>,
    },
    #[error("no skills matched mode {mode}")]
    NoSkillsForMode { mode: GovernanceMode },
    #[error("parse skills registry: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Modes a skill applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWhen {
    #[serde(default)]
    pub modes: BTreeSet<GovernanceMode>,
}

/// A single registered governance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Skill directory relative to a skills root, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default, rename = "mode")]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub mandatory: bool,
    /// Free-text description of what should prompt a manual run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default)]
    pub requires_diff: RequiresDiff,
    #[serde(default)]
    pub run_when: RunWhen,
    /// Set for bundle entries that name no registered skill.
    #[serde(skip)]
    pub unregistered: bool,
}

impl SkillSpec {
    /// Placeholder for a bundle entry with no registry record.
    ///
    /// It is always attempted (never skipped for missing diff context) and is
    /// mandatory, so the executor's refusal to load it surfaces as a blocking
    /// error instead of a silent skip.
    pub fn unregistered(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: String::new(),
            path: None,
            domain: String::new(),
            cost: Cost::default(),
            execution_mode: ExecutionMode::default(),
            mandatory: true,
            trigger: None,
            requires_diff: RequiresDiff::Explicit(false),
            run_when: RunWhen::default(),
            unregistered: true,
        }
    }

    pub fn applies_to(&self, mode: GovernanceMode) -> bool {
        self.run_when.modes.contains(&mode)
    }
}

/// Registry-wide defaults.
///
/// `cost_order` and `mode_order` document the ranking; selection always uses
/// [`cost_rank`] and [`mode_rank`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryDefaults {
    pub skill_version: String,
    pub requires_diff: RequiresDiff,
    pub cost_order: Vec<Cost>,
    pub mode_order: Vec<ExecutionMode>,
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self {
            skill_version: DEFAULT_SKILL_VERSION.to_string(),
            requires_diff: RequiresDiff::Inherit,
            cost_order: vec![Cost::Cheap, Cost::Moderate, Cost::Heavy],
            mode_order: vec![
                ExecutionMode::Deterministic,
                ExecutionMode::Heuristic,
                ExecutionMode::Semantic,
            ],
        }
    }
}

/// Fixed cost ranking: cheap, moderate, heavy, then anything else.
pub fn cost_rank(cost: &Cost) -> usize {
    match cost {
        Cost::Cheap => 0,
        Cost::Moderate => 1,
        Cost::Heavy => 2,
        Cost::Other(_) => UNKNOWN_RANK,
    }
}

/// Fixed execution-mode ranking: deterministic, heuristic, semantic, then anything else.
pub fn mode_rank(mode: &ExecutionMode) -> usize {
    match mode {
        ExecutionMode::Deterministic => 0,
        ExecutionMode::Heuristic => 1,
        ExecutionMode::Semantic => 2,
        ExecutionMode::Other(_) => UNKNOWN_RANK,
    }
}

/// Parsed `skills.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub defaults: RegistryDefaults,
    #[serde(default, rename = "registry")]
    pub skills: Vec<SkillSpec>,
    #[serde(default)]
    pub bundles: BTreeMap<String, Vec<String>>,
}

/// Effective diff requirement: explicit skill value, then registry default, then `true`.
pub fn effective_requires_diff(skill: &SkillSpec, registry_default: RequiresDiff) -> bool {
    skill.requires_diff.or(registry_default).resolve(true)
}

impl Registry {
    pub fn parse(yaml: &str) -> Result<Self, RegistryError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn lookup(&self, name: &str) -> Option<&SkillSpec> {
        self.skills.iter().find(|skill| skill.name == name)
    }

    /// Bundle names in sorted order.
    pub fn bundle_names(&self) -> Vec<String> {
        self.bundles.keys().cloned().collect()
    }

    /// `(bundle, skill)` pairs whose skill name has no registry record.
    pub fn unknown_bundle_entries(&self) -> Vec<(String, String)> {
        let mut unknown = Vec::new();
        for (bundle, names) in &self.bundles {
            for name in names {
                if self.lookup(name).is_none() {
                    unknown.push((bundle.clone(), name.clone()));
                }
            }
        }
        unknown
    }

    /// Skills for a bundle, in the bundle author's order.
    ///
    /// Names missing from the registry become [`SkillSpec::unregistered`]
    /// placeholders that fail when executed.
    pub fn skills_for_bundle(&self, name: &str) -> Result<Vec<SkillSpec>, RegistryError> {
        let names = self
            .bundles
            .get(name)
            .ok_or_else(|| RegistryError::BundleNotFound {
                name: name.to_string(),
                available: self.bundle_names(),
            })?;
        Ok(names
            .iter()
            .map(|skill_name| match self.lookup(skill_name) {
                Some(skill) => skill.clone(),
                None => SkillSpec::unregistered(skill_name),
            })
            .collect())
    }

    /// Skills applicable to `mode`, stable-sorted by (cost rank, execution-mode rank).
    pub fn skills_for_mode(&self, mode: GovernanceMode) -> Result<Vec<SkillSpec>, RegistryError> {
        let mut matched: Vec<SkillSpec> = self
            .skills
            .iter()
            .filter(|skill| skill.applies_to(mode))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(RegistryError::NoSkillsForMode { mode });
        }
        matched.sort_by_key(|skill| {
            (
                cost_rank(&skill.cost),
                mode_rank(&skill.execution_mode),
            )
        });
        Ok(matched)
    }

    /// Version to load for `skill`: its own, else the registry default.
    pub fn effective_version<'a>(&'a self, skill: &'a SkillSpec) -> &'a str {
        if !skill.version.is_empty() {
            return &skill.version;
        }
        if !self.defaults.skill_version.is_empty() {
            return &self.defaults.skill_version;
        }
        DEFAULT_SKILL_VERSION
    }
}
