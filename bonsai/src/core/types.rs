//! Shared deterministic types for governance routing.
//!
//! These types define stable contracts between the registry, the classifier and
//! the orchestrator. They must not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blast-radius classification of a change. Selects which skills run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GovernanceMode {
    Patch,
    Normal,
    Structural,
    Api,
    Heavy,
    Audit,
}

impl GovernanceMode {
    pub const ALL: [GovernanceMode; 6] = [
        GovernanceMode::Patch,
        GovernanceMode::Normal,
        GovernanceMode::Structural,
        GovernanceMode::Api,
        GovernanceMode::Heavy,
        GovernanceMode::Audit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GovernanceMode::Patch => "PATCH",
            GovernanceMode::Normal => "NORMAL",
            GovernanceMode::Structural => "STRUCTURAL",
            GovernanceMode::Api => "API",
            GovernanceMode::Heavy => "HEAVY",
            GovernanceMode::Audit => "AUDIT",
        }
    }
}

impl fmt::Display for GovernanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a mode name does not match any [`GovernanceMode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid mode '{name}' (valid: PATCH, NORMAL, STRUCTURAL, API, HEAVY, AUDIT)")]
pub struct UnknownModeError {
    pub name: String,
}

impl FromStr for GovernanceMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GovernanceMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownModeError {
                name: s.to_string(),
            })
    }
}

/// Declared execution cost of a skill. Unrecognized values sort last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Cost {
    Cheap,
    Moderate,
    Heavy,
    Other(String),
}

impl Cost {
    pub fn as_str(&self) -> &str {
        match self {
            Cost::Cheap => "cheap",
            Cost::Moderate => "moderate",
            Cost::Heavy => "heavy",
            Cost::Other(raw) => raw,
        }
    }
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Other(String::new())
    }
}

impl From<String> for Cost {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "cheap" => Cost::Cheap,
            "moderate" => Cost::Moderate,
            "heavy" => Cost::Heavy,
            _ => Cost::Other(raw),
        }
    }
}

impl From<Cost> for String {
    fn from(cost: Cost) -> Self {
        cost.as_str().to_string()
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a skill reaches its verdict. Unrecognized values sort last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionMode {
    Deterministic,
    Heuristic,
    Semantic,
    Other(String),
}

impl ExecutionMode {
    pub fn as_str(&self) -> &str {
        match self {
            ExecutionMode::Deterministic => "deterministic",
            ExecutionMode::Heuristic => "heuristic",
            ExecutionMode::Semantic => "semantic",
            ExecutionMode::Other(raw) => raw,
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Other(String::new())
    }
}

impl From<String> for ExecutionMode {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "deterministic" => ExecutionMode::Deterministic,
            "heuristic" => ExecutionMode::Heuristic,
            "semantic" => ExecutionMode::Semantic,
            _ => ExecutionMode::Other(raw),
        }
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a skill needs diff context.
///
/// `Inherit` is distinct from `Explicit(false)`: an absent or null value defers
/// to the registry default instead of disabling the requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum RequiresDiff {
    #[default]
    Inherit,
    Explicit(bool),
}

impl RequiresDiff {
    /// Keep an explicit value, otherwise defer to `fallback`.
    pub fn or(self, fallback: RequiresDiff) -> RequiresDiff {
        match self {
            RequiresDiff::Explicit(_) => self,
            RequiresDiff::Inherit => fallback,
        }
    }

    pub fn resolve(self, default: bool) -> bool {
        match self {
            RequiresDiff::Explicit(value) => value,
            RequiresDiff::Inherit => default,
        }
    }
}

impl From<Option<bool>> for RequiresDiff {
    fn from(value: Option<bool>) -> Self {
        value.map_or(RequiresDiff::Inherit, RequiresDiff::Explicit)
    }
}

impl From<RequiresDiff> for Option<bool> {
    fn from(value: RequiresDiff) -> Self {
        match value {
            RequiresDiff::Explicit(value) => Some(value),
            RequiresDiff::Inherit => None,
        }
    }
}
