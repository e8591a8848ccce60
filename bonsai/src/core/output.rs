//! Skill output parsing and schema validation.
//!
//! Every skill answers with one JSON object matching the unified output
//! schema. Anything else is a hard error, never a pass/fail decision.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Unified output schema shared by every skill without its own schema file.
pub const SKILL_OUTPUT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/skill_output.schema.json"
));

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```(?:json)?[ \t]*\r?$\n?").expect("fence regex should be valid"));

static UNIFIED_VALIDATOR: LazyLock<Result<Validator, String>> =
    LazyLock::new(|| compile_schema(SKILL_OUTPUT_SCHEMA));

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("empty skill output")]
    Empty,
    #[error("parse skill output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid output schema: {0}")]
    Schema(String),
    #[error("skill output failed schema validation:\n- {}", .0.join("\n- "))]
    Violations(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Pass,
    Fail,
}

/// Validated skill answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillOutput {
    pub skill: String,
    pub version: String,
    pub status: OutputStatus,
    pub blocking: Vec<String>,
    pub major: Vec<String>,
    pub warning: Vec<String>,
    pub info: Vec<String>,
}

impl SkillOutput {
    /// Only a `fail` with at least one blocking finding fails the skill.
    pub fn should_fail(&self) -> bool {
        self.status == OutputStatus::Fail && !self.blocking.is_empty()
    }
}

/// Parse raw agent text against the unified schema.
pub fn parse_output(raw: &str) -> Result<SkillOutput, OutputError> {
    parse_output_with_schema(raw, None)
}

/// Parse raw agent text, validating against `schema` when given.
pub fn parse_output_with_schema(raw: &str, schema: Option<&str>) -> Result<SkillOutput, OutputError> {
    let cleaned = FENCE_LINE.replace_all(raw, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(OutputError::Empty);
    }
    let value: Value = serde_json::from_str(cleaned)?;

    match schema {
        Some(schema) => validate(&compile_schema(schema).map_err(OutputError::Schema)?, &value)?,
        None => {
            let validator = UNIFIED_VALIDATOR
                .as_ref()
                .map_err(|err| OutputError::Schema(err.clone()))?;
            validate(validator, &value)?;
        }
    }

    Ok(serde_json::from_value(value)?)
}

fn compile_schema(raw: &str) -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| err.to_string())
}

fn validate(validator: &Validator, value: &Value) -> Result<(), OutputError> {
    let messages: Vec<String> = validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }
    Err(OutputError::Violations(messages))
}
