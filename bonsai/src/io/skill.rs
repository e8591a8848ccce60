//! Skill loading and execution through an agent.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::core::output::{SKILL_OUTPUT_SCHEMA, SkillOutput, parse_output_with_schema};
use crate::core::registry::{Registry, SkillSpec};
use crate::io::agent::Agent;
use crate::io::assets::{AssetResolver, AssetSource};
use crate::io::prompt::PromptBuilder;

/// A loaded `SKILL.md` plus its output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    /// `SKILL.md` with frontmatter stripped.
    pub body: String,
    pub output_schema: String,
    /// Whether `output_schema` came from the skill directory.
    pub custom_schema: bool,
    pub source: AssetSource,
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    description: Option<String>,
}

/// Context handed to every skill of one run.
#[derive(Debug, Clone, Default)]
pub struct SkillInputs {
    pub repo_tree: String,
    pub diff_payload: String,
    pub base_ref: Option<String>,
}

/// Runs one skill to a validated output.
pub trait SkillExecutor {
    fn run(&self, skill: &SkillSpec, inputs: &SkillInputs, cancel: &CancelToken) -> Result<SkillOutput>;
}

/// Load the definition of a registered skill.
pub fn load_definition(
    resolver: &AssetResolver,
    registry: &Registry,
    skill: &SkillSpec,
) -> Result<SkillDefinition> {
    if skill.unregistered || registry.lookup(&skill.name).is_none() {
        return Err(anyhow!(
            "skill '{}' is listed in a bundle but not registered",
            skill.name
        ));
    }
    let version = registry.effective_version(skill);
    let files = resolver
        .resolve_skill(&skill.name, version)
        .with_context(|| format!("resolve skill {}/{version}", skill.name))?;
    let (body, frontmatter) = split_frontmatter(&files.skill_md)
        .with_context(|| format!("parse frontmatter of {}/{version}", skill.name))?;
    let custom_schema = files.output_schema.is_some();
    Ok(SkillDefinition {
        name: skill.name.clone(),
        description: frontmatter.description.unwrap_or_default(),
        body,
        output_schema: files
            .output_schema
            .unwrap_or_else(|| SKILL_OUTPUT_SCHEMA.to_string()),
        custom_schema,
        source: files.source,
    })
}

fn split_frontmatter(contents: &str) -> Result<(String, Frontmatter)> {
    let mut lines = contents.split('\n');
    if lines.next().map(str::trim) != Some("---") {
        return Ok((contents.to_string(), Frontmatter::default()));
    }
    let rest: Vec<&str> = lines.collect();
    let Some(end) = rest.iter().position(|line| line.trim() == "---") else {
        return Ok((contents.to_string(), Frontmatter::default()));
    };
    let yaml = rest[..end].join("\n");
    let frontmatter = if yaml.trim().is_empty() {
        Frontmatter::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };
    let body = rest[end + 1..].join("\n");
    let body = body.strip_prefix('\n').unwrap_or(&body).to_string();
    Ok((body, frontmatter))
}

/// Executes skills through a non-interactive agent call.
pub struct AgentSkillExecutor<'a> {
    agent: &'a dyn Agent,
    resolver: &'a AssetResolver,
    registry: &'a Registry,
    prompts: &'a PromptBuilder,
}

impl<'a> AgentSkillExecutor<'a> {
    pub fn new(
        agent: &'a dyn Agent,
        resolver: &'a AssetResolver,
        registry: &'a Registry,
        prompts: &'a PromptBuilder,
    ) -> Self {
        Self {
            agent,
            resolver,
            registry,
            prompts,
        }
    }
}

impl SkillExecutor for AgentSkillExecutor<'_> {
    #[instrument(skip_all, fields(skill = %skill.name, agent = self.agent.name()))]
    fn run(&self, skill: &SkillSpec, inputs: &SkillInputs, cancel: &CancelToken) -> Result<SkillOutput> {
        let definition = load_definition(self.resolver, self.registry, skill)?;
        debug!(source = %definition.source, "loaded skill definition");

        let system_prompt = self
            .prompts
            .validator(&definition.body, &definition.output_schema)
            .context("build validator prompt")?;
        let diff = inputs
            .base_ref
            .as_ref()
            .map(|_| inputs.diff_payload.as_str());
        let user_prompt = self
            .prompts
            .skill_input(&inputs.repo_tree, diff, inputs.base_ref.as_deref())
            .context("build skill input prompt")?;

        info!("invoking agent");
        let response = self
            .agent
            .non_interactive(&system_prompt, &user_prompt, cancel)
            .context("agent invocation")?;

        let schema = definition
            .custom_schema
            .then_some(definition.output_schema.as_str());
        let output = parse_output_with_schema(&response, schema).context("validate output")?;
        debug!(status = ?output.status, blocking = output.blocking.len(), "skill output validated");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::output::OutputStatus;
    use crate::test_support::{ScriptedAgent, pass_output_json};

    #[test]
    fn frontmatter_description_is_extracted() {
        let (body, frontmatter) =
            split_frontmatter("---\nname: x\ndescription: Checks things\n---\n\n# Body\n").expect("split");
        assert_eq!(frontmatter.description.as_deref(), Some("Checks things"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn missing_frontmatter_keeps_body() {
        let (body, frontmatter) = split_frontmatter("# Body\n").expect("split");
        assert!(frontmatter.description.is_none());
        assert_eq!(body, "# Body\n");

        let (body, _) = split_frontmatter("---\nunterminated\n").expect("split");
        assert_eq!(body, "---\nunterminated\n");
    }

    #[test]
    fn unregistered_skill_cannot_load() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        let err = load_definition(&resolver, &registry, &SkillSpec::unregistered("ghost")).unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn embedded_skill_loads_with_fallback_schema() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        let skill = registry.lookup("patch-scope-guard").expect("skill").clone();
        let definition = load_definition(&resolver, &registry, &skill).expect("load");
        assert!(!definition.custom_schema);
        assert_eq!(definition.output_schema, SKILL_OUTPUT_SCHEMA);
        assert!(definition.description.starts_with("Flags small changes"));
        assert!(definition.body.starts_with("# Patch scope guard"));
    }

    #[test]
    fn executor_validates_agent_answer() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        let temp = tempfile::tempdir().expect("tempdir");
        let prompts = PromptBuilder::new(temp.path());
        let skill = registry.lookup("repo-convention-enforcer").expect("skill").clone();
        let agent = ScriptedAgent::new(vec![format!(
            "```json\n{}\n```",
            pass_output_json("repo-convention-enforcer")
        )]);
        let executor = AgentSkillExecutor::new(&agent, &resolver, &registry, &prompts);
        let inputs = SkillInputs {
            repo_tree: "README.md".to_string(),
            diff_payload: "+hello".to_string(),
            base_ref: Some("abc".to_string()),
        };
        let output = executor.run(&skill, &inputs, &CancelToken::new()).expect("run");
        assert_eq!(output.status, OutputStatus::Pass);

        let prompts_seen = agent.prompts();
        assert_eq!(prompts_seen.len(), 1);
        assert!(prompts_seen[0].0.contains("Repository convention enforcer"));
        assert!(prompts_seen[0].1.contains("Diff (base: abc):\n+hello"));
    }

    #[test]
    fn custom_schema_rejects_wrong_skill_name() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        let temp = tempfile::tempdir().expect("tempdir");
        let prompts = PromptBuilder::new(temp.path());
        let skill = registry.lookup("repo-convention-enforcer").expect("skill").clone();
        let agent = ScriptedAgent::new(vec![pass_output_json("someone-else")]);
        let executor = AgentSkillExecutor::new(&agent, &resolver, &registry, &prompts);
        let err = executor
            .run(&skill, &SkillInputs::default(), &CancelToken::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("validate output"));
    }
}
