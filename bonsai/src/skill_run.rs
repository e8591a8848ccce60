//! `bonsai skill`: run one registered skill and return its validated output.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, instrument};

use crate::cancel::CancelToken;
use crate::core::output::SkillOutput;
use crate::core::registry::Registry;
use crate::io::git::VersionControl;
use crate::io::repo::{build_diff_payload, filter_scope, repo_tree, vcs_tree};
use crate::io::skill::{SkillExecutor, SkillInputs};

#[derive(Debug, Clone, Default)]
pub struct SkillRequest {
    pub name: String,
    /// Overrides the registry's version for this run.
    pub version: Option<String>,
    pub base: Option<String>,
    pub scope: Vec<String>,
}

/// Run `request.name` once. Diff requirements and mandatory flags do not apply.
#[instrument(skip_all, fields(skill = %request.name))]
pub fn run_skill(
    request: &SkillRequest,
    registry: &Registry,
    executor: &dyn SkillExecutor,
    vcs: Option<&dyn VersionControl>,
    repo_root: &Path,
    cancel: &CancelToken,
) -> Result<SkillOutput> {
    let mut skill = registry
        .lookup(&request.name)
        .cloned()
        .ok_or_else(|| anyhow!("skill '{}' not in registry", request.name))?;
    if let Some(version) = request.version.as_deref().filter(|v| !v.is_empty()) {
        skill.version = version.to_string();
    }

    let files = match vcs {
        Some(vcs) => filter_scope(vcs_tree(vcs)?, &request.scope),
        None => repo_tree(repo_root, &request.scope)?,
    };
    if files.is_empty() {
        bail!("scope produced empty repo tree");
    }
    let diff_payload = match (vcs, request.base.as_deref()) {
        (Some(vcs), Some(base)) => build_diff_payload(vcs, repo_root, base),
        _ => String::new(),
    };
    let inputs = SkillInputs {
        repo_tree: files.join("\n"),
        diff_payload,
        base_ref: request.base.clone(),
    };

    info!(version = %registry.effective_version(&skill), "running skill");
    executor
        .run(&skill, &inputs, cancel)
        .with_context(|| format!("run skill {}", request.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::output::OutputStatus;
    use crate::io::assets::AssetResolver;
    use crate::io::prompt::PromptBuilder;
    use crate::io::skill::AgentSkillExecutor;
    use crate::test_support::{
        REGISTRY_YAML, ScriptedAgent, ScriptedOutcome, ScriptedSkillExecutor, ScriptedVcs,
        pass_output_json,
    };

    fn registry() -> Registry {
        Registry::parse(REGISTRY_YAML).expect("registry")
    }

    fn request(name: &str) -> SkillRequest {
        SkillRequest {
            name: name.to_string(),
            ..SkillRequest::default()
        }
    }

    #[test]
    fn unregistered_skill_is_rejected() {
        let executor = ScriptedSkillExecutor::new();
        let err = run_skill(
            &request("ghost"),
            &registry(),
            &executor,
            Some(&ScriptedVcs::with_change("src/lib.rs")),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not in registry"));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn empty_scope_is_an_error() {
        let executor = ScriptedSkillExecutor::new();
        let req = SkillRequest {
            scope: vec!["docs/".to_string()],
            ..request("layering")
        };
        let err = run_skill(
            &req,
            &registry(),
            &executor,
            Some(&ScriptedVcs::with_change("src/lib.rs")),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "scope produced empty repo tree");
    }

    #[test]
    fn diff_is_sent_only_with_base() {
        let executor = ScriptedSkillExecutor::new()
            .script("layering", vec![ScriptedOutcome::Fail(1), ScriptedOutcome::Pass]);
        let vcs = ScriptedVcs::with_change("src/lib.rs");
        let registry = registry();

        let failed = run_skill(
            &SkillRequest {
                base: Some("main".to_string()),
                ..request("layering")
            },
            &registry,
            &executor,
            Some(&vcs),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .expect("run");
        assert!(failed.should_fail());

        let passed = run_skill(
            &request("layering"),
            &registry,
            &executor,
            Some(&vcs),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .expect("run");
        assert_eq!(passed.status, OutputStatus::Pass);

        let inputs = executor.inputs();
        assert!(inputs[0].diff_payload.contains("+changed"));
        assert_eq!(inputs[0].base_ref.as_deref(), Some("main"));
        assert_eq!(inputs[1].diff_payload, "");
        assert_eq!(inputs[1].repo_tree, "src/lib.rs");
    }

    #[test]
    fn version_override_selects_skill_directory() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        let prompts = PromptBuilder::new(Path::new("/nonexistent"));
        let agent = ScriptedAgent::new(vec![pass_output_json("patch-scope-guard")]);
        let executor = AgentSkillExecutor::new(&agent, &resolver, &registry, &prompts);
        let vcs = ScriptedVcs::with_change("src/lib.rs");

        let err = run_skill(
            &SkillRequest {
                version: Some("v99".to_string()),
                ..request("patch-scope-guard")
            },
            &registry,
            &executor,
            Some(&vcs),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("patch-scope-guard/v99"));
        assert!(agent.prompts().is_empty());

        let output = run_skill(
            &request("patch-scope-guard"),
            &registry,
            &executor,
            Some(&vcs),
            Path::new("/repo"),
            &CancelToken::new(),
        )
        .expect("run");
        assert_eq!(output.status, OutputStatus::Pass);
    }
}
