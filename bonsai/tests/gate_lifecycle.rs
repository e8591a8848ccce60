//! Loop-level tests for the implement-and-gate workflow.
//!
//! These drive `preflight` and `GateLoop::run` with scripted agents, version
//! control and skill outcomes to verify iteration bounds, re-entry with
//! findings, artifact persistence and every early stop.

use std::fs;
use std::path::Path;

use bonsai::cancel::CancelToken;
use bonsai::core::registry::Registry;
use bonsai::gate::{GateLoop, GateOutcome, GateSession, GateStop, preflight};
use bonsai::io::agent::SessionEnd;
use bonsai::io::artifacts::OutputPaths;
use bonsai::io::config::BonsaiConfig;
use bonsai::io::prompt::PromptBuilder;
use bonsai::test_support::{
    REGISTRY_YAML, ScriptedAgent, ScriptedConfirm, ScriptedOutcome, ScriptedSkillExecutor,
    ScriptedVcs,
};

struct Harness {
    temp: tempfile::TempDir,
    registry: Registry,
    config: BonsaiConfig,
    outputs: OutputPaths,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let outputs = OutputPaths::new(temp.path().join("ai/out"));
        Self {
            temp,
            registry: Registry::parse(REGISTRY_YAML).expect("registry"),
            config: BonsaiConfig::default(),
            outputs,
        }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn run(
        &self,
        vcs: &ScriptedVcs,
        agent: &ScriptedAgent,
        executor: &ScriptedSkillExecutor,
        confirm: &ScriptedConfirm,
    ) -> anyhow::Result<(GateSession, GateOutcome)> {
        let mut session = preflight(vcs, &self.config, &self.outputs)?;
        let prompts = PromptBuilder::new(self.root());
        let gate = GateLoop {
            vcs,
            session_agent: agent,
            executor,
            registry: &self.registry,
            prompts: &prompts,
            confirm,
            config: &self.config,
            outputs: &self.outputs,
            repo_root: self.root(),
            extra_args: &[],
        };
        let outcome = gate.run(&mut session, &CancelToken::new())?;
        Ok((session, outcome))
    }
}

fn changed_files(count: usize) -> ScriptedVcs {
    let names: Vec<String> = (0..count).map(|i| format!("src/file{i}.rs")).collect();
    ScriptedVcs {
        name_status: names.iter().map(|name| format!("M\t{name}")).collect(),
        diff: names
            .iter()
            .map(|name| format!("diff --git a/{name} b/{name}\n+changed\n"))
            .collect(),
        tracked: names.clone(),
        names,
        ..ScriptedVcs::default()
    }
}

#[test]
fn passing_first_iteration_saves_artifacts() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();
    let confirm = ScriptedConfirm::new(Vec::new());

    let (session, outcome) = harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &confirm)
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Passed { iteration: 1 });
    assert!(outcome.stop.is_success());
    assert_eq!(session.iteration, 1);
    assert_eq!(agent.sessions().len(), 1);
    assert!(confirm.questions().is_empty());

    let report = outcome.report.expect("report");
    assert_eq!(report.source, "mode:PATCH");
    assert_eq!(executor.calls(), vec!["conventions"]);

    let patch = fs::read_to_string(harness.outputs.last_patch()).expect("last.patch");
    assert!(patch.contains("src/config.rs"));
    let saved: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(harness.outputs.last_report()).expect("last.report.json"),
    )
    .expect("report json");
    assert_eq!(saved["source"], "mode:PATCH");
}

#[test]
fn failure_reenters_with_findings_then_passes() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor =
        ScriptedSkillExecutor::new().script("conventions", vec![ScriptedOutcome::Fail(2)]);
    let confirm = ScriptedConfirm::new(vec![true]);

    let (session, outcome) = harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &confirm)
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Passed { iteration: 2 });
    assert_eq!(session.iteration, 2);
    assert_eq!(confirm.questions().len(), 1);

    let sessions = agent.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(!sessions[0].contains("Previous governance findings"));
    assert!(sessions[1].contains("Previous governance findings"));
    assert!(sessions[1].contains("conventions"));
    assert!(sessions[1].contains("blocking: 2"));
}

#[test]
fn exhausts_after_max_iterations_without_asking_last() {
    let mut harness = Harness::new();
    harness.config.gate.max_iterations = 2;
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new().script(
        "conventions",
        vec![ScriptedOutcome::Fail(1), ScriptedOutcome::Fail(1)],
    );
    let confirm = ScriptedConfirm::new(vec![true, true]);

    let (_, outcome) = harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &confirm)
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Exhausted { iterations: 2 });
    assert!(!outcome.stop.is_success());
    assert_eq!(agent.sessions().len(), 2);
    assert_eq!(confirm.questions().len(), 1);
    assert!(outcome.report.expect("report").should_fail());
    assert!(!harness.outputs.last_report().exists());
}

#[test]
fn declining_reentry_stops_the_loop() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor =
        ScriptedSkillExecutor::new().script("conventions", vec![ScriptedOutcome::Fail(1)]);
    let confirm = ScriptedConfirm::new(vec![false]);

    let (_, outcome) = harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &confirm)
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Declined { iteration: 1 });
    assert!(!outcome.stop.is_success());
    assert_eq!(agent.sessions().len(), 1);
}

#[test]
fn errored_mandatory_skill_blocks_the_gate() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new().script(
        "conventions",
        vec![ScriptedOutcome::Error("agent returned garbage".to_string())],
    );
    let confirm = ScriptedConfirm::new(vec![false]);

    let (_, outcome) = harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &confirm)
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Declined { iteration: 1 });
    let report = outcome.report.expect("report");
    assert_eq!(report.blocking_failed, 1);
}

#[test]
fn no_merge_base_skips_gate_after_session() {
    let harness = Harness::new();
    let vcs = ScriptedVcs {
        refs: Vec::new(),
        ..ScriptedVcs::with_change("src/config.rs")
    };
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    let (_, outcome) = harness
        .run(&vcs, &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::NoMergeBase);
    assert!(outcome.stop.is_success());
    assert_eq!(agent.sessions().len(), 1);
    assert!(executor.calls().is_empty());
}

#[test]
fn unchanged_tree_skips_gate() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    let (_, outcome) = harness
        .run(&ScriptedVcs::default(), &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::NoChanges);
    assert!(outcome.report.is_none());
    assert!(executor.calls().is_empty());
}

#[test]
fn untracked_files_count_as_changes() {
    let harness = Harness::new();
    let vcs = ScriptedVcs {
        untracked: vec!["notes.txt".to_string()],
        ..ScriptedVcs::default()
    };
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    let (_, outcome) = harness
        .run(&vcs, &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    assert_eq!(outcome.stop, GateStop::Passed { iteration: 1 });
    assert_eq!(outcome.report.expect("report").source, "mode:NORMAL");
    assert_eq!(executor.calls(), vec!["conventions", "layering"]);
}

#[test]
fn interrupted_or_nonzero_session_still_runs_the_gate() {
    for end in [SessionEnd::Interrupted, SessionEnd::Exited(130)] {
        let harness = Harness::new();
        let agent = ScriptedAgent::new(Vec::new()).with_session_end(end);
        let executor = ScriptedSkillExecutor::new();

        let (_, outcome) = harness
            .run(
                &ScriptedVcs::with_change("src/config.rs"),
                &agent,
                &executor,
                &ScriptedConfirm::new(Vec::new()),
            )
            .expect("gate");

        assert_eq!(outcome.stop, GateStop::Passed { iteration: 1 }, "{end:?}");
        assert_eq!(executor.calls(), vec!["conventions"]);
        assert!(harness.outputs.last_report().exists());
    }
}

#[test]
fn session_spawn_failure_aborts() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new()).failing_sessions();
    let executor = ScriptedSkillExecutor::new();

    let err = harness
        .run(
            &ScriptedVcs::with_change("src/config.rs"),
            &agent,
            &executor,
            &ScriptedConfirm::new(Vec::new()),
        )
        .unwrap_err();

    assert!(format!("{err:#}").contains("start implementation session"));
    assert!(executor.calls().is_empty());
}

#[test]
fn larger_change_runs_normal_mode_skills() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    let (_, outcome) = harness
        .run(&changed_files(5), &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    assert_eq!(outcome.report.expect("report").source, "mode:NORMAL");
    assert_eq!(executor.calls(), vec!["conventions", "layering"]);
}

#[test]
fn patch_plan_intent_is_consumed_and_forces_patch_mode() {
    let harness = Harness::new();
    fs::create_dir_all(harness.outputs.dir()).expect("output dir");
    fs::write(
        harness.outputs.plan(),
        r#"{"intent": "patch", "constraints": {"max_files": 5}}"#,
    )
    .expect("write plan");
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    let (session, outcome) = harness
        .run(&changed_files(5), &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    assert_eq!(session.plan_intent(), Some("patch"));
    assert_eq!(outcome.report.expect("report").source, "mode:PATCH");
    assert!(!harness.outputs.plan().exists());
    assert!(harness.outputs.consumed_plan().exists());
}

#[test]
fn skills_receive_diff_context() {
    let harness = Harness::new();
    let agent = ScriptedAgent::new(Vec::new());
    let executor = ScriptedSkillExecutor::new();

    harness
        .run(&ScriptedVcs::with_change("src/config.rs"), &agent, &executor, &ScriptedConfirm::new(Vec::new()))
        .expect("gate");

    let inputs = executor.inputs();
    assert_eq!(inputs[0].base_ref.as_deref(), Some("0123456789abcdef0123"));
    assert!(inputs[0].diff_payload.contains("+changed"));
    assert!(inputs[0].repo_tree.contains("src/config.rs"));
}
