//! Governance checks for AI-assisted changes.
//!
//! `check` runs a bundle or a mode's skills once, `implement` drives an
//! interactive session through the governance gate, `patch` plans, emits and
//! validates a focused patch, `skill` runs one skill, and `list` shows the
//! registry.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use bonsai::cancel::{CancelToken, install_interrupt_handler};
use bonsai::check::{self, CheckRequest, SkillSelection};
use bonsai::core::registry::Registry;
use bonsai::exit_codes;
use bonsai::gate::{GateLoop, preflight};
use bonsai::io::agent::{ClaudeAgent, CodexAgent};
use bonsai::io::artifacts::OutputPaths;
use bonsai::io::assets::AssetResolver;
use bonsai::io::config::{BonsaiConfig, load_config, user_config_dir};
use bonsai::io::git::{Git, VersionControl};
use bonsai::io::prompt::PromptBuilder;
use bonsai::io::repo::parse_scope;
use bonsai::io::skill::AgentSkillExecutor;
use bonsai::io::terminal::StdinConfirm;
use bonsai::list;
use bonsai::logging;
use bonsai::patch::PatchWorkflow;
use bonsai::skill_run::{self, SkillRequest};

#[derive(Parser)]
#[command(
    name = "bonsai",
    version,
    about = "Diff-aware governance checks for AI-assisted changes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a bundle (or every skill of a governance mode) once.
    Check {
        /// Bundle to run (default: `default`).
        #[arg(long)]
        bundle: Option<String>,
        /// Governance mode whose skills run, cheapest first.
        #[arg(long)]
        mode: Option<String>,
        /// Base ref for diff context.
        #[arg(long)]
        base: Option<String>,
        /// Comma-separated path prefixes limiting the repository tree.
        #[arg(long)]
        scope: Option<String>,
        /// Stop at the first failing mandatory skill.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Interactive implementation session gated by governance checks.
    Implement {
        /// Extra arguments for the agent CLI.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        agent_args: Vec<String>,
    },
    /// Plan, emit and validate a focused patch.
    Patch {
        /// What the patch should do.
        task: String,
    },
    /// Run a single skill and print its validated output.
    Skill {
        /// Registered skill name.
        name: String,
        /// Skill version override.
        #[arg(long)]
        version: Option<String>,
        /// Comma-separated path prefixes limiting the repository tree.
        #[arg(long)]
        scope: Option<String>,
        /// Base ref for diff context.
        #[arg(long)]
        base: Option<String>,
    },
    /// Show registered skills and bundles.
    List {
        #[arg(long)]
        skills: bool,
        #[arg(long)]
        bundles: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel)?;
    match cli.command {
        Command::Check {
            bundle,
            mode,
            base,
            scope,
            fail_fast,
        } => cmd_check(bundle, mode, base, scope, fail_fast, &cancel),
        Command::Implement { agent_args } => cmd_implement(&agent_args, &cancel),
        Command::Patch { task } => cmd_patch(&task, &cancel),
        Command::Skill {
            name,
            version,
            scope,
            base,
        } => cmd_skill(
            SkillRequest {
                name,
                version,
                base,
                scope: parse_scope(scope.as_deref()),
            },
            &cancel,
        ),
        Command::List { skills, bundles } => cmd_list(skills, bundles),
    }
}

/// Everything a command needs about the repository it runs in.
struct Workspace {
    root: PathBuf,
    git: Option<Git>,
    config: BonsaiConfig,
    resolver: AssetResolver,
    registry: Registry,
    prompts: PromptBuilder,
    outputs: OutputPaths,
}

impl Workspace {
    fn detect() -> Result<Self> {
        let cwd = Git::new(".");
        let (root, git) = if cwd.is_work_tree() {
            let root = cwd.show_toplevel().context("locate repository root")?;
            (root.clone(), Some(Git::new(root)))
        } else {
            (PathBuf::from("."), None)
        };
        debug!(root = %root.display(), git = git.is_some(), "workspace detected");

        let config = load_config(&root).context("load config")?;
        let resolver = AssetResolver::new(
            Some(root.clone()),
            config.skills.extra_dirs.clone(),
            user_config_dir(),
        );
        let registry = resolver.load_registry().context("load registry")?;
        let prompts = PromptBuilder::new(&root);
        let outputs = OutputPaths::new(config.output_dir(&root));
        Ok(Self {
            root,
            git,
            config,
            resolver,
            registry,
            prompts,
            outputs,
        })
    }

    fn vcs(&self) -> Option<&dyn VersionControl> {
        self.git.as_ref().map(|git| git as &dyn VersionControl)
    }

    fn claude(&self) -> ClaudeAgent {
        ClaudeAgent::new(&self.config.agents.claude_bin, &self.root)
    }
}

fn cmd_check(
    bundle: Option<String>,
    mode: Option<String>,
    base: Option<String>,
    scope: Option<String>,
    fail_fast: bool,
    cancel: &CancelToken,
) -> Result<i32> {
    let selection = SkillSelection::from_flags(bundle.as_deref(), mode.as_deref())?;
    let workspace = Workspace::detect()?;
    let agent = workspace.claude();
    let executor = AgentSkillExecutor::new(
        &agent,
        &workspace.resolver,
        &workspace.registry,
        &workspace.prompts,
    );
    let request = CheckRequest {
        selection,
        base,
        scope: parse_scope(scope.as_deref()),
        fail_fast,
    };

    let outcome = check::run_check(
        &request,
        &workspace.registry,
        &executor,
        workspace.vcs(),
        &workspace.root,
        &workspace.outputs,
        cancel,
        &mut |line: &str| println!("{line}"),
    )?;
    check::print_summary(&outcome, request.base.as_deref());

    Ok(if outcome.report.should_fail() {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_implement(agent_args: &[String], cancel: &CancelToken) -> Result<i32> {
    let workspace = Workspace::detect()?;
    let Some(git) = workspace.git.as_ref() else {
        bail!("implement must run inside a git repository");
    };
    let mut session = preflight(git, &workspace.config, &workspace.outputs)?;
    let agent = workspace.claude();
    let executor = AgentSkillExecutor::new(
        &agent,
        &workspace.resolver,
        &workspace.registry,
        &workspace.prompts,
    );
    let gate = GateLoop {
        vcs: git,
        session_agent: &agent,
        executor: &executor,
        registry: &workspace.registry,
        prompts: &workspace.prompts,
        confirm: &StdinConfirm,
        config: &workspace.config,
        outputs: &workspace.outputs,
        repo_root: &workspace.root,
        extra_args: agent_args,
    };
    let outcome = gate.run(&mut session, cancel)?;
    debug!(stop = ?outcome.stop, "gate finished");

    Ok(if outcome.stop.is_success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_patch(task: &str, cancel: &CancelToken) -> Result<i32> {
    let workspace = Workspace::detect()?;
    let architect = workspace.claude();
    let patcher = CodexAgent::new(&workspace.config.agents.codex_bin, &workspace.root);
    let checker = workspace.claude();
    let executor = AgentSkillExecutor::new(
        &checker,
        &workspace.resolver,
        &workspace.registry,
        &workspace.prompts,
    );
    let workflow = PatchWorkflow {
        vcs: workspace.vcs(),
        architect: &architect,
        patcher: &patcher,
        executor: &executor,
        registry: &workspace.registry,
        prompts: &workspace.prompts,
        confirm: &StdinConfirm,
        config: &workspace.config,
        outputs: &workspace.outputs,
        repo_root: &workspace.root,
    };
    let outcome = workflow.run(task, cancel)?;

    Ok(if outcome.is_success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_skill(request: SkillRequest, cancel: &CancelToken) -> Result<i32> {
    if request.name.is_empty() {
        bail!("usage: bonsai skill <skill-name> [--version vX] [--scope path1,path2] [--base <ref>]");
    }
    let workspace = Workspace::detect()?;
    let agent = workspace.claude();
    let executor = AgentSkillExecutor::new(
        &agent,
        &workspace.resolver,
        &workspace.registry,
        &workspace.prompts,
    );
    let output = skill_run::run_skill(
        &request,
        &workspace.registry,
        &executor,
        workspace.vcs(),
        &workspace.root,
        cancel,
    )?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("serialize skill output")?
    );

    Ok(if output.should_fail() {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_list(skills: bool, bundles: bool) -> Result<i32> {
    let workspace = Workspace::detect()?;
    print!("{}", list::render(&workspace.registry, skills, bundles));
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_check_flags() {
        let cli = Cli::parse_from([
            "bonsai", "check", "--mode", "API", "--base", "main", "--fail-fast",
        ]);
        let Command::Check {
            bundle,
            mode,
            base,
            fail_fast,
            ..
        } = cli.command
        else {
            panic!("expected check");
        };
        assert_eq!(bundle, None);
        assert_eq!(mode.as_deref(), Some("API"));
        assert_eq!(base.as_deref(), Some("main"));
        assert!(fail_fast);
    }

    #[test]
    fn implement_passes_agent_args_through() {
        let cli = Cli::parse_from(["bonsai", "implement", "--", "--model", "opus"]);
        let Command::Implement { agent_args } = cli.command else {
            panic!("expected implement");
        };
        assert_eq!(agent_args, vec!["--model", "opus"]);
    }

    #[test]
    fn parse_skill_flags() {
        let cli = Cli::parse_from([
            "bonsai", "skill", "layering", "--version", "v2", "--scope", "src/",
        ]);
        let Command::Skill {
            name,
            version,
            scope,
            base,
        } = cli.command
        else {
            panic!("expected skill");
        };
        assert_eq!(name, "layering");
        assert_eq!(version.as_deref(), Some("v2"));
        assert_eq!(scope.as_deref(), Some("src/"));
        assert_eq!(base, None);
    }

    #[test]
    fn parse_list_defaults() {
        let cli = Cli::parse_from(["bonsai", "list"]);
        assert!(matches!(
            cli.command,
            Command::List {
                skills: false,
                bundles: false
            }
        ));
    }
}
