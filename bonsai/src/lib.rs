//! Diff-aware governance checks for AI-assisted changes.
//!
//! Skills are declared in a registry, grouped into bundles and wired to
//! governance modes. A change is profiled from its diff, classified into a
//! mode, and the mode's skills run through an agent that returns structured
//! findings. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (registry resolution, diff
//!   profiling, mode classification, output parsing, reports). No I/O.
//! - **[`io`]**: Side-effecting operations (git, agent processes, assets,
//!   configuration, artifacts). Behind traits where tests need doubles.
//!
//! Orchestration modules ([`orchestrator`], [`gate`], [`check`], [`patch`],
//! [`skill_run`], [`list`]) coordinate core logic with I/O to implement CLI
//! commands.

pub mod cancel;
pub mod check;
pub mod core;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod list;
pub mod logging;
pub mod orchestrator;
pub mod patch;
pub mod skill_run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
