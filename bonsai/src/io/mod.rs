//! Side-effecting adapters: configuration, git, processes, agents, assets and artifacts.

pub mod agent;
pub mod artifacts;
pub mod assets;
pub mod config;
pub mod git;
pub mod process;
pub mod prompt;
pub mod repo;
pub mod skill;
pub mod terminal;
