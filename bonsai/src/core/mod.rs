//! Pure governance logic. Nothing in here touches the filesystem, git or agents.

pub mod classifier;
pub mod output;
pub mod profile;
pub mod registry;
pub mod report;
pub mod types;
