//! Deterministic classification of a diff profile into a governance mode.

use serde::{Deserialize, Serialize};

use crate::core::profile::DiffProfile;
use crate::core::types::GovernanceMode;

/// Plan intent that forces PATCH mode when no higher tier applies.
pub const PATCH_INTENT: &str = "patch";

/// Size thresholds used by [`determine_mode`]. All comparisons are strict `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffThresholds {
    pub heavy_diff_lines: usize,
    pub heavy_files_changed: usize,
    pub patch_max_files: usize,
}

impl Default for DiffThresholds {
    fn default() -> Self {
        Self {
            heavy_diff_lines: 500,
            heavy_files_changed: 15,
            patch_max_files: 3,
        }
    }
}

/// Classify a change. First matching tier wins:
///
/// - `HEAVY`: oversized diff, too many files, or structural change touching a public surface.
/// - `STRUCTURAL`: more than one top-level directory, or any rename.
/// - `API`: any public surface path.
/// - `PATCH`: declared patch intent, or a small change without new files or renames.
/// - `NORMAL`: everything else.
pub fn determine_mode(
    profile: &DiffProfile,
    thresholds: &DiffThresholds,
    plan_intent: Option<&str>,
) -> GovernanceMode {
    let touches_public_surface = !profile.public_surface_paths.is_empty();

    if profile.diff_lines > thresholds.heavy_diff_lines
        || profile.files_changed > thresholds.heavy_files_changed
        || (profile.has_structural_change && touches_public_surface)
    {
        return GovernanceMode::Heavy;
    }
    if profile.top_level_dirs.len() > 1 || profile.renames > 0 {
        return GovernanceMode::Structural;
    }
    if touches_public_surface {
        return GovernanceMode::Api;
    }
    if plan_intent == Some(PATCH_INTENT)
        || (profile.files_changed <= thresholds.patch_max_files
            && profile.new_files == 0
            && profile.renames == 0)
    {
        return GovernanceMode::Patch;
    }
    GovernanceMode::Normal
}
