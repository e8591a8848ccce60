//! Diff profile derivation from collected version-control output.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Raw version-control output for a change relative to a base.
#[derive(Debug, Clone, Default)]
pub struct DiffInputs {
    /// `git diff --name-only <base>` lines.
    pub names: Vec<String>,
    /// `git diff --name-status <base>` lines.
    pub name_status: Vec<String>,
    /// `git diff <base>` text.
    pub raw_diff: String,
    /// Untracked, non-ignored files. Treated as additions.
    pub untracked: Vec<String>,
}

/// Statistical summary of a change. Immutable once computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffProfile {
    pub files_changed: usize,
    pub new_files: usize,
    pub renames: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Line count of the raw diff text, headers included.
    pub diff_lines: usize,
    pub top_level_dirs: BTreeSet<String>,
    pub public_surface_paths: Vec<String>,
    pub has_structural_change: bool,
}

impl DiffProfile {
    pub fn from_inputs(
        inputs: &DiffInputs,
        public_surface_prefixes: &[String],
        structural_patterns: &[String],
    ) -> Self {
        let mut seen = BTreeSet::new();
        let mut diff_names = Vec::new();
        for name in inputs.names.iter().chain(&inputs.untracked) {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            diff_names.push(name.to_string());
        }

        let mut new_files = 0;
        let mut renames = 0;
        let synthetic = inputs.untracked.iter().map(|_| "A");
        for status in inputs
            .name_status
            .iter()
            .map(String::as_str)
            .filter(|line| !line.trim().is_empty())
            .chain(synthetic)
        {
            if status.starts_with('A') {
                new_files += 1;
            } else if status.starts_with('R') {
                renames += 1;
            }
        }

        let (lines_added, lines_removed) = count_changed_lines(&inputs.raw_diff);

        let top_level_dirs = diff_names.iter().map(|name| top_level(name)).collect();
        let public_surface_paths = diff_names
            .iter()
            .filter(|name| {
                public_surface_prefixes
                    .iter()
                    .any(|prefix| name.starts_with(prefix.as_str()))
            })
            .cloned()
            .collect();
        let has_structural_change = diff_names.iter().any(|name| {
            structural_patterns
                .iter()
                .any(|pattern| name.contains(pattern.as_str()))
        });

        Self {
            files_changed: diff_names.len(),
            new_files,
            renames,
            lines_added,
            lines_removed,
            diff_lines: count_diff_lines(&inputs.raw_diff),
            top_level_dirs,
            public_surface_paths,
            has_structural_change,
        }
    }
}

fn count_changed_lines(raw_diff: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in raw_diff.lines() {
        if line.starts_with('+') && !line.starts_with("++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("--") {
            removed += 1;
        }
    }
    (added, removed)
}

fn count_diff_lines(raw_diff: &str) -> usize {
    let trimmed = raw_diff.trim_end_matches('\n');
    if trimmed.is_empty() {
        return 0;
    }
    trimmed.split('\n').count()
}

fn top_level(path: &str) -> String {
    match path.split_once('/') {
        Some((head, _)) => head.to_string(),
        None => path.to_string(),
    }
}
