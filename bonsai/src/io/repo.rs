//! Repository context gathered for skills and diff profiling.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::profile::{DiffInputs, DiffProfile};
use crate::io::config::RoutingConfig;
use crate::io::git::{Git, VersionControl};

/// Split a comma-separated scope into trimmed, non-empty prefixes.
pub fn parse_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect()
}

/// Repository file listing, filtered to `scope` prefixes when any are given.
///
/// Inside a git work tree this is tracked plus untracked files; elsewhere a
/// directory walk that skips `.git`.
pub fn repo_tree(root: &Path, scope: &[String]) -> Result<Vec<String>> {
    let git = Git::new(root);
    let files = if git.is_work_tree() {
        vcs_tree(&git)?
    } else {
        walk_tree(root)?
    };
    Ok(filter_scope(files, scope))
}

/// Tracked and untracked files, sorted and deduplicated.
pub fn vcs_tree(vcs: &dyn VersionControl) -> Result<Vec<String>> {
    let mut files = vcs.tracked_files().context("list tracked files")?;
    files.extend(vcs.untracked_files().context("list untracked files")?);
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_tree(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == ".git"));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    files.sort();
    Ok(files)
}

/// Keep files starting with any `scope` prefix; an empty scope keeps everything.
pub fn filter_scope(files: Vec<String>, scope: &[String]) -> Vec<String> {
    if scope.is_empty() {
        return files;
    }
    files
        .into_iter()
        .filter(|file| scope.iter().any(|prefix| file.starts_with(prefix.as_str())))
        .collect()
}

/// Raw diff against `base` plus synthetic new-file diffs for untracked files.
///
/// Version-control errors degrade to an empty diff section.
#[instrument(skip_all, fields(base = %base))]
pub fn build_diff_payload(vcs: &dyn VersionControl, root: &Path, base: &str) -> String {
    let mut payload = vcs.diff(base).unwrap_or_else(|err| {
        warn!(err = %err, "diff failed, continuing without tracked changes");
        String::new()
    });
    match vcs.untracked_files() {
        Ok(untracked) if !untracked.is_empty() => {
            payload.push_str(&synthetic_untracked_diff(root, &untracked));
        }
        Ok(_) => {}
        Err(err) => warn!(err = %err, "listing untracked files failed"),
    }
    payload
}

/// Unified `new file` diffs for regular untracked files under `root`.
pub fn synthetic_untracked_diff(root: &Path, files: &[String]) -> String {
    let mut buf = String::new();
    for file in files {
        let path = root.join(file);
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines: Vec<&str> = content.split('\n').collect();
        buf.push_str(&format!("\ndiff --git a/{file} b/{file}\n"));
        buf.push_str(&format!("new file mode {}\n", file_mode(&metadata)));
        buf.push_str("--- /dev/null\n");
        buf.push_str(&format!("+++ b/{file}\n"));
        buf.push_str(&format!("@@ -0,0 +1,{} @@\n", lines.len()));
        for line in lines {
            buf.push('+');
            buf.push_str(line);
            buf.push('\n');
        }
    }
    buf
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> &'static str {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        "100755"
    } else {
        "100644"
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> &'static str {
    "100644"
}

/// True when there are tracked changes against `base` or any untracked file.
pub fn has_changes(vcs: &dyn VersionControl, base: &str) -> Result<bool> {
    if !vcs.diff_name_only(base)?.is_empty() {
        return Ok(true);
    }
    Ok(!vcs.untracked_files()?.is_empty())
}

/// Collect diff inputs from version control and derive the profile.
#[instrument(skip_all, fields(base = %base))]
pub fn compute_profile(
    vcs: &dyn VersionControl,
    base: &str,
    routing: &RoutingConfig,
) -> Result<DiffProfile> {
    let inputs = DiffInputs {
        names: vcs.diff_name_only(base).context("diff --name-only")?,
        name_status: vcs.diff_name_status(base).context("diff --name-status")?,
        raw_diff: vcs.diff(base).context("diff")?,
        untracked: vcs.untracked_files().context("list untracked files")?,
    };
    let profile = DiffProfile::from_inputs(
        &inputs,
        &routing.public_surface_prefixes,
        &routing.structural_patterns,
    );
    debug!(
        files = profile.files_changed,
        diff_lines = profile.diff_lines,
        dirs = profile.top_level_dirs.len(),
        "computed diff profile"
    );
    Ok(profile)
}
