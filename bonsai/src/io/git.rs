//! Version-control adapter.
//!
//! Governance only reads repository state, so the trait exposes queries and
//! nothing that mutates the worktree.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Read-only repository queries used by profiling, preflight and skill input.
pub trait VersionControl {
    /// Current branch name. Errors on detached HEAD.
    fn current_branch(&self) -> Result<String>;
    fn diff_name_only(&self, base: &str) -> Result<Vec<String>>;
    fn diff_name_status(&self, base: &str) -> Result<Vec<String>>;
    fn diff(&self, base: &str) -> Result<String>;
    fn untracked_files(&self) -> Result<Vec<String>>;
    fn tracked_files(&self) -> Result<Vec<String>>;
    fn merge_base(&self, a: &str, b: &str) -> Result<String>;
    fn ref_exists(&self, reference: &str) -> bool;
    /// True inside a linked worktree (not the main checkout).
    fn is_linked_worktree(&self) -> Result<bool>;
    fn show_toplevel(&self) -> Result<PathBuf>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True when `workdir` is inside a git work tree.
    pub fn is_work_tree(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
            .unwrap_or(false)
    }

    fn run_lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let out = self.run_capture(args)?;
        Ok(non_empty_lines(&out))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all)]
    fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    fn diff_name_only(&self, base: &str) -> Result<Vec<String>> {
        self.run_lines(&["diff", "--name-only", base])
    }

    fn diff_name_status(&self, base: &str) -> Result<Vec<String>> {
        self.run_lines(&["diff", "--name-status", base])
    }

    fn diff(&self, base: &str) -> Result<String> {
        self.run_capture(&["diff", base])
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["ls-files", "--others", "--exclude-standard"])
    }

    fn tracked_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["ls-files"])
    }

    #[instrument(skip_all, fields(a = %a, b = %b))]
    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let out = self.run_capture(&["merge-base", a, b])?;
        Ok(out.trim().to_string())
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", reference])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn is_linked_worktree(&self) -> Result<bool> {
        let git_dir = self.run_capture(&["rev-parse", "--path-format=absolute", "--git-dir"])?;
        let common_dir =
            self.run_capture(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        Ok(git_dir.trim() != common_dir.trim())
    }

    fn show_toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }
}

/// Try each candidate in order and return the first successful `merge-base(candidate, HEAD)`.
///
/// Candidates that do not resolve are skipped. `None` means gating is impossible.
#[instrument(skip_all)]
pub fn detect_merge_base(vcs: &dyn VersionControl, candidates: &[String]) -> Option<String> {
    for candidate in candidates {
        if !vcs.ref_exists(candidate) {
            debug!(candidate = %candidate, "merge base candidate missing");
            continue;
        }
        match vcs.merge_base(candidate, "HEAD") {
            Ok(base) if !base.is_empty() => {
                debug!(candidate = %candidate, base = %base, "merge base detected");
                return Some(base);
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(candidate = %candidate, err = %err, "merge base lookup failed");
            }
        }
    }
    None
}

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("spawn git");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        fs::write(dir.join("README.md"), "hello\n").expect("write readme");
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[test]
    fn reads_branch_diff_and_untracked() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        init_repo(dir);
        git(dir, &["checkout", "-q", "-b", "feature"]);
        fs::write(dir.join("README.md"), "hello\nworld\n").expect("edit readme");
        fs::write(dir.join("new.txt"), "new\n").expect("write new");

        let repo = Git::new(dir);
        assert!(repo.is_work_tree());
        assert_eq!(repo.current_branch().expect("branch"), "feature");
        assert!(repo.ref_exists("main"));
        assert!(!repo.ref_exists("does-not-exist"));

        let base = detect_merge_base(&repo, &["missing".to_string(), "main".to_string()])
            .expect("merge base");
        assert_eq!(repo.diff_name_only(&base).expect("names"), vec!["README.md"]);
        assert_eq!(
            repo.diff_name_status(&base).expect("status"),
            vec!["M\tREADME.md"]
        );
        assert!(repo.diff(&base).expect("diff").contains("+world"));
        assert_eq!(repo.untracked_files().expect("untracked"), vec!["new.txt"]);
        assert_eq!(repo.tracked_files().expect("tracked"), vec!["README.md"]);
        assert!(!repo.is_linked_worktree().expect("worktree"));
    }

    #[test]
    fn no_candidates_means_no_merge_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_repo(temp.path());
        let repo = Git::new(temp.path());
        assert_eq!(detect_merge_base(&repo, &["origin/main".to_string()]), None);
    }

    #[test]
    fn outside_a_repo_is_not_a_work_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!Git::new(temp.path()).is_work_tree());
    }
}
