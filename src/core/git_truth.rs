//! The git-truth gate.
//!
//! The workflow state file is writable by the same agent being gated, so
//! it cannot prove that a UI test was actually added. `git status` can:
//! it reflects only files the agent genuinely created or staged. This
//! gate re-derives the changed-file set from version control on every
//! decision and never trusts a cached set.

use crate::core::classify::UiRules;
use crate::core::decision::Decision;
use crate::core::error::GateError;
use crate::core::output;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

/// Walk up from `start` looking for a `.git` directory. `None` means no
/// repository context exists and enforcement is degraded.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

pub fn run_git(repo_root: &Path, args: &[&str]) -> Result<String, GateError> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .map_err(|e| GateError::GitUnavailable(format!("git failed to start: {}", e)))?;

    if !output.status.success() {
        return Err(GateError::GitUnavailable(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Modified/staged paths from `git status --porcelain -uno`. Untracked
/// files are excluded; renames report the new name.
pub fn changed_files(repo_root: &Path) -> Result<Vec<String>, GateError> {
    let raw = run_git(repo_root, &["status", "--porcelain", "-uno"])?;
    let mut files = Vec::new();
    for line in raw.lines() {
        if line.len() <= 3 {
            continue;
        }
        // Format: "XY path" or "XY old -> new" for renames.
        let path = line[3..].rsplit(" -> ").next().unwrap_or("").trim();
        if !path.is_empty() {
            files.push(path.to_string());
        }
    }
    Ok(files)
}

/// The changed-file set used for a single decision, recomputed fresh.
#[derive(Debug, Clone)]
pub struct GitChangeSet {
    paths: Vec<String>,
}

impl GitChangeSet {
    pub fn from_paths(paths: Vec<String>) -> Self {
        let mut seen = FxHashSet::default();
        let paths = paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();
        GitChangeSet { paths }
    }

    /// Derive from version control, including the in-flight target path
    /// (the file being written is not yet visible to git).
    pub fn derive(repo_root: &Path, in_flight: Option<&str>) -> Result<Self, GateError> {
        let mut paths = changed_files(repo_root)?;
        if let Some(target) = in_flight {
            paths.push(target.to_string());
        }
        Ok(GitChangeSet::from_paths(paths))
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Commit-side UI enforcement over a freshly derived change set.
pub struct GitTruthGate<'a> {
    rules: &'a UiRules,
}

impl<'a> GitTruthGate<'a> {
    pub fn new(rules: &'a UiRules) -> Self {
        GitTruthGate { rules }
    }

    pub fn ui_files(&self, changeset: &GitChangeSet) -> Vec<String> {
        changeset
            .paths()
            .iter()
            .filter(|p| self.rules.is_ui_file(p))
            .cloned()
            .collect()
    }

    pub fn ui_test_files(&self, changeset: &GitChangeSet) -> Vec<String> {
        changeset
            .paths()
            .iter()
            .filter(|p| self.rules.is_ui_test_file(p))
            .cloned()
            .collect()
    }

    /// UI tests are required iff the change set touches any UI file.
    pub fn required(&self, changeset: &GitChangeSet) -> bool {
        !self.ui_files(changeset).is_empty()
    }

    /// Block iff UI files changed and no UI-test file did.
    pub fn decide(&self, changeset: &GitChangeSet) -> Decision {
        let ui_files = self.ui_files(changeset);
        if ui_files.is_empty() {
            return Decision::Allow;
        }
        let ui_test_files = self.ui_test_files(changeset);
        if !ui_test_files.is_empty() {
            return Decision::Allow;
        }

        Decision::Block(format!(
            "GIT-TRUTH GATE: UI changes without UI tests\n\n\
             UI files changed:\n{}\n\n\
             No UI-test files changed under {}/.\n\n\
             This check is derived from `git status` and cannot be\n\
             satisfied by editing state files.\n\n\
             Required steps:\n  \
             1. write a UI test in {}/\n  \
             2. stage or commit that test\n  \
             3. then redo the UI change",
            output::bullet_list(&ui_files, 5),
            self.rules.uitest_dir(),
            self.rules.uitest_dir(),
        ))
    }
}
