//! The commit-side gate.
//!
//! Intercepts commit-like actions (a `git commit` invocation or an
//! explicit validate), re-derives the change set from version control,
//! applies the git-truth UI rule, and then proves the UI tests actually
//! pass by running them. Whether a recent successful run may stand in
//! for a fresh one is a configured policy, not a hardcoded answer.

use crate::core::audit::AuditLog;
use crate::core::config::{ResolvedPolicy, ResultReusePolicy};
use crate::core::decision::Decision;
use crate::core::error::GateError;
use crate::core::git_truth::{GitChangeSet, GitTruthGate};
use crate::core::output;
use crate::core::state::STATE_DIR;
use crate::core::test_runner::{TestOrchestrator, TestRunner};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RUN_STATE_FILE: &str = "test_run_state.json";

/// Maximum age of a successful run that `reuse-recent-success` accepts.
pub const REUSE_WINDOW_SECS: u64 = 3600;

/// Outcome of the last orchestrated test run, persisted for the reuse
/// policy and for `status` reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub last_run_epoch: u64,
    pub success: bool,
    pub tested_files: Vec<String>,
    pub summary: String,
}

pub struct RunRecordStore {
    path: PathBuf,
}

impl RunRecordStore {
    pub fn at_root(root: &Path) -> Self {
        RunRecordStore {
            path: root.join(STATE_DIR).join(RUN_STATE_FILE),
        }
    }

    /// Missing or unreadable record means no prior run to reuse.
    pub fn load(&self) -> Option<TestRunRecord> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, record: &TestRunRecord) -> Result<(), GateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(record)
            .map_err(|e| GateError::StateError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn reuse_applies(record: &TestRunRecord, ui_files: &[String], now_epoch: u64) -> bool {
    if !record.success {
        return false;
    }
    if now_epoch.saturating_sub(record.last_run_epoch) > REUSE_WINDOW_SECS {
        return false;
    }
    // Every UI file in the current change set must have been covered.
    ui_files.iter().all(|f| record.tested_files.contains(f))
}

pub struct CommitGate<'a> {
    root: &'a Path,
    git_gate: GitTruthGate<'a>,
    policy: &'a ResolvedPolicy,
    records: RunRecordStore,
}

impl<'a> CommitGate<'a> {
    pub fn new(root: &'a Path, git_gate: GitTruthGate<'a>, policy: &'a ResolvedPolicy) -> Self {
        let records = RunRecordStore::at_root(root);
        CommitGate {
            root,
            git_gate,
            policy,
            records,
        }
    }

    /// Derive a fresh change set and evaluate. The runner is only invoked
    /// when UI tests are actually required and no reusable run applies.
    pub fn decide<R: TestRunner>(
        &self,
        orchestrator: &mut TestOrchestrator<R>,
        audit: &AuditLog,
    ) -> Result<Decision, GateError> {
        let changeset = GitChangeSet::derive(self.root, None)?;
        self.decide_with_changeset(&changeset, orchestrator, audit)
    }

    pub fn decide_with_changeset<R: TestRunner>(
        &self,
        changeset: &GitChangeSet,
        orchestrator: &mut TestOrchestrator<R>,
        audit: &AuditLog,
    ) -> Result<Decision, GateError> {
        if !self.git_gate.required(changeset) {
            return Ok(Decision::Allow);
        }

        // UI change without a UI test blocks before anything runs.
        let ui_decision = self.git_gate.decide(changeset);
        if !ui_decision.is_allow() {
            return Ok(ui_decision);
        }

        let ui_files = self.git_gate.ui_files(changeset);
        if self.policy.result_reuse == ResultReusePolicy::ReuseRecentSuccess
            && let Some(record) = self.records.load()
            && reuse_applies(&record, &ui_files, time::now_epoch_secs())
        {
            eprintln!(
                "reusing passing UI test run from {}s ago ({})",
                time::now_epoch_secs().saturating_sub(record.last_run_epoch),
                record.summary
            );
            return Ok(Decision::Allow);
        }

        let result = orchestrator.run(audit)?;
        self.records.save(&TestRunRecord {
            last_run_epoch: time::now_epoch_secs(),
            success: result.success,
            tested_files: changeset.paths().to_vec(),
            summary: result.summary.clone(),
        })?;

        if result.success {
            return Ok(Decision::Allow);
        }

        let failures = if result.failures.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nFailing cases:\n{}",
                output::bullet_list(&result.failures, 10)
            )
        };
        Ok(Decision::Block(format!(
            "COMMIT GATE: UI tests must pass before this action\n\n\
             {}{}\n\n\
             Fix the failures and retry. The test run is mandatory for\n\
             commits touching UI files.",
            result.summary, failures
        )))
    }
}
