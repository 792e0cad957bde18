//! Workflow state persistence.
//!
//! One JSON record at `.phasegate/workflow_state.json`, replaced atomically
//! (write-temp-then-rename). Missing or corrupt state loads as defaults —
//! the default phase is `idle`, so a damaged state file fails closed and
//! blocks protected writes until the agent re-establishes a phase.

use crate::core::error::GateError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const STATE_DIR: &str = ".phasegate";
pub const STATE_FILE: &str = "workflow_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Analysing,
    SpecWritten,
    SpecApproved,
    Implementing,
    Validating,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Idle,
        Phase::Analysing,
        Phase::SpecWritten,
        Phase::SpecApproved,
        Phase::Implementing,
        Phase::Validating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Analysing => "analysing",
            Phase::SpecWritten => "spec_written",
            Phase::SpecApproved => "spec_approved",
            Phase::Implementing => "implementing",
            Phase::Validating => "validating",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let valid = Phase::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                GateError::UsageError(format!("invalid phase '{}' (valid: {})", s, valid))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    LogVerified,
    UserVerified,
}

/// How `tests_written` evidence was established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub kind: ProvenanceKind,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkflowState {
    pub current_phase: Phase,
    pub workflow_type: Option<String>,
    pub feature_name: Option<String>,
    pub spec_file: Option<String>,
    pub spec_approved: bool,
    pub tests_written: bool,
    pub tests_written_provenance: Option<Provenance>,
    pub tests_passing: bool,
    pub implementation_done: bool,
    pub validated: bool,
    pub last_updated: Option<String>,
    pub phase_history: Vec<PhaseTransition>,
}

/// Optional fields an explicit phase transition may set.
#[derive(Debug, Clone, Default)]
pub struct PhaseSetOptions {
    pub workflow_type: Option<String>,
    pub feature_name: Option<String>,
    pub spec_file: Option<String>,
    pub approved: bool,
    pub implemented: bool,
    pub validated: bool,
}

/// Loads and persists the single WorkflowState record.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn at_root(root: &Path) -> Self {
        StateStore {
            path: root.join(STATE_DIR).join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state is the `idle` default: fail closed.
    pub fn load(&self) -> WorkflowState {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => WorkflowState::default(),
        }
    }

    /// Atomic replace: write a sibling temp file, then rename over the
    /// target so a crash never leaves a half-written record.
    pub fn save(&self, state: &mut WorkflowState) -> Result<(), GateError> {
        state.last_updated = Some(time::now_epoch_z());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(state)
            .map_err(|e| GateError::StateError(e.to_string()))?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Explicit agent-triggered transition. Any phase may follow any other;
    /// only the history entry and the analysing reset are enforced here.
    pub fn set_phase(
        &self,
        phase: Phase,
        opts: &PhaseSetOptions,
    ) -> Result<WorkflowState, GateError> {
        let mut state = self.load();

        state.phase_history.push(PhaseTransition {
            from: state.current_phase,
            to: phase,
            timestamp: time::now_epoch_z(),
        });
        state.current_phase = phase;

        // A fresh analysis must not inherit evidence from the previous
        // feature.
        if phase == Phase::Analysing {
            state.tests_written = false;
            state.tests_written_provenance = None;
            state.tests_passing = false;
            state.implementation_done = false;
            state.validated = false;
        }

        if let Some(t) = &opts.workflow_type {
            state.workflow_type = Some(t.clone());
        }
        if let Some(f) = &opts.feature_name {
            state.feature_name = Some(f.clone());
        }
        if let Some(s) = &opts.spec_file {
            state.spec_file = Some(s.clone());
        }
        if opts.approved {
            state.spec_approved = true;
        }
        if opts.implemented {
            state.implementation_done = true;
        }
        if opts.validated {
            state.validated = true;
        }

        self.save(&mut state)?;
        Ok(state)
    }

    /// Record verified TDD RED evidence. This is the only code path that
    /// sets `tests_written`.
    pub fn mark_tests_written(&self, provenance: Provenance) -> Result<WorkflowState, GateError> {
        let mut state = self.load();
        state.tests_written = true;
        state.tests_written_provenance = Some(provenance);
        self.save(&mut state)?;
        Ok(state)
    }

    pub fn mark_tests_passing(&self) -> Result<WorkflowState, GateError> {
        let mut state = self.load();
        state.tests_passing = true;
        self.save(&mut state)?;
        Ok(state)
    }

    /// Restore full defaults, including an empty phase history.
    pub fn reset(&self) -> Result<(), GateError> {
        let mut state = WorkflowState::default();
        self.save(&mut state)
    }
}
