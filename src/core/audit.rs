//! Append-only audit trail.
//!
//! Every verification and test run appends one JSONL event to
//! `.phasegate/gate.events.jsonl`. The trail exists for post-hoc review
//! only; no gate decision ever reads it back.

use crate::core::error::GateError;
use crate::core::state::STATE_DIR;
use crate::core::time;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EVENTS_FILE: &str = "gate.events.jsonl";
pub const PROOF_LOG_FILE: &str = "tdd_proof.log";

#[derive(Debug, Clone, Serialize)]
pub struct GateEvent {
    pub ts: String,
    pub event_id: String,
    pub kind: String,
    pub summary: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl GateEvent {
    pub fn new(kind: &str, summary: &str, data: serde_json::Value) -> Self {
        GateEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            kind: kind.to_string(),
            summary: summary.to_string(),
            data,
        }
    }
}

pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn at_root(root: &Path) -> Self {
        AuditLog {
            dir: root.join(STATE_DIR),
        }
    }

    pub fn append(&self, event: &GateEvent) -> Result<(), GateError> {
        fs::create_dir_all(&self.dir)?;
        let line = serde_json::to_string(event)
            .map_err(|e| GateError::StateError(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(EVENTS_FILE))?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        Ok(())
    }

    /// Persist a raw proof log verbatim for later inspection and return
    /// its content hash.
    pub fn store_proof_log(&self, raw: &str) -> Result<String, GateError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(PROOF_LOG_FILE), raw)?;
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }
}
