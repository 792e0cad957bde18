//! Guard for direct runner invocations.
//!
//! UI test runs against an unprepared device environment fail with
//! infra noise that looks like test failures. Shell commands are watched
//! for two things: preparation commands refresh a readiness marker, and
//! direct UI-test runner invocations are blocked while the marker is
//! missing or stale.

use crate::core::decision::Decision;
use crate::core::error::GateError;
use crate::core::state::STATE_DIR;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const READY_FILE: &str = "runner_ready.json";

/// Readiness expires after ten minutes; a device prepared longer ago
/// than that may have been shut down or wedged since.
pub const MAX_PREP_AGE_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadyMarker {
    prepared_epoch: u64,
    command: String,
}

/// A UI-test invocation of the external runner.
pub fn is_ui_test_invocation(command: &str) -> bool {
    let has_runner = command.contains("xcodebuild");
    let has_test_action = command
        .split_whitespace()
        .any(|w| w == "test" || w == "test-without-building");
    has_runner && has_test_action && command.contains("UITests")
}

/// Commands that prepare the device environment.
pub fn is_preparation(command: &str) -> bool {
    if command.contains("prepare-simulator") {
        return true;
    }
    command.contains("simctl")
        && ["boot", "bootstatus", "shutdown", "erase"]
            .iter()
            .any(|verb| command.split_whitespace().any(|w| w == *verb))
}

pub struct RunnerGuard {
    path: PathBuf,
}

impl RunnerGuard {
    pub fn at_root(root: &Path) -> Self {
        RunnerGuard {
            path: root.join(STATE_DIR).join(READY_FILE),
        }
    }

    fn mark_ready(&self, command: &str) -> Result<(), GateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let marker = ReadyMarker {
            prepared_epoch: time::now_epoch_secs(),
            command: command.to_string(),
        };
        let body = serde_json::to_string_pretty(&marker)
            .map_err(|e| GateError::StateError(e.to_string()))?;
        fs::write(&self.path, body)?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return false;
        };
        let Ok(marker) = serde_json::from_str::<ReadyMarker>(&raw) else {
            return false;
        };
        time::now_epoch_secs().saturating_sub(marker.prepared_epoch) <= MAX_PREP_AGE_SECS
    }

    /// Observe one shell command: preparation refreshes the marker,
    /// unprepared UI-test invocations block, everything else passes.
    pub fn observe(&self, command: &str) -> Result<Decision, GateError> {
        if is_preparation(command) {
            self.mark_ready(command)?;
            return Ok(Decision::Allow);
        }

        if is_ui_test_invocation(command) && !self.is_ready() {
            return Ok(Decision::Block(format!(
                "RUNNER GUARD: device environment not prepared\n\n\
                 UI-test runner invocations require a freshly prepared\n\
                 device (within the last {} minutes).\n\n\
                 Prepare first:\n  \
                 1. xcrun simctl shutdown all\n  \
                 2. xcrun simctl boot <device-id>\n  \
                 3. xcrun simctl bootstatus <device-id>\n\n\
                 Then re-run the tests.",
                MAX_PREP_AGE_SECS / 60
            )));
        }

        Ok(Decision::Allow)
    }
}
