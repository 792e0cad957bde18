//! TDD RED evidence verification.
//!
//! A genuine RED test compiles against existing code and fails in its
//! assertions. A log showing only compile errors proves nothing about
//! behavior, so two disjoint pattern families are checked: genuine-failure
//! signatures and compile-only signatures. A log may legitimately contain
//! both (stale compiler noise next to a real assertion failure); genuine
//! failure wins in that case.

use crate::core::audit::{AuditLog, GateEvent};
use crate::core::error::GateError;
use crate::core::state::{Provenance, ProvenanceKind, StateStore};
use crate::core::time;
use regex::RegexBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    Log,
    Attestation,
}

/// Provenance-tagged verification outcome.
#[derive(Debug, Clone)]
pub struct ProofEvidence {
    pub kind: EvidenceKind,
    pub valid: bool,
    pub reason: String,
}

fn match_any(patterns: &[&str], text: &str) -> bool {
    patterns.iter().any(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .expect("built-in evidence pattern must compile")
            .is_match(text)
    })
}

/// Named test case failures, assertion failures, failing summary lines.
fn has_genuine_failure(text: &str) -> bool {
    match_any(
        &[
            r"Test Case .* failed",
            r"XCTAssert.*failed",
            r"expected .* but got",
            r"Executed \d+ tests?, with [1-9]\d* failure",
            r"\*\* TEST FAILED \*\*",
            r"FAILED.*\d+ test",
        ],
        text,
    )
}

/// Signatures of a build that never ran any test.
fn has_compile_only(text: &str) -> bool {
    match_any(
        &[
            r"error:.*has no member",
            r"error:.*cannot find .* in scope",
            r"error:.*undeclared type",
            r"Build Failed",
        ],
        text,
    )
}

/// Deterministic: the same log always yields the same verdict.
pub fn verify_log(text: &str) -> ProofEvidence {
    let genuine = has_genuine_failure(text);
    let compile_only = has_compile_only(text);

    if genuine {
        return ProofEvidence {
            kind: EvidenceKind::Log,
            valid: true,
            reason: "genuine test failures found".to_string(),
        };
    }
    if compile_only {
        return ProofEvidence {
            kind: EvidenceKind::Log,
            valid: false,
            reason: "compile error is not behavioral RED: tests must compile \
                     and fail in their assertions"
                .to_string(),
        };
    }
    ProofEvidence {
        kind: EvidenceKind::Log,
        valid: false,
        reason: "no evidence of failure: tests must be executed and fail".to_string(),
    }
}

/// Human attestation for environments without automated log capture.
/// Trust shifts to the operator; provenance records that shift.
pub fn verify_attestation() -> ProofEvidence {
    ProofEvidence {
        kind: EvidenceKind::Attestation,
        valid: true,
        reason: "user attested TDD RED manually".to_string(),
    }
}

/// Record a valid verification on the workflow state and audit trail.
/// Rejected evidence is returned as an error and never touches state.
pub fn record_tests_written(
    store: &StateStore,
    audit: &AuditLog,
    evidence: &ProofEvidence,
    raw_log: Option<&str>,
) -> Result<(), GateError> {
    if !evidence.valid {
        audit.append(&GateEvent::new(
            "proof.rejected",
            &evidence.reason,
            serde_json::Value::Null,
        ))?;
        return Err(GateError::EvidenceRejected(evidence.reason.clone()));
    }

    let kind = match evidence.kind {
        EvidenceKind::Log => ProvenanceKind::LogVerified,
        EvidenceKind::Attestation => ProvenanceKind::UserVerified,
    };

    let log_hash = match raw_log {
        Some(raw) => Some(audit.store_proof_log(raw)?),
        None => None,
    };

    store.mark_tests_written(Provenance {
        kind,
        timestamp: time::now_epoch_z(),
    })?;

    audit.append(&GateEvent::new(
        "proof.verified",
        &evidence.reason,
        serde_json::json!({
            "provenance": match kind {
                ProvenanceKind::LogVerified => "log_verified",
                ProvenanceKind::UserVerified => "user_verified",
            },
            "log_sha256": log_hash,
        }),
    ))?;
    Ok(())
}
