//! The write-side phase gate.
//!
//! Protected writes are only permitted while the workflow is in
//! `implementing`, and production code additionally requires verified
//! TDD RED evidence. Test files pass unconditionally inside
//! `implementing` — writing the failing test is the permitted first step.

use crate::core::classify::{self, Category, WorkflowRules};
use crate::core::decision::Decision;
use crate::core::state::{Phase, WorkflowState};

pub fn decide(state: &WorkflowState, rules: &WorkflowRules, rel_path: &str) -> Decision {
    match rules.classify(rel_path) {
        Category::AlwaysAllowed | Category::Exempt => return Decision::Allow,
        Category::Protected => {}
        // The UI categories belong to the commit-gate ruleset and never
        // come out of the workflow ruleset.
        Category::UiRequiresTest | Category::UiTestFile => return Decision::Allow,
    }

    if state.current_phase != Phase::Implementing {
        return Decision::Block(phase_block_message(state.current_phase, rel_path));
    }

    // RED authoring: test files are always writable while implementing.
    if classify::is_test_file(rel_path) {
        return Decision::Allow;
    }

    if !state.tests_written {
        return Decision::Block(tdd_block_message(rel_path));
    }

    Decision::Allow
}

fn phase_block_message(phase: Phase, rel_path: &str) -> String {
    let (headline, next_steps) = match phase {
        Phase::Idle => (
            "no active workflow",
            "Start a workflow first:\n  \
             phasegate phase set analysing --type bug --feature <name>   (bug fix)\n  \
             phasegate phase set analysing --type feature --feature <name>",
        ),
        Phase::Analysing => (
            "still in the analysis phase",
            "Finish the analysis (identify the root cause), then:\n  \
             1. phasegate phase set spec_written --spec <file>\n  \
             2. get the spec approved\n  \
             3. phasegate phase set implementing",
        ),
        Phase::SpecWritten => (
            "spec not yet approved",
            "The specification is waiting for approval.\n  \
             1. have the operator approve the spec\n  \
             2. phasegate phase set spec_approved --approved\n  \
             3. phasegate phase set implementing",
        ),
        Phase::SpecApproved => (
            "implementation phase not started",
            "The spec is approved but implementation has not begun.\n  \
             Run: phasegate phase set implementing",
        ),
        Phase::Validating => (
            "in the validation phase",
            "Implementation is complete and under validation.\n  \
             If fixes are needed: phasegate phase set implementing",
        ),
        // Implementing never reaches this function.
        Phase::Implementing => ("", ""),
    };

    format!(
        "PHASE GATE: {}\n\n\
         Code changes are only permitted in the 'implementing' phase.\n\
         Current phase: {}\n\
         File: {}\n\n\
         {}",
        headline, phase, rel_path, next_steps
    )
}

fn tdd_block_message(rel_path: &str) -> String {
    format!(
        "TDD GATE: write a failing test first\n\n\
         You are changing production code without a prior failing test.\n\
         File: {}\n\n\
         TDD workflow:\n  \
         1. write a test that checks the expected behavior\n  \
         2. run it — it must be RED (fail in its assertions)\n  \
         3. phasegate mark tests-written --proof <log-file>\n     \
         (or --user-verified if the log cannot be captured)\n  \
         4. only then change production code\n\n\
         No trial-and-error: analyse first, then test, then implement.",
        rel_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::WorkflowState;

    fn state(phase: Phase, tests_written: bool) -> WorkflowState {
        WorkflowState {
            current_phase: phase,
            tests_written,
            ..WorkflowState::default()
        }
    }

    #[test]
    fn test_idle_blocks_protected_write_naming_workflow_start() {
        let rules = WorkflowRules::default();
        let decision = decide(&state(Phase::Idle, false), &rules, "Views/Foo.swift");
        let reason = decision.reason().expect("should block");
        assert!(reason.contains("phasegate phase set analysing"));
    }

    #[test]
    fn test_always_allowed_passes_in_any_phase() {
        let rules = WorkflowRules::default();
        for phase in Phase::ALL {
            assert!(
                decide(&state(phase, false), &rules, "DOCS/notes.md").is_allow(),
                "phase {} should allow docs",
                phase
            );
        }
    }

    #[test]
    fn test_non_protected_passes() {
        let rules = WorkflowRules::default();
        assert!(decide(&state(Phase::Idle, false), &rules, "assets/icon.png").is_allow());
    }

    #[test]
    fn test_implementing_without_tests_blocks_production_code() {
        let rules = WorkflowRules::default();
        let decision = decide(
            &state(Phase::Implementing, false),
            &rules,
            "Views/Foo.swift",
        );
        let reason = decision.reason().expect("should block");
        assert!(reason.contains("failing test first"));
        assert!(reason.contains("mark tests-written"));
    }

    #[test]
    fn test_implementing_test_file_bypass() {
        let rules = WorkflowRules::default();
        assert!(
            decide(
                &state(Phase::Implementing, false),
                &rules,
                "FooTests/FooTests.swift"
            )
            .is_allow()
        );
    }

    #[test]
    fn test_implementing_with_tests_written_allows() {
        let rules = WorkflowRules::default();
        assert!(
            decide(&state(Phase::Implementing, true), &rules, "Views/Foo.swift").is_allow()
        );
    }

    #[test]
    fn test_allow_iff_implementing_and_test_or_evidence() {
        // The full truth table for a protected production path.
        let rules = WorkflowRules::default();
        let path = "Engine/Core.swift";
        for phase in Phase::ALL {
            for tests_written in [false, true] {
                let allowed = decide(&state(phase, tests_written), &rules, path).is_allow();
                let expected = phase == Phase::Implementing && tests_written;
                assert_eq!(allowed, expected, "phase={} tw={}", phase, tests_written);
            }
        }
    }

    #[test]
    fn test_each_blocked_phase_names_a_next_command() {
        let rules = WorkflowRules::default();
        for phase in [
            Phase::Idle,
            Phase::Analysing,
            Phase::SpecWritten,
            Phase::SpecApproved,
            Phase::Validating,
        ] {
            let decision = decide(&state(phase, false), &rules, "Views/Foo.swift");
            let reason = decision.reason().expect("should block");
            assert!(
                reason.contains("phasegate phase set"),
                "phase {} message must name the next command: {}",
                phase,
                reason
            );
        }
    }
}
