//! Core modules for phasegate's decision pipeline.
//!
//! Everything that decides allow/block lives here: path rules, the
//! workflow state machine, TDD evidence verification, the git-truth
//! commit gate, and the test-run orchestrator.

pub mod action;
pub mod audit;
pub mod classify;
pub mod commit_gate;
pub mod config;
pub mod decision;
pub mod error;
pub mod evidence;
pub mod git_truth;
pub mod output;
pub mod phase_gate;
pub mod runner_guard;
pub mod state;
pub mod test_runner;
pub mod time;
