//! Phasegate: a pre-mutation policy gate for coding agents
//!
//! Phasegate sits between an agent and a codebase and decides, before a
//! mutation happens, whether it is permitted by a test-first workflow:
//!
//! - **Phase gate**: protected source writes only in the `implementing`
//!   phase, and production code only after verified TDD RED evidence.
//! - **Evidence verification**: a test log must show behavioral failure,
//!   not compile errors, before `tests_written` can be set.
//! - **Git-truth gate**: commits touching UI files require a UI-test
//!   file in the change set, derived fresh from `git status` so the
//!   check cannot be satisfied by editing state files.
//! - **Test orchestration**: commit-like actions run the UI test suite
//!   with a hard timeout and a single reset-and-retry for infra flakes.
//!
//! The gate is wired in as a tool hook: the host pipes the intercepted
//! action to `phasegate hook` and interprets the exit code (0 allow,
//! 2 block with the reason on stderr, anything else internal error).
//!
//! ```bash
//! # Start a workflow and move through its phases
//! phasegate phase set analysing --type bug --feature login-crash
//! phasegate phase set implementing
//!
//! # Record verified RED evidence
//! phasegate mark tests-written --proof /tmp/test_run.log
//!
//! # Run the commit gate explicitly
//! phasegate validate
//! ```
//!
//! State lives under `.phasegate/` in the project root: the workflow
//! state record, the policy config, the audit trail, and the last test
//! run. Missing or corrupt state fails closed to the `idle` phase.

pub mod core;

use crate::core::action::{ActionKind, ActionRequest, parse_action};
use crate::core::audit::AuditLog;
use crate::core::classify::{UiRules, WorkflowRules, relative_to_root};
use crate::core::commit_gate::{CommitGate, RunRecordStore};
use crate::core::config::GateConfig;
use crate::core::decision::{Decision, EXIT_ALLOW, EXIT_BLOCK};
use crate::core::error::GateError;
use crate::core::evidence;
use crate::core::git_truth::{self, GitChangeSet, GitTruthGate};
use crate::core::phase_gate;
use crate::core::runner_guard::RunnerGuard;
use crate::core::state::{Phase, PhaseSetOptions, StateStore};
use crate::core::test_runner::{SubprocessRunner, TestOrchestrator};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(
    name = "phasegate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Pre-mutation policy gate enforcing a test-first workflow"
)]
struct Cli {
    /// Project root (defaults to the current working directory).
    #[clap(short, long, global = true)]
    dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one intercepted action read as JSON from stdin
    #[clap(name = "hook")]
    Hook,

    /// Workflow phase transitions
    #[clap(name = "phase")]
    Phase(PhaseCli),

    /// Record workflow evidence
    #[clap(name = "mark")]
    Mark(MarkCli),

    /// Run the commit gate explicitly (derive change set, run UI tests)
    #[clap(name = "validate", visible_alias = "v")]
    Validate,

    /// Show the current workflow state
    #[clap(name = "status", visible_alias = "s")]
    Status,

    /// Reset the workflow state to idle
    #[clap(name = "reset")]
    Reset,
}

#[derive(clap::Args, Debug)]
struct PhaseCli {
    #[clap(subcommand)]
    command: PhaseCommand,
}

#[derive(Subcommand, Debug)]
enum PhaseCommand {
    /// Transition to a phase (idle, analysing, spec_written, spec_approved,
    /// implementing, validating)
    Set {
        phase: String,
        /// Workflow type (bug, feature, refactor)
        #[clap(long = "type")]
        workflow_type: Option<String>,
        /// Feature or bug name being worked on
        #[clap(long)]
        feature: Option<String>,
        /// Path to the written specification
        #[clap(long)]
        spec: Option<String>,
        /// Record operator approval of the spec
        #[clap(long)]
        approved: bool,
        /// Record that the implementation is complete
        #[clap(long)]
        implemented: bool,
    },
}

#[derive(clap::Args, Debug)]
struct MarkCli {
    #[clap(subcommand)]
    command: MarkCommand,
}

#[derive(Subcommand, Debug)]
enum MarkCommand {
    /// Verify RED evidence and set tests_written
    TestsWritten {
        /// Test log file to verify
        #[clap(long)]
        proof: Option<PathBuf>,
        /// Operator attestation instead of a log
        #[clap(long)]
        user_verified: bool,
    },
    /// Record that tests are passing (GREEN reached)
    TestsPassing,
}

struct Gate {
    root: PathBuf,
    config: GateConfig,
    workflow_rules: WorkflowRules,
    ui_rules: UiRules,
}

impl Gate {
    fn open(dir: Option<PathBuf>) -> Result<Gate, GateError> {
        let root = match dir {
            Some(d) => d,
            None => std::env::current_dir()?,
        };
        let config = GateConfig::load(&root)?;
        let ui_rules = UiRules::from_config(&config.ui);
        Ok(Gate {
            root,
            config,
            workflow_rules: WorkflowRules::default(),
            ui_rules,
        })
    }

    fn store(&self) -> StateStore {
        StateStore::at_root(&self.root)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::at_root(&self.root)
    }

    fn orchestrator(&self) -> Result<TestOrchestrator<SubprocessRunner>, GateError> {
        let policy = self.config.resolve_policy()?;
        let runner = SubprocessRunner::new(
            self.config.runner.command.clone(),
            self.config.runner.args.clone(),
            self.root.clone(),
            self.config.runner.reset_steps(),
        );
        Ok(TestOrchestrator::new(
            runner,
            Duration::from_secs(self.config.runner.timeout_secs),
            policy.infra_flake,
        ))
    }

    fn evaluate(&self, request: &ActionRequest) -> Result<Decision, GateError> {
        match request.kind {
            ActionKind::Write | ActionKind::Edit => {
                let Some(target) = &request.target_path else {
                    return Ok(Decision::Allow);
                };
                self.evaluate_write(target)
            }
            ActionKind::Bash => {
                let Some(command) = &request.command_text else {
                    return Ok(Decision::Allow);
                };
                RunnerGuard::at_root(&self.root).observe(command)
            }
            ActionKind::Commit | ActionKind::Validate => self.evaluate_commit_like(),
            ActionKind::Other => Ok(Decision::Allow),
        }
    }

    fn evaluate_write(&self, target: &str) -> Result<Decision, GateError> {
        let rel = relative_to_root(target, &self.root);

        let state = self.store().load();
        let decision = phase_gate::decide(&state, &self.workflow_rules, &rel);
        if !decision.is_allow() {
            return Ok(decision);
        }

        // UI enforcement at write time: a UI file needs a UI test in the
        // change set, with the in-flight write counted.
        if !self.ui_rules.is_ui_file(&rel) {
            return Ok(Decision::Allow);
        }
        let Some(repo_root) = git_truth::find_repo_root(&self.root) else {
            eprintln!("warning: no git repository found, UI test check skipped");
            return Ok(Decision::Allow);
        };
        let changeset = GitChangeSet::derive(&repo_root, Some(&rel))?;
        Ok(GitTruthGate::new(&self.ui_rules).decide(&changeset))
    }

    fn evaluate_commit_like(&self) -> Result<Decision, GateError> {
        let Some(repo_root) = git_truth::find_repo_root(&self.root) else {
            eprintln!("warning: no git repository found, commit gate skipped");
            return Ok(Decision::Allow);
        };
        let policy = self.config.resolve_policy()?;
        let gate = CommitGate::new(&repo_root, GitTruthGate::new(&self.ui_rules), &policy);
        let mut orchestrator = self.orchestrator()?;
        gate.decide(&mut orchestrator, &self.audit())
    }
}

fn print_block(reason: &str) {
    eprintln!();
    eprintln!("{}", "■ ACTION BLOCKED".red().bold());
    eprintln!();
    eprintln!("{}", reason);
    eprintln!();
}

fn decide_to_exit(decision: Decision) -> i32 {
    match decision {
        Decision::Allow => EXIT_ALLOW,
        Decision::Block(reason) => {
            print_block(&reason);
            EXIT_BLOCK
        }
    }
}

fn run_hook(gate: &Gate) -> Result<i32, GateError> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let request = parse_action(&raw);
    let decision = gate.evaluate(&request)?;
    Ok(decide_to_exit(decision))
}

fn run_status(gate: &Gate) -> Result<i32, GateError> {
    let state = gate.store().load();
    let flag = |v: bool| {
        if v {
            "yes".green().to_string()
        } else {
            "no".yellow().to_string()
        }
    };

    println!("{} {}", "phase:".bold(), state.current_phase);
    if let Some(t) = &state.workflow_type {
        println!("{} {}", "type:".bold(), t);
    }
    if let Some(f) = &state.feature_name {
        println!("{} {}", "feature:".bold(), f);
    }
    if let Some(s) = &state.spec_file {
        println!("{} {}", "spec:".bold(), s);
    }
    println!("{} {}", "spec approved:".bold(), flag(state.spec_approved));
    println!("{} {}", "tests written:".bold(), flag(state.tests_written));
    if let Some(p) = &state.tests_written_provenance {
        println!("{} {:?} at {}", "  provenance:".bold(), p.kind, p.timestamp);
    }
    println!("{} {}", "tests passing:".bold(), flag(state.tests_passing));
    println!("{} {}", "validated:".bold(), flag(state.validated));

    // The run record is anchored at the repo root, like the commit gate
    // that writes it.
    let record_root =
        git_truth::find_repo_root(&gate.root).unwrap_or_else(|| gate.root.clone());
    if let Some(record) = RunRecordStore::at_root(&record_root).load() {
        println!(
            "{} {} ({} files, epoch {})",
            "last test run:".bold(),
            record.summary,
            record.tested_files.len(),
            record.last_run_epoch
        );
    }
    Ok(EXIT_ALLOW)
}

pub fn run() -> Result<i32, GateError> {
    let cli = Cli::parse();
    let gate = Gate::open(cli.dir)?;

    match cli.command {
        Command::Hook => run_hook(&gate),

        Command::Phase(phase_cli) => match phase_cli.command {
            PhaseCommand::Set {
                phase,
                workflow_type,
                feature,
                spec,
                approved,
                implemented,
            } => {
                let phase: Phase = phase.parse()?;
                let state = gate.store().set_phase(
                    phase,
                    &PhaseSetOptions {
                        workflow_type,
                        feature_name: feature,
                        spec_file: spec,
                        approved,
                        implemented,
                        validated: false,
                    },
                )?;
                println!(
                    "{} phase set to {}",
                    "✓".green(),
                    state.current_phase.to_string().bold()
                );
                Ok(EXIT_ALLOW)
            }
        },

        Command::Mark(mark_cli) => match mark_cli.command {
            MarkCommand::TestsWritten {
                proof,
                user_verified,
            } => {
                let (proof_evidence, raw_log) = match (&proof, user_verified) {
                    (Some(path), _) => {
                        let raw = std::fs::read_to_string(path)?;
                        (evidence::verify_log(&raw), Some(raw))
                    }
                    (None, true) => (evidence::verify_attestation(), None),
                    (None, false) => {
                        return Err(GateError::UsageError(
                            "provide --proof <log-file> or --user-verified".to_string(),
                        ));
                    }
                };
                match evidence::record_tests_written(
                    &gate.store(),
                    &gate.audit(),
                    &proof_evidence,
                    raw_log.as_deref(),
                ) {
                    Ok(()) => {
                        println!(
                            "{} tests_written recorded ({})",
                            "✓".green(),
                            proof_evidence.reason
                        );
                        Ok(EXIT_ALLOW)
                    }
                    Err(GateError::EvidenceRejected(reason)) => {
                        print_block(&format!("TDD EVIDENCE REJECTED\n\n{}", reason));
                        Ok(EXIT_BLOCK)
                    }
                    Err(e) => Err(e),
                }
            }
            MarkCommand::TestsPassing => {
                gate.store().mark_tests_passing()?;
                println!("{} tests_passing recorded", "✓".green());
                Ok(EXIT_ALLOW)
            }
        },

        Command::Validate => {
            let decision = gate.evaluate_commit_like()?;
            if decision.is_allow() {
                gate.store().set_phase(
                    Phase::Validating,
                    &PhaseSetOptions {
                        validated: true,
                        ..PhaseSetOptions::default()
                    },
                )?;
                println!("{} validation passed", "✓".green());
            }
            Ok(decide_to_exit(decision))
        }

        Command::Status => run_status(&gate),

        Command::Reset => {
            gate.store().reset()?;
            println!("{} workflow state reset to idle", "✓".green());
            Ok(EXIT_ALLOW)
        }
    }
}
