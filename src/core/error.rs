use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("State file error: {0}")]
    StateError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Evidence rejected: {0}")]
    EvidenceRejected(String),
    #[error("Git unavailable: {0}")]
    GitUnavailable(String),
    #[error("Test runner timed out after {0}s")]
    RunnerTimeout(u64),
    #[error("Usage error: {0}")]
    UsageError(String),
}
