//! Error types for tuning operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    #[error("Command timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("Access denied. Run as Administrator.")]
    PermissionDenied,

    #[error("Failed to parse output: {0}")]
    ParseError(String),

    #[error("Verification failed for {setting}: expected {expected}, found {actual}")]
    VerificationFailed {
        setting: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("No network adapters found")]
    NoAdapters,

    #[error("No backup found for {0}")]
    NoBackup(String),

    #[error("{0} cannot be reverted")]
    RevertUnsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TuneError>;
