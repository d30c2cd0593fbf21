//! Error types for the sweep engine.

use std::path::PathBuf;
use thiserror::Error;

use mpsweep_core::InventoryError;

/// Result type alias for run-level engine operations.
pub type SweepResult<T> = Result<T, SweepError>;

/// Failures that stop a run. Per-path and per-device problems are
/// reported as outcomes instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to acquire lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("cannot determine local host name; set [inventory].host")]
    UnknownHost,
}
