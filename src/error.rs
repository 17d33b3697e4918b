//! Error types for randtest-e2e.

use thiserror::Error;

use crate::significance::Significance;

/// Errors raised by the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A generator could not produce the requested sample. Fatal for the case.
    #[error("generator {generator} failed: {reason}")]
    Generation { generator: String, reason: String },

    /// The external battery could not be run or produced no parseable verdict.
    #[error("{battery} subprocess error: {reason}")]
    Subprocess { battery: String, reason: String },

    /// Too few bytes for the statistic to mean anything.
    #[error("insufficient data: need at least {needed} bytes, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Verdicts never converged within the retry budget.
    #[error(
        "{generator}: {battery} and runstest disagree, {battery} passed {battery_verdict}, \
         runstest passed {runs_verdict}, significance: {significance} after {attempts} attempts \
         (expected random: {expected_random})"
    )]
    Disagreement {
        generator: String,
        battery: String,
        battery_verdict: bool,
        runs_verdict: bool,
        expected_random: bool,
        significance: Significance,
        attempts: u32,
    },

    #[error("significance must be strictly between 0 and 1, got {0}")]
    InvalidSignificance(f64),

    #[error("duplicate generator case: {0}")]
    DuplicateCase(String),

    #[error("unknown generator case: {0}")]
    UnknownCase(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
