//! Error types for resynth.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Index was never assigned by a vocabulary.
    #[error("unknown vocabulary index {0}")]
    UnknownIndex(usize),

    /// Item was never assigned an index.
    #[error("item not in vocabulary: {0}")]
    UnknownItem(String),

    /// Field identifier has no model.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Dependency graph is not acyclic.
    #[error("dependency cycle detected at node {0}")]
    CycleDetected(String),

    /// A retained value is below the anonymity threshold.
    #[error("field {field}: value {value:?} has aggregate count {count} below k={k}")]
    NotKAnonymous {
        field: String,
        value: String,
        count: f64,
        k: f64,
    },

    /// The whole vocabulary carries less mass than k.
    #[error("k-anonymity unattainable: total mass {total} below k={k}")]
    KAnonymityUnattainable { total: f64, k: f64 },

    /// Weights do not sum to 1.
    #[error("distribution is not normalized (sum {0})")]
    NotNormalized(f64),

    /// No valid draw exists.
    #[error("cannot sample from an empty or all-zero distribution")]
    DegenerateDistribution,

    /// Weight is negative, NaN or infinite.
    #[error("weight must be finite and >= 0 (got {0})")]
    InvalidWeight(f64),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed prior row
    #[error("prior line {line}: {reason}")]
    Prior { line: usize, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unknown-item error from any debuggable item
    pub fn unknown_item(item: &impl std::fmt::Debug) -> Self {
        Error::UnknownItem(format!("{item:?}"))
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a prior parse error
    pub fn prior(line: usize, reason: impl Into<String>) -> Self {
        Error::Prior {
            line,
            reason: reason.into(),
        }
    }
}
