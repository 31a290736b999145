//! Common error types for IMGN

use crate::observables::ObservableKey;
use thiserror::Error;

/// Common result type for IMGN operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the IMGN crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error (fatal at setup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two factories declare the same active parameter
    #[error("Duplicate parameter '{name}' declared by '{first}' and '{second}'")]
    DuplicateParameter {
        name: String,
        first: String,
        second: String,
    },

    /// Two factories produce fields under the same name
    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    /// Simulated observable has no matching measurement
    #[error("Observable {0} has no measurement")]
    UnknownObservable(ObservableKey),

    /// Length or shape mismatch
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Prior transform input outside the unit interval
    #[error("Unit-cube coordinate {index} is {value}, expected a value in [0, 1]")]
    OutOfUnitCube { index: usize, value: f64 },

    /// Total covariance failed its Cholesky factorization
    #[error("Covariance for {key} is not positive definite")]
    NonPositiveDefinite { key: ObservableKey },

    /// Non-finite numerical result
    #[error("Non-finite value: {0}")]
    NonFinite(String),

    /// Collective round failed on one or more ranks
    #[error("Collective error: {0}")]
    Collective(String),

    /// Simulator adapter failure
    #[error("Simulation error: {0}")]
    Simulation(String),

    /// Sampler adapter failure
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration file
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::DimensionMismatch`]
    pub fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}
