//! # IMGN Common Library
//!
//! Shared code for the IMGN inference crates including:
//! - Error type and crate-wide `Result`
//! - Run configuration loading and the immutable per-rank run context
//! - Observable keys and the measurement / covariance / simulation containers
//! - Prior distributions and their unit-cube transforms
//! - Deterministic seed derivation

pub mod config;
pub mod error;
pub mod observables;
pub mod priors;
pub mod seeds;

pub use config::{RunConfig, RunContext, SamplingControls};
pub use error::{Error, Result};
pub use observables::{Covariances, Measurements, ObservableKey, Simulations};
pub use priors::Prior;
pub use seeds::SeedSequence;
