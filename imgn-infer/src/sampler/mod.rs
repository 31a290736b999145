//! # Sampler Interface
//!
//! The pipeline exposes itself to a sampling algorithm as a [`SamplingProblem`]:
//! a dimensionality, a prior transform from the unit cube and a log-likelihood.
//! Any [`Sampler`] that drives this contract can be plugged in; [`NestedSampler`]
//! is the built-in one.
//!
//! **Lockstep:** With several ranks every `log_likelihood` call is a collective
//! round. A sampler must make the same number of calls on every rank and consult
//! `agree_to_stop` before ending the run.

pub mod nested;

pub use nested::NestedSampler;

use imgn_common::{Result, SamplingControls};
use serde::{Deserialize, Serialize};

/// What a sampler sees of the inference problem
pub trait SamplingProblem {
    fn dimensionality(&self) -> usize;

    /// Map a unit-cube point to physical parameter values
    fn prior_transform(&self, cube: &[f64]) -> Result<Vec<f64>>;

    /// Log-likelihood of physical parameter values
    fn log_likelihood(&mut self, physical: &[f64]) -> Result<f64>;

    /// Combine a local stop decision across ranks; every rank gets the same answer
    fn agree_to_stop(&mut self, local: bool) -> Result<bool> {
        Ok(local)
    }
}

/// Output of a sampling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerOutput {
    /// Equally weighted posterior samples (physical values)
    pub samples: Vec<Vec<f64>>,
    /// Log-likelihood of each posterior sample
    pub sample_log_likelihoods: Vec<f64>,
    pub log_evidence: f64,
    pub log_evidence_error: f64,
    /// Kullback-Leibler information of posterior relative to prior (nats)
    pub information: f64,
    pub iterations: usize,
    pub likelihood_calls: usize,
}

/// Sampling algorithm plug-in
pub trait Sampler: Send {
    fn name(&self) -> &str;

    fn run(
        &mut self,
        problem: &mut dyn SamplingProblem,
        controls: &SamplingControls,
    ) -> Result<SamplerOutput>;
}

/// `ln(eˣ + eʸ)` without overflow
pub fn logaddexp(x: f64, y: f64) -> f64 {
    if x == f64::NEG_INFINITY {
        return y;
    }
    if y == f64::NEG_INFINITY {
        return x;
    }
    let max = x.max(y);
    max + ((x - max).exp() + (y - max).exp()).ln()
}
