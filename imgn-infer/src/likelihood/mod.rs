//! # Likelihood Engine
//!
//! Turns an ensemble of simulated observables plus fixed measurements into one
//! scalar log-likelihood.
//!
//! **Per observable key:**
//! 1. Ensemble mean and covariance (OAS shrinkage for [`EnsembleLikelihood`])
//! 2. Residual `measurement − mean`, non-finite entries zeroed and counted
//! 3. Total covariance (ensemble + fixed, when supplied)
//! 4. `tr(Σ) < 1e-28` → noiseless fallback `−½·rᵀr`
//! 5. Otherwise `−½·(rᵀΣ⁻¹r + log|2πΣ|)` via one Cholesky factorization;
//!    a covariance that is not positive definite is an error
//! 6. Contributions summed in key order
//!
//! **Determinism:** Keys are visited in sorted order and no step depends on which
//! rank runs it, so identical inputs give the identical scalar everywhere.

pub mod covariance;
pub mod ensemble;
pub mod linalg;
pub mod simple;

pub use covariance::{oas_mean_cov, ShrinkageEstimate};
pub use ensemble::EnsembleLikelihood;
pub use simple::SimpleLikelihood;

use imgn_common::{Covariances, Error, Measurements, ObservableKey, Result, Simulations};
use linalg::cholesky_solve;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::warn;

/// Below this covariance trace the comparison is treated as noiseless
pub const DEGENERATE_TRACE: f64 = 1e-28;

/// Per-key record of one likelihood evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDiagnostics {
    pub key: ObservableKey,
    pub dimension: usize,
    pub ensemble_size: usize,
    /// OAS intensity (None when the variant does not estimate a covariance)
    pub shrinkage: Option<f64>,
    pub covariance_trace: f64,
    /// Residual entries replaced by zero because they were NaN or infinite
    pub zeroed_entries: usize,
    /// True when the noiseless fallback term was used
    pub fallback: bool,
    pub contribution: f64,
}

/// Scalar log-likelihood plus per-key diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodReport {
    pub value: f64,
    pub keys: Vec<KeyDiagnostics>,
}

impl LikelihoodReport {
    /// Total residual entries zeroed across all keys
    pub fn zeroed_entries(&self) -> usize {
        self.keys.iter().map(|k| k.zeroed_entries).sum()
    }
}

/// Likelihood plug-in contract
pub trait Likelihood: Send {
    /// Short identifier used in logs and reports
    fn name(&self) -> &str;

    /// The fixed measurements this likelihood compares against
    fn measurements(&self) -> &Measurements;

    /// Evaluate with per-key diagnostics
    fn evaluate_detailed(&self, simulations: &Simulations) -> Result<LikelihoodReport>;

    /// Evaluate to a single scalar
    fn evaluate(&self, simulations: &Simulations) -> Result<f64> {
        Ok(self.evaluate_detailed(simulations)?.value)
    }
}

/// Every fixed covariance must belong to a measured key and match its length
pub(crate) fn check_covariances(
    measurements: &Measurements,
    covariances: Option<&Covariances>,
) -> Result<()> {
    let Some(covariances) = covariances else {
        return Ok(());
    };
    for key in covariances.keys() {
        let measured = measurements
            .get(key)
            .ok_or_else(|| Error::UnknownObservable(key.clone()))?;
        let size = covariances.get(key).map_or(0, |c| c.nrows());
        if size != measured.len() {
            return Err(Error::dimension(
                format!("covariance of {}", key),
                measured.len(),
                size,
            ));
        }
    }
    Ok(())
}

/// Every simulated key must have a measurement of the same length
pub(crate) fn check_simulation_keys(
    simulations: &Simulations,
    measurements: &Measurements,
) -> Result<()> {
    for key in simulations.keys() {
        let measured = measurements
            .get(key)
            .ok_or_else(|| Error::UnknownObservable(key.clone()))?;
        let width = simulations.width(key);
        if width != measured.len() {
            return Err(Error::dimension(
                format!("simulation of {}", key),
                measured.len(),
                width,
            ));
        }
    }
    Ok(())
}

/// `measurement − mean` with non-finite entries replaced by zero
///
/// Returns the residual and the number of entries zeroed. Zeroing can hide upstream
/// data problems, so every non-zero count is logged at warn level.
pub(crate) fn residual(
    key: &ObservableKey,
    measurement: &DVector<f64>,
    mean: &DVector<f64>,
) -> (DVector<f64>, usize) {
    let mut zeroed = 0;
    let diff = DVector::from_fn(measurement.len(), |i, _| {
        let value = measurement[i] - mean[i];
        if value.is_finite() {
            value
        } else {
            zeroed += 1;
            0.0
        }
    });

    if zeroed > 0 {
        warn!(
            "{}: zeroed {} non-finite residual entries of {}",
            key,
            zeroed,
            measurement.len()
        );
    }
    (diff, zeroed)
}

/// Gaussian log-likelihood contribution of one key
///
/// Returns the contribution and whether the noiseless fallback was used.
pub(crate) fn gaussian_term(
    key: &ObservableKey,
    covariance: DMatrix<f64>,
    diff: &DVector<f64>,
) -> Result<(f64, bool)> {
    let trace = covariance.trace();
    if trace < DEGENERATE_TRACE {
        warn!("{}: covariance trace {:e} below threshold, noiseless fallback", key, trace);
        return Ok((-0.5 * diff.dot(diff), true));
    }

    let dimension = diff.len() as f64;
    let factored = cholesky_solve(covariance, diff)
        .ok_or_else(|| Error::NonPositiveDefinite { key: key.clone() })?;
    let quadratic = diff.dot(&factored.solution);

    let log_norm = dimension * (2.0 * PI).ln() + factored.log_det;
    let term = -0.5 * (quadratic + log_norm);
    if !term.is_finite() {
        return Err(Error::NonFinite(format!("likelihood contribution of {}", key)));
    }
    Ok((term, false))
}
