//! Oracle-Approximating Shrinkage (OAS) covariance estimation
//!
//! **Purpose:** Ensembles are often smaller than the data dimension, which makes the
//! plain sample covariance singular. OAS blends the sample covariance `S` with the
//! scaled identity `tr(S)/p · I`:
//!
//! ```text
//! Σ = (1 − ρ)·S + ρ·(tr(S)/p)·I
//!
//!        (1 − 2/p)·tr(S²) + tr(S)²
//! ρ = ──────────────────────────────────────   clamped to [0, 1]
//!     (n + 1 − 2/p)·(tr(S²) − tr(S)²/p)
//! ```
//!
//! with `S` the biased (1/n) sample covariance of `n` realizations of dimension `p`.
//! A zero denominator (S proportional to the identity, including S = 0) gives ρ = 1.

use imgn_common::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Ensemble mean plus shrunk covariance
#[derive(Debug, Clone)]
pub struct ShrinkageEstimate {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
    /// Shrinkage intensity ρ in [0, 1]
    pub shrinkage: f64,
    pub ensemble_size: usize,
}

/// Estimate mean and OAS covariance from an `n × p` ensemble (one realization per row)
pub fn oas_mean_cov(ensemble: &DMatrix<f64>) -> Result<ShrinkageEstimate> {
    let (n, p) = ensemble.shape();
    if n == 0 || p == 0 {
        return Err(Error::dimension("ensemble (realizations × pixels)", 1, n.min(p)));
    }

    let nf = n as f64;
    let pf = p as f64;

    let mean = DVector::from_fn(p, |j, _| ensemble.column(j).sum() / nf);

    let mut centered = ensemble.clone();
    for (j, mut column) in centered.column_iter_mut().enumerate() {
        column.add_scalar_mut(-mean[j]);
    }

    let sample = centered.tr_mul(&centered) / nf;
    // Exact symmetry regardless of the product kernel's summation order
    let sample = (&sample + sample.transpose()) * 0.5;

    let trs = sample.trace();
    let trs2 = sample.norm_squared();

    let numerator = (1.0 - 2.0 / pf) * trs2 + trs * trs;
    let denominator = (nf + 1.0 - 2.0 / pf) * (trs2 - trs * trs / pf);
    let shrinkage = if denominator == 0.0 {
        1.0
    } else {
        (numerator / denominator).clamp(0.0, 1.0)
    };

    let mut covariance = sample * (1.0 - shrinkage);
    for i in 0..p {
        covariance[(i, i)] += shrinkage * trs / pf;
    }

    Ok(ShrinkageEstimate {
        mean,
        covariance,
        shrinkage,
        ensemble_size: n,
    })
}
