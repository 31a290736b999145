//! Ensemble likelihood: OAS covariance from the simulated ensemble, optionally
//! added to a fixed observational covariance per key

use super::{check_covariances, check_simulation_keys, gaussian_term, oas_mean_cov, residual};
use super::{KeyDiagnostics, Likelihood, LikelihoodReport};
use imgn_common::{Covariances, Measurements, Result, Simulations};
use tracing::debug;

/// Likelihood combining ensemble (model) variance with observational covariance
#[derive(Debug, Clone)]
pub struct EnsembleLikelihood {
    measurements: Measurements,
    covariances: Option<Covariances>,
}

impl EnsembleLikelihood {
    /// Build from measurements and optional fixed covariances
    ///
    /// Every covariance must belong to a measured key and match its length.
    pub fn new(measurements: Measurements, covariances: Option<Covariances>) -> Result<Self> {
        check_covariances(&measurements, covariances.as_ref())?;

        Ok(Self {
            measurements,
            covariances,
        })
    }

    pub fn covariances(&self) -> Option<&Covariances> {
        self.covariances.as_ref()
    }
}

impl Likelihood for EnsembleLikelihood {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    fn evaluate_detailed(&self, simulations: &Simulations) -> Result<LikelihoodReport> {
        check_simulation_keys(simulations, &self.measurements)?;

        let mut value = 0.0;
        let mut keys = Vec::with_capacity(simulations.len());

        for key in simulations.keys() {
            let (Some(ensemble), Some(measurement)) =
                (simulations.ensemble_matrix(key), self.measurements.get(key))
            else {
                continue;
            };

            let estimate = oas_mean_cov(&ensemble)?;
            let (diff, zeroed_entries) = residual(key, measurement, &estimate.mean);

            let mut total = estimate.covariance;
            if let Some(fixed) = self.covariances.as_ref().and_then(|c| c.get(key)) {
                total += fixed;
            }
            let covariance_trace = total.trace();

            let (contribution, fallback) = gaussian_term(key, total, &diff)?;
            debug!(
                "{}: n={} p={} rho={:.4} trace={:e} term={}",
                key,
                estimate.ensemble_size,
                diff.len(),
                estimate.shrinkage,
                covariance_trace,
                contribution
            );

            value += contribution;
            keys.push(KeyDiagnostics {
                key: key.clone(),
                dimension: diff.len(),
                ensemble_size: estimate.ensemble_size,
                shrinkage: Some(estimate.shrinkage),
                covariance_trace,
                zeroed_entries,
                fallback,
                contribution,
            });
        }

        Ok(LikelihoodReport { value, keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgn_common::{Error, ObservableKey};

    fn key() -> ObservableKey {
        ObservableKey::tabular("test", "x")
    }

    fn measurements(data: Vec<f64>) -> Measurements {
        let mut m = Measurements::new();
        m.insert(key(), data).unwrap();
        m
    }

    #[test]
    fn test_perfect_match_is_zero() {
        let likelihood = EnsembleLikelihood::new(measurements(vec![3.0; 4]), None).unwrap();
        let mut sims = Simulations::new();
        sims.push(key(), vec![3.0; 4]).unwrap();

        let report = likelihood.evaluate_detailed(&sims).unwrap();
        assert_eq!(report.value, 0.0);
        assert!(report.keys[0].fallback);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let likelihood = EnsembleLikelihood::new(measurements(vec![1.0]), None).unwrap();
        let mut sims = Simulations::new();
        sims.push(ObservableKey::tabular("other", "y"), vec![1.0]).unwrap();

        assert!(matches!(likelihood.evaluate(&sims), Err(Error::UnknownObservable(_))));
    }

    #[test]
    fn test_wrong_simulation_length_rejected() {
        let likelihood = EnsembleLikelihood::new(measurements(vec![1.0, 2.0]), None).unwrap();
        let mut sims = Simulations::new();
        sims.push(key(), vec![1.0, 2.0, 3.0]).unwrap();

        assert!(matches!(likelihood.evaluate(&sims), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_covariance_for_unmeasured_key_rejected() {
        let mut covariances = Covariances::new();
        covariances
            .insert_variance(ObservableKey::tabular("other", "y"), 1.0, 2)
            .unwrap();
        let result = EnsembleLikelihood::new(measurements(vec![1.0, 2.0]), Some(covariances));
        assert!(matches!(result, Err(Error::UnknownObservable(_))));
    }

    #[test]
    fn test_fixed_covariance_only() {
        // Single realization: ensemble covariance is zero, only the fixed part remains
        let mut covariances = Covariances::new();
        covariances.insert_variance(key(), 2.0, 2).unwrap();
        let likelihood =
            EnsembleLikelihood::new(measurements(vec![1.0, 1.0]), Some(covariances)).unwrap();

        let mut sims = Simulations::new();
        sims.push(key(), vec![0.0, 0.0]).unwrap();

        // r = (1, 1), Σ = 2I: rᵀΣ⁻¹r = 1, log|2πΣ| = 2·ln(4π)
        let expected = -0.5 * (1.0 + 2.0 * (4.0 * std::f64::consts::PI).ln());
        let value = likelihood.evaluate(&sims).unwrap();
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn test_nan_measurement_is_zeroed_and_counted() {
        let likelihood =
            EnsembleLikelihood::new(measurements(vec![f64::NAN, 2.0, 5.0]), None).unwrap();
        let mut sims = Simulations::new();
        sims.push(key(), vec![0.0, 2.0, 5.0]).unwrap();

        let report = likelihood.evaluate_detailed(&sims).unwrap();
        assert_eq!(report.zeroed_entries(), 1);
        assert_eq!(report.value, 0.0);
    }
}
