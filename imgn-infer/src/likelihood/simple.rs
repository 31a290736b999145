//! Simple likelihood: ensemble mean against measurements using only the fixed
//! observational covariance (unit variance for keys without one)

use super::{check_covariances, check_simulation_keys, gaussian_term, residual};
use super::{KeyDiagnostics, Likelihood, LikelihoodReport};
use imgn_common::{Covariances, Measurements, Result, Simulations};
use nalgebra::DVector;

#[derive(Debug, Clone)]
pub struct SimpleLikelihood {
    measurements: Measurements,
    covariances: Option<Covariances>,
}

impl SimpleLikelihood {
    /// Every covariance must belong to a measured key and match its length
    pub fn new(measurements: Measurements, covariances: Option<Covariances>) -> Result<Self> {
        check_covariances(&measurements, covariances.as_ref())?;
        Ok(Self {
            measurements,
            covariances,
        })
    }
}

impl Likelihood for SimpleLikelihood {
    fn name(&self) -> &str {
        "simple"
    }

    fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    fn evaluate_detailed(&self, simulations: &Simulations) -> Result<LikelihoodReport> {
        check_simulation_keys(simulations, &self.measurements)?;

        let mut value = 0.0;
        let mut keys = Vec::with_capacity(simulations.len());

        for key in simulations.keys() {
            let (Some(realizations), Some(measurement)) =
                (simulations.realizations(key), self.measurements.get(key))
            else {
                continue;
            };

            let n = realizations.len() as f64;
            let mean = DVector::from_fn(measurement.len(), |i, _| {
                realizations.iter().map(|r| r[i]).sum::<f64>() / n
            });
            let (diff, zeroed_entries) = residual(key, measurement, &mean);

            let (contribution, fallback, covariance_trace) =
                match self.covariances.as_ref().and_then(|c| c.get(key)) {
                    Some(fixed) => {
                        let trace = fixed.trace();
                        let (term, fallback) = gaussian_term(key, fixed.clone(), &diff)?;
                        (term, fallback, trace)
                    }
                    None => (-0.5 * diff.dot(&diff), true, 0.0),
                };

            value += contribution;
            keys.push(KeyDiagnostics {
                key: key.clone(),
                dimension: diff.len(),
                ensemble_size: realizations.len(),
                shrinkage: None,
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

    #[test]
    fn test_uses_ensemble_mean() {
        let key = ObservableKey::tabular("t", "x");
        let mut measurements = Measurements::new();
        measurements.insert(key.clone(), vec![1.0, 1.0]).unwrap();
        let likelihood = SimpleLikelihood::new(measurements, None).unwrap();

        let mut sims = Simulations::new();
        sims.push(key.clone(), vec![0.0, 2.0]).unwrap();
        sims.push(key.clone(), vec![2.0, 0.0]).unwrap();

        // Mean equals the measurement, spread is ignored
        assert_eq!(likelihood.evaluate(&sims).unwrap(), 0.0);
    }

    #[test]
    fn test_covariance_size_mismatch_rejected() {
        let key = ObservableKey::tabular("t", "x");
        let mut measurements = Measurements::new();
        measurements.insert(key.clone(), vec![1.0, 1.0]).unwrap();
        let mut covariances = Covariances::new();
        covariances.insert_variance(key, 1.0, 3).unwrap();

        assert!(matches!(
            SimpleLikelihood::new(measurements, Some(covariances)),
            Err(Error::DimensionMismatch { expected: 2, actual: 3, .. })
        ));
    }
}
