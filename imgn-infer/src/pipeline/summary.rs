//! Posterior summary statistics

use imgn_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Percentile of the lower one-sigma bound
pub const LOWER_PERCENTILE: f64 = 15.865;
/// Percentile of the upper one-sigma bound
pub const UPPER_PERCENTILE: f64 = 84.135;

/// Median with asymmetric one-sigma credible bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub median: f64,
    /// median − 15.865th percentile
    pub errlo: f64,
    /// 84.135th percentile − median
    pub errup: f64,
}

impl PosteriorSummary {
    pub fn from_samples(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::Sampler("no posterior samples to summarize".to_string()));
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let median = percentile(&sorted, 50.0);
        Ok(Self {
            median,
            errlo: median - percentile(&sorted, LOWER_PERCENTILE),
            errup: percentile(&sorted, UPPER_PERCENTILE) - median,
        })
    }
}

/// Linear-interpolated percentile of sorted data
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let position = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 50.0), 20.0);
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
        assert!((percentile(&sorted, 12.5) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_of_uniform_grid() {
        let values: Vec<f64> = (0..=100).rev().map(|i| i as f64).collect();
        let summary = PosteriorSummary::from_samples(&values).unwrap();
        assert_eq!(summary.median, 50.0);
        assert!((summary.errlo - (50.0 - LOWER_PERCENTILE)).abs() < 1e-9);
        assert!((summary.errup - (UPPER_PERCENTILE - 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_samples_rejected() {
        assert!(PosteriorSummary::from_samples(&[]).is_err());
    }
}
