//! Prior distributions and their unit-cube transforms
//!
//! **Purpose:** Nested samplers propose points in the unit hypercube. Each active
//! parameter's prior maps its coordinate `u ∈ [0, 1]` onto the parameter's support.
//!
//! **Boundary exactness:** Flat priors use `min·(1−u) + max·u` rather than
//! `min + u·(max−min)` so that `u = 0` and `u = 1` land exactly on `min` and `max`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Prior distribution of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prior {
    /// Uniform over `[min, max]`
    Flat { min: f64, max: f64 },

    /// Normal with optional truncation to `[min, max]`
    Gaussian {
        mean: f64,
        std: f64,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl Prior {
    /// Flat prior over `[min, max]`
    pub fn flat(min: f64, max: f64) -> Result<Self> {
        let prior = Prior::Flat { min, max };
        prior.validate()?;
        Ok(prior)
    }

    /// Untruncated Gaussian prior
    pub fn gaussian(mean: f64, std: f64) -> Result<Self> {
        let prior = Prior::Gaussian {
            mean,
            std,
            min: None,
            max: None,
        };
        prior.validate()?;
        Ok(prior)
    }

    /// Gaussian prior truncated to `[min, max]`
    pub fn truncated_gaussian(mean: f64, std: f64, min: f64, max: f64) -> Result<Self> {
        let prior = Prior::Gaussian {
            mean,
            std,
            min: Some(min),
            max: Some(max),
        };
        prior.validate()?;
        Ok(prior)
    }

    /// Check finiteness and ordering of the prior's parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Prior::Flat { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(Error::Config(format!(
                        "flat prior bounds must be finite, got [{}, {}]",
                        min, max
                    )));
                }
                if min >= max {
                    return Err(Error::Config(format!(
                        "flat prior requires min < max, got [{}, {}]",
                        min, max
                    )));
                }
            }
            Prior::Gaussian { mean, std, min, max } => {
                if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
                    return Err(Error::Config(format!(
                        "gaussian prior requires finite mean and std > 0, got mean={} std={}",
                        mean, std
                    )));
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo >= hi {
                        return Err(Error::Config(format!(
                            "gaussian truncation requires min < max, got [{}, {}]",
                            lo, hi
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Map a unit-interval coordinate onto the prior's support
    pub fn transform(&self, u: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&u) {
            return Err(Error::OutOfUnitCube { index: 0, value: u });
        }
        match *self {
            Prior::Flat { min, max } => Ok(min * (1.0 - u) + max * u),
            Prior::Gaussian { mean, std, min, max } => {
                if u == 0.0 {
                    if let Some(lo) = min {
                        return Ok(lo);
                    }
                }
                if u == 1.0 {
                    if let Some(hi) = max {
                        return Ok(hi);
                    }
                }

                // Open tails map the interval ends to the furthest finite quantile
                let u = if min.is_none() { u.max(f64::EPSILON) } else { u };
                let u = if max.is_none() { u.min(1.0 - f64::EPSILON) } else { u };

                let standard = Normal::new(0.0, 1.0)
                    .map_err(|e| Error::Config(format!("standard normal: {}", e)))?;
                let p_lo = min.map_or(0.0, |lo| standard.cdf((lo - mean) / std));
                let p_hi = max.map_or(1.0, |hi| standard.cdf((hi - mean) / std));
                let value = mean + std * standard.inverse_cdf(p_lo + u * (p_hi - p_lo));

                if !value.is_finite() {
                    return Err(Error::NonFinite(format!(
                        "gaussian prior transform of u={}",
                        u
                    )));
                }
                // Guard against round-off stepping outside the truncation window
                let value = min.map_or(value, |lo| value.max(lo));
                Ok(max.map_or(value, |hi| value.min(hi)))
            }
        }
    }

    /// Support of the prior (infinite for untruncated tails)
    pub fn support(&self) -> (f64, f64) {
        match *self {
            Prior::Flat { min, max } => (min, max),
            Prior::Gaussian { min, max, .. } => (
                min.unwrap_or(f64::NEG_INFINITY),
                max.unwrap_or(f64::INFINITY),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_boundaries_exact() {
        let prior = Prior::flat(0.1, 0.3).unwrap();
        assert_eq!(prior.transform(0.0).unwrap(), 0.1);
        assert_eq!(prior.transform(1.0).unwrap(), 0.3);

        let prior = Prior::flat(0.0, 10.0).unwrap();
        assert_eq!(prior.transform(0.0).unwrap(), 0.0);
        assert_eq!(prior.transform(1.0).unwrap(), 10.0);
        assert!((prior.transform(0.25).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_flat_rejects_inverted_bounds() {
        assert!(Prior::flat(1.0, 1.0).is_err());
        assert!(Prior::flat(2.0, 1.0).is_err());
        assert!(Prior::flat(f64::NEG_INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_gaussian_median_is_mean() {
        let prior = Prior::gaussian(3.0, 2.0).unwrap();
        assert!((prior.transform(0.5).unwrap() - 3.0).abs() < 1e-9);

        // One sigma above the mean sits at the 84.13th percentile
        let one_sigma = prior.transform(0.841_344_746).unwrap();
        assert!((one_sigma - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_truncated_gaussian_hits_bounds() {
        let prior = Prior::truncated_gaussian(0.0, 1.0, -1.0, 2.0).unwrap();
        assert_eq!(prior.transform(0.0).unwrap(), -1.0);
        assert_eq!(prior.transform(1.0).unwrap(), 2.0);

        let mid = prior.transform(0.3).unwrap();
        assert!(mid > -1.0 && mid < 2.0);
    }

    #[test]
    fn test_untruncated_gaussian_ends_are_finite() {
        let prior = Prior::gaussian(0.0, 1.0).unwrap();
        let lo = prior.transform(0.0).unwrap();
        let hi = prior.transform(1.0).unwrap();
        assert!(lo.is_finite() && hi.is_finite());
        assert!(lo < -5.0 && hi > 5.0);
        assert!(lo <= prior.transform(f64::EPSILON).unwrap());

        // One-sided truncation keeps its bound exact and clamps the open end
        let half = Prior::Gaussian { mean: 0.0, std: 1.0, min: Some(0.0), max: None };
        assert_eq!(half.transform(0.0).unwrap(), 0.0);
        assert!(half.transform(1.0).unwrap().is_finite());
    }

    #[test]
    fn test_prior_toml_shape() {
        let prior: Prior = toml::from_str("type = \"flat\"\nmin = 0.0\nmax = 50.0").unwrap();
        assert_eq!(prior, Prior::Flat { min: 0.0, max: 50.0 });
    }
}
