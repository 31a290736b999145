//! Observable keys and the containers the likelihood engine consumes
//!
//! **Purpose:** Measurements, covariances and simulated ensembles are all plain
//! key → array mappings. Keys iterate in a fixed (sorted) order so that every rank
//! walks the observables identically.
//!
//! **Sizes:** A key whose resolution is a HEALPix `nside` (an integer) expects
//! `12 * nside²` pixels. Any other resolution (e.g. `"tab"`) is tabular data and
//! the measurement itself defines the length.

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one observable: `(quantity, frequency, resolution, tag)`
///
/// Examples: `("sync", "23", "2", "I")`, `("fd", "nan", "2", "nan")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservableKey {
    pub quantity: String,
    pub frequency: String,
    pub resolution: String,
    pub tag: String,
}

impl ObservableKey {
    pub fn new(
        quantity: impl Into<String>,
        frequency: impl Into<String>,
        resolution: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            quantity: quantity.into(),
            frequency: frequency.into(),
            resolution: resolution.into(),
            tag: tag.into(),
        }
    }

    /// Tabular observable (length defined by the data)
    pub fn tabular(quantity: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(quantity, "nan", "tab", tag)
    }

    /// Pixel count implied by a HEALPix resolution, if the key is pixelized
    ///
    /// A numeric resolution whose pixel count `12·nside²` overflows is a
    /// configuration error.
    pub fn healpix_size(&self) -> Result<Option<usize>> {
        let Ok(nside) = self.resolution.parse::<usize>() else {
            return Ok(None);
        };
        nside
            .checked_mul(nside)
            .and_then(|n| n.checked_mul(12))
            .map(Some)
            .ok_or_else(|| {
                Error::Config(format!("{}: resolution {} is too large", self, self.resolution))
            })
    }
}

impl fmt::Display for ObservableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.quantity, self.frequency, self.resolution, self.tag
        )
    }
}

/// Fixed observed arrays, immutable once the pipeline is built
#[derive(Debug, Clone, Default)]
pub struct Measurements {
    data: BTreeMap<ObservableKey, DVector<f64>>,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observed array
    ///
    /// Pixelized keys must carry exactly `12 * nside²` entries.
    pub fn insert(&mut self, key: ObservableKey, data: Vec<f64>) -> Result<()> {
        if data.is_empty() {
            return Err(Error::Config(format!("measurement {} is empty", key)));
        }
        if let Some(expected) = key.healpix_size()? {
            if data.len() != expected {
                return Err(Error::dimension(
                    format!("measurement {}", key),
                    expected,
                    data.len(),
                ));
            }
        }
        self.data.insert(key, DVector::from_vec(data));
        Ok(())
    }

    pub fn get(&self, key: &ObservableKey) -> Option<&DVector<f64>> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &ObservableKey) -> bool {
        self.data.contains_key(key)
    }

    /// Keys in iteration order
    pub fn keys(&self) -> impl Iterator<Item = &ObservableKey> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObservableKey, &DVector<f64>)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Relative tolerance for the symmetry check on fixed covariances
pub const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Fixed observational covariance per key, added to the ensemble estimate
#[derive(Debug, Clone, Default)]
pub struct Covariances {
    data: BTreeMap<ObservableKey, DMatrix<f64>>,
}

impl Covariances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a full covariance matrix
    ///
    /// The matrix must be square with finite entries and symmetric to within
    /// `SYMMETRY_TOLERANCE` (relative to its largest entry). The stored matrix is
    /// the exact symmetric part `(A + Aᵀ)/2`.
    pub fn insert(&mut self, key: ObservableKey, matrix: DMatrix<f64>) -> Result<()> {
        if matrix.nrows() != matrix.ncols() {
            return Err(Error::dimension(
                format!("covariance {} (square)", key),
                matrix.nrows(),
                matrix.ncols(),
            ));
        }
        if let Some((i, j)) = (0..matrix.nrows())
            .flat_map(|i| (0..matrix.ncols()).map(move |j| (i, j)))
            .find(|&(i, j)| !matrix[(i, j)].is_finite())
        {
            return Err(Error::Config(format!(
                "covariance {}: entry ({}, {}) is {}",
                key,
                i,
                j,
                matrix[(i, j)]
            )));
        }

        let scale = matrix.amax().max(f64::MIN_POSITIVE);
        let asymmetry = (&matrix - matrix.transpose()).amax();
        if asymmetry > SYMMETRY_TOLERANCE * scale {
            return Err(Error::Config(format!(
                "covariance {} is not symmetric (max |A - Aᵀ| = {:e})",
                key, asymmetry
            )));
        }

        let symmetric = (&matrix + matrix.transpose()) * 0.5;
        self.data.insert(key, symmetric);
        Ok(())
    }

    /// Add a diagonal covariance with the same variance on every pixel
    pub fn insert_variance(&mut self, key: ObservableKey, variance: f64, size: usize) -> Result<()> {
        if !variance.is_finite() || variance < 0.0 {
            return Err(Error::Config(format!(
                "covariance {}: variance {} must be finite and non-negative",
                key, variance
            )));
        }
        self.insert(key, DMatrix::from_diagonal_element(size, size, variance))
    }

    pub fn get(&self, key: &ObservableKey) -> Option<&DMatrix<f64>> {
        self.data.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObservableKey> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ensemble of mock arrays per key for the current parameter point
///
/// Every realization of a key must have the same length.
#[derive(Debug, Clone, Default)]
pub struct Simulations {
    data: BTreeMap<ObservableKey, Vec<Vec<f64>>>,
}

impl Simulations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one realization for a key
    pub fn push(&mut self, key: ObservableKey, realization: Vec<f64>) -> Result<()> {
        let ensemble = self.data.entry(key.clone()).or_default();
        if let Some(first) = ensemble.first() {
            if first.len() != realization.len() {
                return Err(Error::dimension(
                    format!("realization of {}", key),
                    first.len(),
                    realization.len(),
                ));
            }
        }
        ensemble.push(realization);
        Ok(())
    }

    /// Append realizations stored back to back in `flat` (each `width` long)
    pub fn push_flat(&mut self, key: &ObservableKey, flat: &[f64], width: usize) -> Result<()> {
        if width == 0 || flat.len() % width != 0 {
            return Err(Error::dimension(
                format!("flattened ensemble of {}", key),
                width,
                flat.len(),
            ));
        }
        for chunk in flat.chunks_exact(width) {
            self.push(key.clone(), chunk.to_vec())?;
        }
        Ok(())
    }

    /// All realizations of a key concatenated in order
    pub fn flatten(&self, key: &ObservableKey) -> Vec<f64> {
        self.data
            .get(key)
            .map(|ensemble| ensemble.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Ensemble as an `n × p` matrix (one realization per row)
    pub fn ensemble_matrix(&self, key: &ObservableKey) -> Option<DMatrix<f64>> {
        let ensemble = self.data.get(key)?;
        let n = ensemble.len();
        let p = ensemble.first()?.len();
        Some(DMatrix::from_fn(n, p, |i, j| ensemble[i][j]))
    }

    pub fn realizations(&self, key: &ObservableKey) -> Option<&[Vec<f64>]> {
        self.data.get(key).map(|e| e.as_slice())
    }

    /// Number of realizations stored for a key
    pub fn ensemble_size(&self, key: &ObservableKey) -> usize {
        self.data.get(key).map_or(0, |e| e.len())
    }

    /// Length of a single realization of a key
    pub fn width(&self, key: &ObservableKey) -> usize {
        self.data
            .get(key)
            .and_then(|e| e.first())
            .map_or(0, |r| r.len())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObservableKey> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
