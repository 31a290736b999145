//! Linear scalar test field
//!
//! `f(x) = a·x + N(0, b)` sampled on a one-dimensional grid. Each realization draws
//! its noise from its own ChaCha8 stream, so realization `k` is the same array no
//! matter how large the ensemble is.

use super::{
    realization_seed, Checklist, Field, FieldFactory, Grid, ParameterDescriptors, ParameterTable,
    ParameterValues, StructuralLocation,
};
use imgn_common::{Error, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

pub const TEST_FIELD_TYPE: &str = "scalar";

/// Factory for the linear test field (parameters `a` slope, `b` noise level)
#[derive(Debug, Clone)]
pub struct TestFieldFactory {
    name: String,
    grid: Grid,
    table: ParameterTable,
}

impl TestFieldFactory {
    /// Factory on `grid` with defaults `a = 1`, `b = 0`
    pub fn new(grid: Grid) -> Self {
        Self {
            name: "test_field".to_string(),
            grid,
            table: ParameterTable::new().parameter("a", 1.0).parameter("b", 0.0),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn realize(&self, slope: f64, noise: &Normal<f64>, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..self.grid.points)
            .map(|i| slope * self.grid.coordinate(i) + noise.sample(&mut rng))
            .collect()
    }
}

impl FieldFactory for TestFieldFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> &str {
        TEST_FIELD_TYPE
    }

    fn parameters(&self) -> &ParameterTable {
        &self.table
    }

    fn parameters_mut(&mut self) -> &mut ParameterTable {
        &mut self.table
    }

    fn checklist(&self) -> Checklist {
        let mut checklist = Checklist::new();
        checklist.insert(
            "a".to_string(),
            StructuralLocation::new("test_field/slope", "value"),
        );
        checklist.insert(
            "b".to_string(),
            StructuralLocation::new("test_field/noise", "value"),
        );
        checklist
    }

    fn produce(&self, active: &ParameterValues, ensemble_size: usize, seed: u64) -> Result<Field> {
        if ensemble_size == 0 {
            return Err(Error::Config("ensemble size must be at least 1".to_string()));
        }

        let values = self.table.resolve(active)?;
        let slope = values.require("a")?;
        let sigma = values.require("b")?;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(Error::Config(format!(
                "{}: noise level b = {} must be finite and non-negative",
                self.name, sigma
            )));
        }
        let noise = Normal::new(0.0, sigma).map_err(|e| {
            Error::Config(format!("{}: invalid noise level b = {}: {}", self.name, sigma, e))
        })?;

        let realizations = (0..ensemble_size)
            .map(|k| self.realize(slope, &noise, realization_seed(seed, k)))
            .collect();

        Ok(Field {
            name: self.name.clone(),
            field_type: TEST_FIELD_TYPE.to_string(),
            ensemble_size,
            seed,
            realizations,
            grid: Some(self.grid),
            descriptors: ParameterDescriptors::describe(&values, &self.checklist()),
            controls: BTreeMap::new(),
        })
    }
}
