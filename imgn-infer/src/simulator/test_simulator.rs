//! Simulator for the linear test field
//!
//! Integrates the scalar field onto the observable's pixel count by averaging
//! contiguous blocks of grid points, then adds the `offset` parameter of an
//! optional dummy field.

use super::{SimulationRequest, Simulator};
use crate::fields::dummy::DUMMY_FIELD_TYPE;
use crate::fields::test_field::TEST_FIELD_TYPE;
use imgn_common::{Error, Result};

pub const TEST_QUANTITY: &str = "test";

#[derive(Debug, Clone, Default)]
pub struct TestSimulator;

impl TestSimulator {
    pub fn new() -> Self {
        Self
    }
}

/// Mean of `values` over `pixels` contiguous blocks of near-equal size
fn block_means(values: &[f64], pixels: usize) -> Vec<f64> {
    let n = values.len();
    (0..pixels)
        .map(|i| {
            let start = i * n / pixels;
            let end = (i + 1) * n / pixels;
            let block = &values[start..end];
            block.iter().sum::<f64>() / block.len() as f64
        })
        .collect()
}

impl Simulator for TestSimulator {
    fn name(&self) -> &str {
        "test_simulator"
    }

    fn simulated_quantities(&self) -> Vec<String> {
        vec![TEST_QUANTITY.to_string()]
    }

    fn required_field_types(&self) -> Vec<String> {
        vec![TEST_FIELD_TYPE.to_string()]
    }

    fn optional_field_types(&self) -> Vec<String> {
        vec![DUMMY_FIELD_TYPE.to_string()]
    }

    fn simulate(&mut self, request: &SimulationRequest<'_>) -> Result<Vec<f64>> {
        let field = request.fields.field(TEST_FIELD_TYPE).ok_or_else(|| {
            Error::Simulation(format!("no '{}' field in evaluation", TEST_FIELD_TYPE))
        })?;
        let values = field.realization(request.realization_id).ok_or_else(|| {
            Error::Simulation(format!(
                "field '{}' has no realization {}",
                field.name, request.realization_id
            ))
        })?;

        let pixels = request.expected_len;
        if pixels == 0 || values.len() < pixels {
            return Err(Error::Simulation(format!(
                "cannot integrate {} grid points onto {} pixels for {}",
                values.len(),
                pixels,
                request.key
            )));
        }

        let offset = request
            .fields
            .descriptor(DUMMY_FIELD_TYPE, "offset")
            .map_or(0.0, |d| d.value);

        Ok(block_means(values, pixels)
            .into_iter()
            .map(|v| v + offset)
            .collect())
    }
}
