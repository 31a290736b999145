//! Active parameter space
//!
//! **Purpose:** Collect the active parameters of all factories into one ordered
//! coordinate system for the sampler, map unit-cube points through the priors, and
//! split physical vectors back into per-factory values.
//!
//! **Order:** Factories in pipeline order, parameters in each factory's declaration
//! order. The order is fixed once built.

use crate::fields::{FieldFactory, ParameterValues};
use imgn_common::{Error, Prior, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One coordinate of the sampler's space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveParameter {
    pub name: String,
    pub prior: Prior,
    /// Name of the owning factory
    pub factory: String,
    /// Position of the owning factory in the pipeline
    pub factory_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<ActiveParameter>,
    factory_count: usize,
}

/// Collect active parameters from all factories
///
/// Active names form the sampler's coordinate system and must be unique across
/// factories; a clash fails with `DuplicateParameter`. Fixed parameters stay
/// private to their factory (they are resolved inside `produce` and never routed
/// by name), so two factories may each keep a fixed parameter of the same name.
pub fn build_active_parameters(factories: &[Box<dyn FieldFactory>]) -> Result<ParameterSpace> {
    let mut parameters: Vec<ActiveParameter> = Vec::new();
    let mut owners: BTreeMap<String, String> = BTreeMap::new();

    for (factory_index, factory) in factories.iter().enumerate() {
        for spec in factory.parameters().active() {
            if let Some(first) = owners.get(&spec.name) {
                return Err(Error::DuplicateParameter {
                    name: spec.name.clone(),
                    first: first.clone(),
                    second: factory.name().to_string(),
                });
            }
            let prior = spec.prior.ok_or_else(|| {
                Error::Config(format!(
                    "active parameter '{}' of '{}' has no prior",
                    spec.name,
                    factory.name()
                ))
            })?;
            owners.insert(spec.name.clone(), factory.name().to_string());
            parameters.push(ActiveParameter {
                name: spec.name.clone(),
                prior,
                factory: factory.name().to_string(),
                factory_index,
            });
        }
    }

    Ok(ParameterSpace {
        parameters,
        factory_count: factories.len(),
    })
}

impl ParameterSpace {
    pub fn dimensionality(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[ActiveParameter] {
        &self.parameters
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Map a unit-cube point to physical values, one prior per coordinate
    pub fn prior_transform(&self, cube: &[f64]) -> Result<Vec<f64>> {
        if cube.len() != self.parameters.len() {
            return Err(Error::dimension(
                "unit cube point",
                self.parameters.len(),
                cube.len(),
            ));
        }

        cube.iter()
            .zip(&self.parameters)
            .enumerate()
            .map(|(index, (&u, parameter))| {
                parameter.prior.transform(u).map_err(|e| match e {
                    Error::OutOfUnitCube { value, .. } => Error::OutOfUnitCube { index, value },
                    other => other,
                })
            })
            .collect()
    }

    /// Split a physical vector into per-factory active values (pipeline order)
    pub fn partition(&self, physical: &[f64]) -> Result<Vec<ParameterValues>> {
        if physical.len() != self.parameters.len() {
            return Err(Error::dimension(
                "physical parameter vector",
                self.parameters.len(),
                physical.len(),
            ));
        }

        let mut values = vec![ParameterValues::new(); self.factory_count];
        for (parameter, &value) in self.parameters.iter().zip(physical) {
            values[parameter.factory_index].insert(&parameter.name, value);
        }
        Ok(values)
    }
}
