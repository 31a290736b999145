//! # Field Factories
//!
//! A [`FieldFactory`] turns parameter values and a seed into a [`Field`]: one
//! realization, or an ensemble of realizations that share hyperparameters and
//! differ only by seed.
//!
//! **Reproducibility:** `produce` is a pure function of its inputs. Realization `k`
//! always draws from `realization_seed(seed, k)`, so the same (values, seed) pair
//! gives bit-identical arrays on every call, every run and every rank.
//!
//! **Checklists:** A factory declares `parameter name → structural location`. The
//! produced field carries these as typed [`ParameterDescriptors`] so a simulator can
//! look up parameter identity without guessing at field internals.

pub mod dummy;
pub mod parameters;
pub mod test_field;

pub use dummy::DummyFieldFactory;
pub use parameters::{ParameterSpec, ParameterTable, ParameterValues};
pub use test_field::TestFieldFactory;

use imgn_common::seeds::derive_seed;
use imgn_common::{Error, Prior, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a simulator expects to find a parameter (e.g. a config path and tag)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralLocation {
    pub path: String,
    pub tag: String,
}

impl StructuralLocation {
    pub fn new(path: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tag: tag.into(),
        }
    }
}

/// Parameter name → structural location
pub type Checklist = BTreeMap<String, StructuralLocation>;

/// Value and location of one parameter as seen by a simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub value: f64,
    pub location: Option<StructuralLocation>,
}

/// Typed parameter metadata attached to a produced field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptors(BTreeMap<String, ParameterDescriptor>);

impl ParameterDescriptors {
    /// Pair every resolved value with its checklist location
    pub fn describe(values: &ParameterValues, checklist: &Checklist) -> Self {
        Self(
            values
                .iter()
                .map(|(name, value)| {
                    let descriptor = ParameterDescriptor {
                        value,
                        location: checklist.get(name).cloned(),
                    };
                    (name.to_string(), descriptor)
                })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.0.get(name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.0.get(name).map(|d| d.value)
    }

    pub fn location(&self, name: &str) -> Option<&StructuralLocation> {
        self.0.get(name).and_then(|d| d.location.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterDescriptor)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Regular one-dimensional grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub origin: f64,
    pub spacing: f64,
    pub points: usize,
}

impl Grid {
    /// `points` evenly spaced coordinates covering `[start, end]`
    pub fn linspace(start: f64, end: f64, points: usize) -> Result<Self> {
        if points < 2 || !(end > start) {
            return Err(Error::Config(format!(
                "grid needs at least 2 points over a non-empty interval, got {} over [{}, {}]",
                points, start, end
            )));
        }
        Ok(Self {
            origin: start,
            spacing: (end - start) / (points - 1) as f64,
            points,
        })
    }

    pub fn coordinate(&self, i: usize) -> f64 {
        self.origin + self.spacing * i as f64
    }

    pub fn coordinates(&self) -> Vec<f64> {
        (0..self.points).map(|i| self.coordinate(i)).collect()
    }
}

/// One produced field (possibly an ensemble of realizations)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: String,
    pub ensemble_size: usize,
    /// Base seed the realizations were drawn from
    pub seed: u64,
    /// One grid array per realization (empty for dummy fields)
    pub realizations: Vec<Vec<f64>>,
    pub grid: Option<Grid>,
    pub descriptors: ParameterDescriptors,
    /// Simulator settings published by dummy fields
    pub controls: BTreeMap<String, f64>,
}

impl Field {
    pub fn realization(&self, index: usize) -> Option<&[f64]> {
        self.realizations.get(index).map(|r| r.as_slice())
    }

    /// True when the field carries only parameters, not grid data
    pub fn is_dummy(&self) -> bool {
        self.realizations.is_empty()
    }
}

/// Seed of realization `index` within an ensemble drawn from `seed`
pub fn realization_seed(seed: u64, index: usize) -> u64 {
    derive_seed(seed, &[index as u64])
}

/// Field generation plug-in
pub trait FieldFactory: Send {
    /// Unique factory name
    fn name(&self) -> &str;

    /// Type of field produced (e.g. `"scalar"`, `"dummy"`); simulators look fields up by type
    fn field_type(&self) -> &str;

    fn parameters(&self) -> &ParameterTable;

    fn parameters_mut(&mut self) -> &mut ParameterTable;

    /// Structural locations of the factory's parameters
    fn checklist(&self) -> Checklist {
        Checklist::new()
    }

    /// Produce a field from active parameter values
    ///
    /// Fixed parameters are taken from the factory's defaults.
    fn produce(&self, active: &ParameterValues, ensemble_size: usize, seed: u64) -> Result<Field>;

    /// Attach a prior to one of this factory's parameters
    fn set_prior(&mut self, name: &str, prior: Prior) -> Result<()> {
        self.parameters_mut().set_prior(name, prior)
    }

    /// Select which parameters the sampler varies
    fn activate(&mut self, names: &[&str]) -> Result<()> {
        self.parameters_mut().activate(names)
    }
}

/// Fields of one evaluation keyed by field type
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: BTreeMap<String, Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field) -> Result<()> {
        if self.fields.contains_key(&field.field_type) {
            return Err(Error::DuplicateField(field.field_type));
        }
        self.fields.insert(field.field_type.clone(), field);
        Ok(())
    }

    pub fn field(&self, field_type: &str) -> Option<&Field> {
        self.fields.get(field_type)
    }

    /// Typed accessor for one parameter of one field
    pub fn descriptor(&self, field_type: &str, parameter: &str) -> Option<&ParameterDescriptor> {
        self.fields
            .get(field_type)
            .and_then(|f| f.descriptors.get(parameter))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_linspace() {
        let grid = Grid::linspace(0.0, 1.0, 5).unwrap();
        assert_eq!(grid.coordinates(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(Grid::linspace(0.0, 1.0, 1).is_err());
        assert!(Grid::linspace(1.0, 1.0, 4).is_err());
    }

    #[test]
    fn test_descriptors_carry_locations() {
        let values: ParameterValues = [("a", 2.0), ("b", 3.0)].into_iter().collect();
        let mut checklist = Checklist::new();
        checklist.insert("a".to_string(), StructuralLocation::new("model/slope", "value"));

        let descriptors = ParameterDescriptors::describe(&values, &checklist);
        assert_eq!(descriptors.value("a"), Some(2.0));
        assert_eq!(descriptors.location("a").unwrap().path, "model/slope");
        assert!(descriptors.location("b").is_none());
    }

    #[test]
    fn test_realization_seeds_differ() {
        assert_ne!(realization_seed(1, 0), realization_seed(1, 1));
        assert_eq!(realization_seed(1, 3), realization_seed(1, 3));
    }

    #[test]
    fn test_field_set_rejects_duplicate_type() {
        let field = Field {
            name: "x".to_string(),
            field_type: "scalar".to_string(),
            ensemble_size: 1,
            seed: 0,
            realizations: vec![vec![0.0]],
            grid: None,
            descriptors: ParameterDescriptors::default(),
            controls: BTreeMap::new(),
        };
        let mut set = FieldSet::new();
        set.insert(field.clone()).unwrap();
        assert!(matches!(set.insert(field), Err(Error::DuplicateField(_))));
    }
}
