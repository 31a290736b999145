//! Dummy fields: parameter carriers without grid data
//!
//! A dummy field passes parameter values (and a list of simulator controls) to the
//! simulator through its descriptors. Used for nuisance parameters that shift a
//! simulation rather than build a field.

use super::{
    Checklist, Field, FieldFactory, ParameterDescriptors, ParameterTable, ParameterValues,
    StructuralLocation,
};
use imgn_common::{Error, Result};
use std::collections::BTreeMap;

pub const DUMMY_FIELD_TYPE: &str = "dummy";

#[derive(Debug, Clone)]
pub struct DummyFieldFactory {
    name: String,
    table: ParameterTable,
    checklist: Checklist,
    controls: BTreeMap<String, f64>,
}

impl DummyFieldFactory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: ParameterTable::new(),
            checklist: Checklist::new(),
            controls: BTreeMap::new(),
        }
    }

    /// Declare a parameter and where the simulator should apply it
    pub fn with_parameter(mut self, name: &str, default: f64, location: StructuralLocation) -> Self {
        self.table = self.table.parameter(name, default);
        self.checklist.insert(name.to_string(), location);
        self
    }

    /// Simulator setting forwarded verbatim with every produced field
    pub fn with_control(mut self, name: &str, value: f64) -> Self {
        self.controls.insert(name.to_string(), value);
        self
    }
}

impl FieldFactory for DummyFieldFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> &str {
        DUMMY_FIELD_TYPE
    }

    fn parameters(&self) -> &ParameterTable {
        &self.table
    }

    fn parameters_mut(&mut self) -> &mut ParameterTable {
        &mut self.table
    }

    fn checklist(&self) -> Checklist {
        self.checklist.clone()
    }

    fn produce(&self, active: &ParameterValues, ensemble_size: usize, seed: u64) -> Result<Field> {
        if ensemble_size == 0 {
            return Err(Error::Config("ensemble size must be at least 1".to_string()));
        }
        let values = self.table.resolve(active)?;

        Ok(Field {
            name: self.name.clone(),
            field_type: DUMMY_FIELD_TYPE.to_string(),
            ensemble_size,
            seed,
            realizations: Vec::new(),
            grid: None,
            descriptors: ParameterDescriptors::describe(&values, &self.checklist),
            controls: self.controls.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgn_common::Prior;

    #[test]
    fn test_dummy_carries_values_and_controls() {
        let mut factory = DummyFieldFactory::new("offsets")
            .with_parameter("offset", 0.0, StructuralLocation::new("sim/offset", "value"))
            .with_control("order", 2.0);
        factory.set_prior("offset", Prior::flat(-1.0, 1.0).unwrap()).unwrap();
        factory.activate(&["offset"]).unwrap();

        let values: ParameterValues = [("offset", 0.25)].into_iter().collect();
        let field = factory.produce(&values, 3, 11).unwrap();

        assert!(field.is_dummy());
        assert_eq!(field.ensemble_size, 3);
        assert_eq!(field.descriptors.value("offset"), Some(0.25));
        assert_eq!(field.descriptors.location("offset").unwrap().tag, "value");
        assert_eq!(field.controls.get("order"), Some(&2.0));
    }
}
