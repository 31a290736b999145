//! Parameter tables owned by field factories
//!
//! **Purpose:** A factory knows every parameter of its model. Fixed parameters keep
//! their default values and are never shown to the sampler; active parameters carry
//! a prior and are varied by the search.

use imgn_common::{Error, Prior, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One parameter of a field model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Value used while the parameter is fixed
    pub default: f64,
    pub prior: Option<Prior>,
    pub active: bool,
}

/// Ordered parameter list of one factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    specs: Vec<ParameterSpec>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fixed parameter with its default value (replaces an existing one)
    pub fn parameter(mut self, name: &str, default: f64) -> Self {
        let spec = ParameterSpec {
            name: name.to_string(),
            default,
            prior: None,
            active: false,
        };
        match self.specs.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn spec_mut(&mut self, name: &str) -> Result<&mut ParameterSpec> {
        self.specs
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::Config(format!("unknown parameter '{}'", name)))
    }

    /// Attach a prior to a declared parameter
    pub fn set_prior(&mut self, name: &str, prior: Prior) -> Result<()> {
        prior.validate()?;
        self.spec_mut(name)?.prior = Some(prior);
        Ok(())
    }

    /// Builder form of [`set_prior`](Self::set_prior)
    pub fn with_prior(mut self, name: &str, prior: Prior) -> Result<Self> {
        self.set_prior(name, prior)?;
        Ok(self)
    }

    /// Change the value a fixed parameter is baked in with
    pub fn set_default(&mut self, name: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::Config(format!(
                "default for '{}' must be finite, got {}",
                name, value
            )));
        }
        self.spec_mut(name)?.default = value;
        Ok(())
    }

    /// Make exactly `names` active; all other parameters become fixed
    ///
    /// Every activated parameter needs a prior.
    pub fn activate(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            let spec = self
                .spec(name)
                .ok_or_else(|| Error::Config(format!("unknown parameter '{}'", name)))?;
            if spec.prior.is_none() {
                return Err(Error::Config(format!(
                    "active parameter '{}' has no prior",
                    name
                )));
            }
        }
        for spec in &mut self.specs {
            spec.active = names.contains(&spec.name.as_str());
        }
        Ok(())
    }

    /// Active parameters in declaration order
    pub fn active(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter().filter(|s| s.active)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter()
    }

    /// Full parameter values: active values supplied, fixed ones from defaults
    pub fn resolve(&self, active: &ParameterValues) -> Result<ParameterValues> {
        for name in active.names() {
            match self.spec(name) {
                Some(spec) if spec.active => {}
                Some(_) => {
                    return Err(Error::Config(format!(
                        "parameter '{}' is fixed and cannot be set by the sampler",
                        name
                    )))
                }
                None => return Err(Error::Config(format!("unknown parameter '{}'", name))),
            }
        }

        let mut values = ParameterValues::new();
        for spec in &self.specs {
            let value = if spec.active {
                active.get(&spec.name).ok_or_else(|| {
                    Error::Config(format!("missing value for active parameter '{}'", spec.name))
                })?
            } else {
                spec.default
            };
            values.insert(&spec.name, value);
        }
        Ok(values)
    }
}

/// Parameter name → physical value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValues(BTreeMap<String, f64>);

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of a parameter the caller cannot work without
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| Error::Config(format!("parameter '{}' not set", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ParameterValues {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut values = ParameterValues::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}
