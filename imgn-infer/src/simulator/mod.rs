//! # Simulation Adapter
//!
//! A [`Simulator`] turns the fields of one evaluation into mock observables. The
//! pipeline asks it for one array per (observable key, realization) and validates
//! every array against the measurement it will be compared with.
//!
//! **Scratch storage:** Requests carry the per-rank scratch directory of the run.
//! Simulators that write intermediate files must keep them under that directory,
//! since several ranks run concurrently on the same filesystem.

pub mod test_simulator;

pub use test_simulator::TestSimulator;

use crate::fields::FieldSet;
use imgn_common::{Error, Measurements, ObservableKey, Result, Simulations};
use std::path::Path;
use tracing::debug;

/// One simulation call: a single observable for a single realization
#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    pub key: &'a ObservableKey,
    pub fields: &'a FieldSet,
    /// Index into each field's realizations
    pub realization_id: usize,
    /// Length the returned array must have (the measurement length)
    pub expected_len: usize,
    pub scratch_dir: &'a Path,
}

/// Simulation plug-in contract
pub trait Simulator: Send {
    fn name(&self) -> &str;

    /// Observable quantities this simulator can produce (matched against `key.quantity`)
    fn simulated_quantities(&self) -> Vec<String>;

    /// Field types that must be present in every evaluation
    fn required_field_types(&self) -> Vec<String>;

    /// Field types used when present
    fn optional_field_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the mock array for one key and realization
    fn simulate(&mut self, request: &SimulationRequest<'_>) -> Result<Vec<f64>>;
}

/// Measurement keys the simulator produces, in key order
pub fn simulated_keys(simulator: &dyn Simulator, measurements: &Measurements) -> Vec<ObservableKey> {
    let quantities = simulator.simulated_quantities();
    measurements
        .keys()
        .filter(|key| quantities.iter().any(|q| *q == key.quantity))
        .cloned()
        .collect()
}

/// Setup checks: required field types are produced and at least one key is simulated
pub fn validate_simulator(
    simulator: &dyn Simulator,
    produced_types: &[String],
    measurements: &Measurements,
) -> Result<()> {
    for required in simulator.required_field_types() {
        if !produced_types.contains(&required) {
            return Err(Error::Config(format!(
                "simulator '{}' requires a '{}' field but no factory produces one",
                simulator.name(),
                required
            )));
        }
    }

    if simulated_keys(simulator, measurements).is_empty() {
        return Err(Error::Config(format!(
            "simulator '{}' produces none of the measured observables",
            simulator.name()
        )));
    }
    Ok(())
}

/// Simulate every key × realization and validate array lengths
pub fn run_simulator(
    simulator: &mut dyn Simulator,
    keys: &[ObservableKey],
    measurements: &Measurements,
    fields: &FieldSet,
    ensemble_size: usize,
    scratch_dir: &Path,
) -> Result<Simulations> {
    let mut simulations = Simulations::new();

    for key in keys {
        let expected_len = measurements
            .get(key)
            .map(|m| m.len())
            .ok_or_else(|| Error::UnknownObservable(key.clone()))?;

        for realization_id in 0..ensemble_size {
            let request = SimulationRequest {
                key,
                fields,
                realization_id,
                expected_len,
                scratch_dir,
            };
            let output = simulator.simulate(&request)?;
            if output.len() != expected_len {
                return Err(Error::dimension(
                    format!("{} output for {}", simulator.name(), key),
                    expected_len,
                    output.len(),
                ));
            }
            simulations.push(key.clone(), output)?;
        }
    }

    debug!(
        "{}: simulated {} keys x {} realizations",
        simulator.name(),
        keys.len(),
        ensemble_size
    );
    Ok(simulations)
}
