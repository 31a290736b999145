//! Shared fixtures for imgn-infer integration tests
#![allow(dead_code)]

use imgn_common::{
    Covariances, Measurements, ObservableKey, Prior, Result, RunConfig, RunContext,
    SamplingControls, Simulations,
};
use imgn_infer::fields::{
    DummyFieldFactory, FieldFactory, Grid, StructuralLocation, TestFieldFactory,
};
use imgn_infer::likelihood::EnsembleLikelihood;
use imgn_infer::sampler::NestedSampler;
use imgn_infer::simulator::test_simulator::TEST_QUANTITY;
use imgn_infer::simulator::{SimulationRequest, Simulator, TestSimulator};
use imgn_infer::PipelineComponents;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::path::Path;

pub const PIXELS: usize = 4;
pub const GRID_POINTS: usize = 16;

pub fn key() -> ObservableKey {
    ObservableKey::tabular(TEST_QUANTITY, "x")
}

/// `n` realizations of `mean + N(0, sigma)` under `key`
pub fn gaussian_ensemble(
    key: &ObservableKey,
    mean: &[f64],
    n: usize,
    sigma: f64,
    seed: u64,
) -> Simulations {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    let mut sims = Simulations::new();
    for _ in 0..n {
        let realization = mean.iter().map(|m| m + noise.sample(&mut rng)).collect();
        sims.push(key.clone(), realization).unwrap();
    }
    sims
}

pub fn measurements(data: Vec<f64>) -> Measurements {
    let mut m = Measurements::new();
    m.insert(key(), data).unwrap();
    m
}

/// Demo measurement: block means of `2x + 1` on the test grid
pub fn demo_measurements() -> Measurements {
    let grid = Grid::linspace(0.0, 1.0, GRID_POINTS).unwrap();
    let per_block = GRID_POINTS / PIXELS;
    let data = (0..PIXELS)
        .map(|i| {
            (i * per_block..(i + 1) * per_block)
                .map(|j| 2.0 * grid.coordinate(j) + 1.0)
                .sum::<f64>()
                / per_block as f64
        })
        .collect();
    measurements(data)
}

pub fn test_field(range: (f64, f64), noise: f64) -> TestFieldFactory {
    let mut field = TestFieldFactory::new(Grid::linspace(0.0, 1.0, GRID_POINTS).unwrap());
    field.parameters_mut().set_default("b", noise).unwrap();
    field.set_prior("a", Prior::flat(range.0, range.1).unwrap()).unwrap();
    field.activate(&["a"]).unwrap();
    field
}

pub fn offset_field(range: (f64, f64)) -> DummyFieldFactory {
    let mut dummy = DummyFieldFactory::new("nuisance").with_parameter(
        "offset",
        0.0,
        StructuralLocation::new("test_simulator/offset", "value"),
    );
    dummy.set_prior("offset", Prior::flat(range.0, range.1).unwrap()).unwrap();
    dummy.activate(&["offset"]).unwrap();
    dummy
}

/// Test field (slope on [0, 10]) plus offset (on [0, 50]) through the test simulator
pub fn demo_components(noise: f64) -> PipelineComponents {
    demo_components_with(noise, Box::new(TestSimulator::new()))
}

pub fn demo_components_with(noise: f64, simulator: Box<dyn Simulator>) -> PipelineComponents {
    let mut covariances = Covariances::new();
    covariances.insert_variance(key(), 0.01, PIXELS).unwrap();

    PipelineComponents {
        factories: vec![
            Box::new(test_field((0.0, 10.0), noise)) as Box<dyn FieldFactory>,
            Box::new(offset_field((0.0, 50.0))),
        ],
        simulator,
        likelihood: Box::new(
            EnsembleLikelihood::new(demo_measurements(), Some(covariances)).unwrap(),
        ),
        sampler: Box::new(NestedSampler::new()),
    }
}

/// Rank context with scratch and output under `dir`
pub fn context(dir: &Path, rank: usize, seed: u64, ensemble_size: usize) -> RunContext {
    context_with(dir, rank, seed, ensemble_size, SamplingControls::default())
}

pub fn context_with(
    dir: &Path,
    rank: usize,
    seed: u64,
    ensemble_size: usize,
    sampling: SamplingControls,
) -> RunContext {
    RunConfig {
        master_seed: Some(seed),
        ensemble_size,
        scratch_dir: Some(dir.join("scratch")),
        output_dir: dir.join("out"),
        collective_timeout_secs: 30,
        sampling,
        ..RunConfig::default()
    }
    .into_context(rank)
    .unwrap()
}

/// Test simulator that fails on every call
pub struct FailingSimulator;

impl Simulator for FailingSimulator {
    fn name(&self) -> &str {
        "failing"
    }

    fn simulated_quantities(&self) -> Vec<String> {
        vec![TEST_QUANTITY.to_string()]
    }

    fn required_field_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn simulate(&mut self, _request: &SimulationRequest<'_>) -> Result<Vec<f64>> {
        Err(imgn_common::Error::Simulation("engine crashed".to_string()))
    }
}
