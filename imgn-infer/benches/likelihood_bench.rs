//! Likelihood Evaluation Benchmark
//!
//! Measures the per-key cost of the ensemble likelihood, dominated by the OAS
//! covariance estimate and the O(p³) LU solve / log-determinant.
//!
//! Dimensions cover tabular observables up to a low-resolution sky map
//! (nside 8 → 768 pixels).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use imgn_common::{Covariances, Measurements, ObservableKey, Simulations};
use imgn_infer::likelihood::{oas_mean_cov, EnsembleLikelihood, Likelihood};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

const ENSEMBLE_SIZE: usize = 20;

fn ensemble(key: &ObservableKey, pixels: usize, seed: u64) -> Simulations {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    let mut sims = Simulations::new();
    for _ in 0..ENSEMBLE_SIZE {
        let realization = (0..pixels).map(|_| noise.sample(&mut rng)).collect();
        sims.push(key.clone(), realization).unwrap();
    }
    sims
}

fn bench_ensemble_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble_likelihood");
    group.sample_size(20);

    for nside in [1usize, 2, 4, 8] {
        let pixels = 12 * nside * nside;
        let key = ObservableKey::new("bench", "23", nside.to_string(), "I");
        let mut measurements = Measurements::new();
        measurements.insert(key.clone(), vec![0.0; pixels]).unwrap();
        let mut covariances = Covariances::new();
        covariances.insert_variance(key.clone(), 0.1, pixels).unwrap();

        let likelihood = EnsembleLikelihood::new(measurements, Some(covariances)).unwrap();
        let sims = ensemble(&key, pixels, pixels as u64);

        group.bench_with_input(BenchmarkId::new("evaluate", pixels), &sims, |b, sims| {
            b.iter(|| black_box(likelihood.evaluate(black_box(sims)).unwrap()));
        });

        let matrix = sims.ensemble_matrix(&key).unwrap();
        group.bench_with_input(BenchmarkId::new("oas", pixels), &matrix, |b, matrix| {
            b.iter(|| black_box(oas_mean_cov(black_box(matrix)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ensemble_likelihood);
criterion_main!(benches);
