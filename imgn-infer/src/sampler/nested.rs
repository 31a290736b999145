//! Built-in nested sampler
//!
//! **Algorithm:** Classic nested sampling with deterministic shrinkage.
//! - `n_live` points drawn uniformly from the unit cube
//! - Each iteration removes the worst live point; prior volume shrinks by `e^(-1/n)`
//! - The replacement comes from a constrained random walk started at a random
//!   surviving point: exactly `walk_steps` likelihood calls, a step accepted only
//!   when it beats the removed likelihood, coordinates reflected into `[0, 1]`
//! - Stops when the remaining evidence `max(L_live)·X` changes `ln Z` by less
//!   than `dlogz` (agreed across ranks), or at `max_iterations`
//! - Evidence error `√(H/n)`; posterior by systematic resampling of the weighted
//!   dead and final live points
//!
//! The fixed number of likelihood calls per iteration keeps ranks in lockstep.

use super::{logaddexp, Sampler, SamplerOutput, SamplingProblem};
use imgn_common::seeds::entropy_seed;
use imgn_common::{Error, Result, SamplingControls};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_N_LIVE: usize = 100;
pub const DEFAULT_DLOGZ: f64 = 0.5;
pub const DEFAULT_WALK_STEPS: usize = 20;

const INITIAL_STEP: f64 = 0.1;
const MIN_STEP: f64 = 1e-9;
const MAX_STEP: f64 = 1.0;
const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
struct Point {
    cube: Vec<f64>,
    physical: Vec<f64>,
    log_l: f64,
}

/// A point removed from the live set with its posterior weight
#[derive(Debug, Clone)]
struct Weighted {
    physical: Vec<f64>,
    log_l: f64,
    log_weight: f64,
}

/// Running evidence and information (Skilling's update)
#[derive(Debug, Clone, Copy)]
struct Evidence {
    log_z: f64,
    information: f64,
}

impl Evidence {
    fn new() -> Self {
        Self {
            log_z: f64::NEG_INFINITY,
            information: 0.0,
        }
    }

    fn add(&mut self, log_weight: f64, log_l: f64) {
        if log_weight == f64::NEG_INFINITY {
            return;
        }
        let log_z_new = logaddexp(self.log_z, log_weight);
        let from_new = (log_weight - log_z_new).exp() * log_l;
        let from_old = if self.log_z == f64::NEG_INFINITY {
            0.0
        } else {
            (self.log_z - log_z_new).exp() * (self.information + self.log_z)
        };
        self.information = from_new + from_old - log_z_new;
        self.log_z = log_z_new;
    }
}

#[derive(Serialize)]
struct Stats<'a> {
    sampler: &'a str,
    log_evidence: f64,
    log_evidence_error: f64,
    information: f64,
    iterations: usize,
    likelihood_calls: usize,
    n_live_points: usize,
    posterior_samples: usize,
}

/// Nested sampler with random-walk replacement
#[derive(Debug, Clone, Default)]
pub struct NestedSampler;

impl NestedSampler {
    pub fn new() -> Self {
        Self
    }
}

/// Reflect a coordinate back into `[0, 1]`
fn reflect(mut x: f64) -> f64 {
    x = x.rem_euclid(2.0);
    if x > 1.0 {
        2.0 - x
    } else {
        x
    }
}

/// `basename` with `suffix` appended to its final component
fn with_suffix(basename: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = basename.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Draw `count` equally weighted indices proportional to `weights` (normalized)
fn systematic_resample(weights: &[f64], count: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let offset: f64 = rng.gen::<f64>() / count as f64;
    let mut indices = Vec::with_capacity(count);
    let mut cumulative = 0.0;
    let mut j = 0;
    for i in 0..count {
        let target = offset + i as f64 / count as f64;
        while j + 1 < weights.len() && cumulative + weights[j] < target {
            cumulative += weights[j];
            j += 1;
        }
        indices.push(j);
    }
    indices
}

struct Run<'p> {
    problem: &'p mut dyn SamplingProblem,
    rng: ChaCha8Rng,
    dimension: usize,
    likelihood_calls: usize,
}

impl<'p> Run<'p> {
    fn evaluate(&mut self, cube: Vec<f64>) -> Result<Point> {
        let physical = self.problem.prior_transform(&cube)?;
        let log_l = self.problem.log_likelihood(&physical)?;
        self.likelihood_calls += 1;
        if log_l.is_nan() {
            return Err(Error::Sampler(format!(
                "log-likelihood is NaN at {:?}",
                physical
            )));
        }
        Ok(Point {
            cube,
            physical,
            log_l,
        })
    }

    fn uniform_point(&mut self) -> Result<Point> {
        let cube: Vec<f64> = (0..self.dimension).map(|_| self.rng.gen::<f64>()).collect();
        self.evaluate(cube)
    }

    /// Exactly `steps` likelihood calls; returns the last accepted point
    fn constrained_walk(
        &mut self,
        start: Point,
        threshold: f64,
        steps: usize,
        step_size: &mut f64,
    ) -> Result<Point> {
        let mut current = start;
        let mut accepted = 0usize;
        let mut rejected = 0usize;

        for _ in 0..steps {
            let cube: Vec<f64> = current
                .cube
                .iter()
                .map(|&u| {
                    let z: f64 = self.rng.sample(StandardNormal);
                    reflect(u + *step_size * z)
                })
                .collect();
            let candidate = self.evaluate(cube)?;
            if candidate.log_l > threshold {
                current = candidate;
                accepted += 1;
            } else {
                rejected += 1;
            }

            if accepted > rejected {
                *step_size *= (1.0 / accepted as f64).exp();
            } else if rejected > accepted {
                *step_size /= (1.0 / rejected as f64).exp();
            }
            *step_size = step_size.clamp(MIN_STEP, MAX_STEP);
        }
        Ok(current)
    }
}

impl Sampler for NestedSampler {
    fn name(&self) -> &str {
        "nested"
    }

    fn run(
        &mut self,
        problem: &mut dyn SamplingProblem,
        controls: &SamplingControls,
    ) -> Result<SamplerOutput> {
        controls.validate()?;
        let n_live = controls.n_live_points.unwrap_or(DEFAULT_N_LIVE);
        let dlogz = controls.dlogz.unwrap_or(DEFAULT_DLOGZ);
        let walk_steps = controls.walk_steps.unwrap_or(DEFAULT_WALK_STEPS);
        let verbose = controls.verbose.unwrap_or(false);
        let seed = controls.seed.unwrap_or_else(entropy_seed);

        let dimension = problem.dimensionality();
        if dimension == 0 {
            return Err(Error::Sampler("problem has no active parameters".to_string()));
        }

        debug!(
            "nested sampler: d={} n_live={} walk_steps={} dlogz={} seed={}",
            dimension, n_live, walk_steps, dlogz, seed
        );

        let mut run = Run {
            problem,
            rng: ChaCha8Rng::seed_from_u64(seed),
            dimension,
            likelihood_calls: 0,
        };

        let mut live = Vec::with_capacity(n_live);
        for _ in 0..n_live {
            live.push(run.uniform_point()?);
        }

        let shrink = -1.0 / n_live as f64;
        let log_width_factor = (1.0 - shrink.exp()).ln();
        let mut evidence = Evidence::new();
        let mut dead: Vec<Weighted> = Vec::new();
        let mut log_x = 0.0;
        let mut step_size = INITIAL_STEP;
        let mut iterations = 0usize;

        loop {
            let worst = live
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.log_l.total_cmp(&b.1.log_l))
                .map(|(i, _)| i)
                .ok_or_else(|| Error::Sampler("empty live set".to_string()))?;
            let threshold = live[worst].log_l;

            let log_weight = log_x + log_width_factor + threshold;
            evidence.add(log_weight, threshold);
            dead.push(Weighted {
                physical: live[worst].physical.clone(),
                log_l: threshold,
                log_weight,
            });
            log_x += shrink;
            iterations += 1;

            let mut start = run.rng.gen_range(0..n_live - 1);
            if start >= worst {
                start += 1;
            }
            let seed_point = live[start].clone();
            live[worst] = run.constrained_walk(seed_point, threshold, walk_steps, &mut step_size)?;

            let max_log_l = live
                .iter()
                .map(|p| p.log_l)
                .fold(f64::NEG_INFINITY, f64::max);
            let remaining = logaddexp(evidence.log_z, max_log_l + log_x) - evidence.log_z;

            if verbose && iterations % PROGRESS_INTERVAL == 0 {
                info!(
                    "iteration {}: ln Z = {:.4}, remaining dlogz = {:.4}, step = {:.3e}",
                    iterations, evidence.log_z, remaining, step_size
                );
            }

            let at_limit = controls.max_iterations.is_some_and(|max| iterations >= max);
            if run.problem.agree_to_stop(remaining < dlogz || at_limit)? {
                break;
            }
        }

        // Remaining live points share the final prior volume
        let log_live_weight = log_x - (n_live as f64).ln();
        for point in &live {
            let log_weight = log_live_weight + point.log_l;
            evidence.add(log_weight, point.log_l);
            dead.push(Weighted {
                physical: point.physical.clone(),
                log_l: point.log_l,
                log_weight,
            });
        }

        let log_z = evidence.log_z;
        if !log_z.is_finite() {
            return Err(Error::Sampler(format!("evidence estimate is {}", log_z)));
        }
        let information = evidence.information.max(0.0);
        let log_z_error = (information / n_live as f64).sqrt();

        let weights: Vec<f64> = dead.iter().map(|d| (d.log_weight - log_z).exp()).collect();
        let total: f64 = weights.iter().sum();
        let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let effective = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        let count = (effective.floor() as usize).max(1);

        let indices = systematic_resample(&weights, count, &mut run.rng);
        let samples: Vec<Vec<f64>> = indices.iter().map(|&i| dead[i].physical.clone()).collect();
        let sample_log_likelihoods: Vec<f64> = indices.iter().map(|&i| dead[i].log_l).collect();

        let output = SamplerOutput {
            samples,
            sample_log_likelihoods,
            log_evidence: log_z,
            log_evidence_error: log_z_error,
            information,
            iterations,
            likelihood_calls: run.likelihood_calls,
        };

        info!(
            "nested sampling finished: {} iterations, {} calls, ln Z = {:.4} ± {:.4}, {} posterior samples",
            iterations,
            output.likelihood_calls,
            log_z,
            log_z_error,
            output.samples.len()
        );

        if let Some(basename) = &controls.outputfiles_basename {
            write_outputs(basename, &output, n_live)?;
        }
        Ok(output)
    }
}

/// `<basename>post_equal_weights.dat` (parameters then log-likelihood per row) and
/// `<basename>stats.json`
fn write_outputs(basename: &Path, output: &SamplerOutput, n_live: usize) -> Result<()> {
    let posterior_path = with_suffix(basename, "post_equal_weights.dat");
    if let Some(parent) = posterior_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(&posterior_path)?;
    for (sample, log_l) in output.samples.iter().zip(&output.sample_log_likelihoods) {
        let row: Vec<String> = sample
            .iter()
            .chain(std::iter::once(log_l))
            .map(|v| format!("{:.12e}", v))
            .collect();
        writeln!(file, "{}", row.join(" "))?;
    }

    let stats = Stats {
        sampler: "nested",
        log_evidence: output.log_evidence,
        log_evidence_error: output.log_evidence_error,
        information: output.information,
        iterations: output.iterations,
        likelihood_calls: output.likelihood_calls,
        n_live_points: n_live,
        posterior_samples: output.samples.len(),
    };
    let stats_path = with_suffix(basename, "stats.json");
    fs::write(&stats_path, serde_json::to_string_pretty(&stats)?)?;

    debug!(
        "wrote {} and {}",
        posterior_path.display(),
        stats_path.display()
    );
    Ok(())
}
