//! # Inference Pipeline
//!
//! Wires field factories, a simulator, a likelihood and a sampler into one run on
//! one rank of a worker group.
//!
//! **Setup (fatal on error, never retried):**
//! - Active parameters collected from all factories; duplicate names rejected
//! - Field types checked for duplicates and against the simulator's requirements
//! - Simulated observable keys resolved against the measurements
//! - Master seed agreed across ranks (rank 0's value wins)
//! - Output directory created
//!
//! **Evaluation:** Every `log_likelihood` call from the sampler is one pool round:
//! the candidate points of all ranks are exchanged, every rank evaluates every
//! slot with ensembles pooled across ranks, and each rank gets its own slot back.
//!
//! **Seeds:** Factory `i` producing slot `s` of round `n` on rank `r` draws from
//! `derive(master, [n, s, r, i])`, so a (point, rank, round) triple always gives
//! the same realizations.

pub mod parameter_space;
pub mod pooling;
pub mod summary;

pub use parameter_space::{build_active_parameters, ActiveParameter, ParameterSpace};
pub use pooling::pool_ensembles;
pub use summary::PosteriorSummary;

use crate::comm::{Communicator, PoolCoordinator};
use crate::fields::{FieldFactory, FieldSet};
use crate::likelihood::Likelihood;
use crate::report::RunReport;
use crate::sampler::{Sampler, SamplerOutput, SamplingProblem};
use crate::simulator::{run_simulator, simulated_keys, validate_simulator, Simulator};
use imgn_common::seeds::SAMPLER_STREAM;
use imgn_common::{Error, ObservableKey, Result, RunContext, SeedSequence, Simulations};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File the run report is written to inside the output directory
pub const RESULTS_FILE: &str = "imgn_results.json";

/// Default artifact prefix inside the output directory
pub const DEFAULT_BASENAME: &str = "imgn_";

/// Identifies one field/simulation evaluation for seeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationTag {
    /// Pool round (one per sampler likelihood call)
    pub round: u64,
    /// Pool slot being evaluated (the proposing rank)
    pub slot: usize,
    /// Rank producing the realizations
    pub rank: usize,
}

/// Plug-ins making up one inference problem
pub struct PipelineComponents {
    pub factories: Vec<Box<dyn FieldFactory>>,
    pub simulator: Box<dyn Simulator>,
    pub likelihood: Box<dyn Likelihood>,
    pub sampler: Box<dyn Sampler>,
}

/// Outcome of one inference run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResults {
    pub parameter_names: Vec<String>,
    /// Equally weighted posterior samples, one row per sample
    pub samples: Vec<Vec<f64>>,
    pub log_evidence: f64,
    pub log_evidence_error: f64,
    /// Per-parameter summary in parameter order
    pub summaries: Vec<PosteriorSummary>,
    pub master_seed: u64,
    pub workers: usize,
    pub ensemble_size: usize,
    pub iterations: usize,
    pub likelihood_calls: usize,
}

impl InferenceResults {
    pub fn summary(&self, name: &str) -> Option<&PosteriorSummary> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.summaries.get(i))
    }
}

/// Everything needed to turn a parameter point into simulations and a likelihood
struct Model {
    factories: Vec<Box<dyn FieldFactory>>,
    simulator: Box<dyn Simulator>,
    likelihood: Box<dyn Likelihood>,
    space: ParameterSpace,
    keys: Vec<ObservableKey>,
    seeds: SeedSequence,
    ensemble_size: usize,
    scratch_dir: PathBuf,
}

impl Model {
    /// This rank's ensemble for one physical point
    fn simulate(&mut self, physical: &[f64], tag: EvaluationTag) -> Result<Simulations> {
        let values = self.space.partition(physical)?;

        let mut fields = FieldSet::new();
        for (index, (factory, active)) in self.factories.iter().zip(&values).enumerate() {
            let seed = self
                .seeds
                .derive(&[tag.round, tag.slot as u64, tag.rank as u64, index as u64]);
            fields.insert(factory.produce(active, self.ensemble_size, seed)?)?;
        }

        run_simulator(
            self.simulator.as_mut(),
            &self.keys,
            self.likelihood.measurements(),
            &fields,
            self.ensemble_size,
            &self.scratch_dir,
        )
    }

    /// Likelihood of one pool slot with ensembles pooled across ranks
    fn pooled_likelihood(
        &mut self,
        comm: &dyn Communicator,
        physical: &[f64],
        round: u64,
        slot: usize,
    ) -> Result<f64> {
        let tag = EvaluationTag {
            round,
            slot,
            rank: comm.rank(),
        };
        let local = self.simulate(physical, tag);
        let pooled = pool_ensembles(
            comm,
            &self.keys,
            self.likelihood.measurements(),
            self.ensemble_size,
            local,
        )?;
        self.likelihood.evaluate(&pooled)
    }
}

/// The pipeline as seen by the sampler
pub struct Evaluator {
    model: Model,
    comm: Box<dyn Communicator>,
    round: u64,
}

impl Evaluator {
    /// Pool rounds issued so far
    pub fn rounds(&self) -> u64 {
        self.round
    }
}

impl SamplingProblem for Evaluator {
    fn dimensionality(&self) -> usize {
        self.model.space.dimensionality()
    }

    fn prior_transform(&self, cube: &[f64]) -> Result<Vec<f64>> {
        self.model.space.prior_transform(cube)
    }

    fn log_likelihood(&mut self, physical: &[f64]) -> Result<f64> {
        let Evaluator { model, comm, round } = self;
        let comm: &dyn Communicator = &**comm;
        let current = *round;
        *round += 1;

        PoolCoordinator::new(comm).evaluate_round(physical, |slot, point| {
            model.pooled_likelihood(comm, point, current, slot)
        })
    }

    fn agree_to_stop(&mut self, local: bool) -> Result<bool> {
        PoolCoordinator::new(&*self.comm).agree_all(local)
    }
}

/// One rank's inference run
pub struct Pipeline {
    evaluator: Evaluator,
    sampler: Box<dyn Sampler>,
    context: RunContext,
}

impl Pipeline {
    /// Validate the components and agree on the master seed
    pub fn new(
        context: RunContext,
        comm: Box<dyn Communicator>,
        components: PipelineComponents,
    ) -> Result<Self> {
        let PipelineComponents {
            factories,
            simulator,
            likelihood,
            sampler,
        } = components;

        if context.ensemble_size() == 0 {
            return Err(Error::Config("ensemble_size must be at least 1".to_string()));
        }

        let space = build_active_parameters(&factories)?;
        if space.dimensionality() == 0 {
            return Err(Error::Config("no active parameters to sample".to_string()));
        }

        let mut field_types: Vec<String> = Vec::with_capacity(factories.len());
        for factory in &factories {
            let field_type = factory.field_type().to_string();
            if field_types.contains(&field_type) {
                return Err(Error::DuplicateField(field_type));
            }
            field_types.push(field_type);
        }

        validate_simulator(simulator.as_ref(), &field_types, likelihood.measurements())?;
        let keys = simulated_keys(simulator.as_ref(), likelihood.measurements());

        let master_seed = PoolCoordinator::new(comm.as_ref()).broadcast_seed(context.master_seed())?;
        let context = context.with_master_seed(master_seed);
        ensure_output_dir(context.output_dir())?;

        info!(
            "pipeline ready on rank {}/{}: parameters {:?}, observables {}, ensemble {}x{}, master seed {}, output {}",
            comm.rank(),
            comm.size(),
            space.names(),
            keys.len(),
            context.ensemble_size(),
            comm.size(),
            master_seed,
            context.output_dir().display()
        );

        let model = Model {
            factories,
            simulator,
            likelihood,
            space,
            keys,
            seeds: *context.seeds(),
            ensemble_size: context.ensemble_size(),
            scratch_dir: context.scratch_dir().to_path_buf(),
        };

        Ok(Self {
            evaluator: Evaluator {
                model,
                comm,
                round: 0,
            },
            sampler,
            context,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn master_seed(&self) -> u64 {
        self.context.master_seed()
    }

    pub fn rank(&self) -> usize {
        self.evaluator.comm.rank()
    }

    pub fn workers(&self) -> usize {
        self.evaluator.comm.size()
    }

    pub fn parameter_space(&self) -> &ParameterSpace {
        &self.evaluator.model.space
    }

    pub fn likelihood(&self) -> &dyn Likelihood {
        self.evaluator.model.likelihood.as_ref()
    }

    /// Observable keys this pipeline simulates
    pub fn keys(&self) -> &[ObservableKey] {
        &self.evaluator.model.keys
    }

    pub fn prior_transform(&self, cube: &[f64]) -> Result<Vec<f64>> {
        self.evaluator.prior_transform(cube)
    }

    /// This rank's (unpooled) ensemble for a point under an explicit tag
    ///
    /// No collective is involved.
    pub fn simulate_point(&mut self, physical: &[f64], tag: EvaluationTag) -> Result<Simulations> {
        self.evaluator.model.simulate(physical, tag)
    }

    /// One pool round outside the sampler (collective on every rank)
    pub fn evaluate_point(&mut self, physical: &[f64]) -> Result<f64> {
        self.evaluator.log_likelihood(physical)
    }

    /// Pool rounds issued so far
    pub fn rounds(&self) -> u64 {
        self.evaluator.rounds()
    }

    /// Run the sampler to completion and summarize the posterior
    pub fn run(&mut self) -> Result<InferenceResults> {
        ensure_output_dir(self.context.output_dir())?;
        let rank = self.rank();

        let mut controls = self.context.sampling().clone();
        if controls.seed.is_none() {
            controls.seed = Some(self.context.seeds().derive(&[SAMPLER_STREAM, rank as u64]));
        }
        controls.outputfiles_basename = if rank == 0 {
            Some(
                controls
                    .outputfiles_basename
                    .take()
                    .unwrap_or_else(|| self.context.output_dir().join(DEFAULT_BASENAME)),
            )
        } else {
            None
        };

        info!(
            "rank {}: starting {} sampler over {} parameters",
            rank,
            self.sampler.name(),
            self.evaluator.dimensionality()
        );
        let output = self.sampler.run(&mut self.evaluator, &controls)?;
        let results = self.summarize(output)?;

        for (name, summary) in results.parameter_names.iter().zip(&results.summaries) {
            info!(
                "{} = {:.4} -{:.4} +{:.4}",
                name, summary.median, summary.errlo, summary.errup
            );
        }
        info!(
            "ln Z = {:.4} ± {:.4} after {} rounds",
            results.log_evidence,
            results.log_evidence_error,
            self.rounds()
        );

        if rank == 0 {
            let report = RunReport::new(
                &results,
                self.context.run_id(),
                self.sampler.name(),
                self.likelihood().name(),
            );
            let path = self.context.output_dir().join(RESULTS_FILE);
            report.write_json(&path)?;
            debug!("run report written to {}", path.display());
        }
        Ok(results)
    }

    fn summarize(&self, output: SamplerOutput) -> Result<InferenceResults> {
        let names = self.parameter_space().names();
        let summaries = (0..names.len())
            .map(|i| {
                let column: Vec<f64> = output.samples.iter().map(|s| s[i]).collect();
                PosteriorSummary::from_samples(&column)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InferenceResults {
            parameter_names: names,
            samples: output.samples,
            log_evidence: output.log_evidence,
            log_evidence_error: output.log_evidence_error,
            summaries,
            master_seed: self.master_seed(),
            workers: self.workers(),
            ensemble_size: self.context.ensemble_size(),
            iterations: output.iterations,
            likelihood_calls: output.likelihood_calls,
        })
    }
}

fn ensure_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        Error::Config(format!(
            "cannot create output directory {}: {}",
            path.display(),
            e
        ))
    })
}
