//! # IMGN Inference Engine
//!
//! Likelihood-based Bayesian inference over parameterized field models.
//!
//! **Components (leaves first):**
//! - `fields`: field factories producing reproducible realizations
//! - `simulator`: mock observables from realized fields
//! - `likelihood`: shrinkage-covariance Gaussian log-likelihood
//! - `comm`: collective communication and pool-exchange rounds
//! - `sampler`: sampling contract plus a built-in nested sampler
//! - `pipeline`: parameter space, evaluation and the inference run
//! - `report`: JSON export of run results

pub mod comm;
pub mod fields;
pub mod likelihood;
pub mod pipeline;
pub mod report;
pub mod sampler;
pub mod simulator;

pub use imgn_common::{Error, Result};
pub use pipeline::{InferenceResults, Pipeline, PipelineComponents};
