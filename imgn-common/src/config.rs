//! Run configuration loading and the immutable per-rank run context
//!
//! **Resolution order** for the configuration file:
//! 1. Command-line argument (highest priority)
//! 2. `IMGN_CONFIG` environment variable
//! 3. `<config_dir>/imgn/config.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing file falls back to defaults with a warning. A file that exists but
//! does not parse is a fatal configuration error.

use crate::seeds::{entropy_seed, SeedSequence};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "IMGN_CONFIG";

/// Named sampling options handed to the sampler
///
/// Any option left unset uses the sampler's own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingControls {
    /// Number of live points
    pub n_live_points: Option<usize>,

    /// Stop once the remaining evidence estimate drops below this (log units)
    pub dlogz: Option<f64>,

    /// Hard cap on sampler iterations
    pub max_iterations: Option<usize>,

    /// Likelihood calls per constrained replacement walk
    pub walk_steps: Option<usize>,

    /// Log progress at info level
    pub verbose: Option<bool>,

    /// Prefix for chain/evidence artifacts (e.g. `chains/imgn_`)
    pub outputfiles_basename: Option<PathBuf>,

    /// Sampler seed override (derived from the master seed when unset)
    pub seed: Option<u64>,
}

impl SamplingControls {
    /// Reject option values no sampler can honor
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.n_live_points {
            if n < 2 {
                return Err(Error::Config(format!(
                    "sampling.n_live_points must be at least 2, got {}",
                    n
                )));
            }
        }
        if let Some(dlogz) = self.dlogz {
            if !dlogz.is_finite() || dlogz <= 0.0 {
                return Err(Error::Config(format!(
                    "sampling.dlogz must be positive, got {}",
                    dlogz
                )));
            }
        }
        if self.walk_steps == Some(0) {
            return Err(Error::Config("sampling.walk_steps must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Run configuration as read from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Master seed; drawn from OS entropy when absent
    pub master_seed: Option<u64>,

    /// Realizations per worker per evaluation
    pub ensemble_size: usize,

    /// Base directory for per-run scratch storage
    pub scratch_dir: Option<PathBuf>,

    /// Directory for chain, evidence and report artifacts
    pub output_dir: PathBuf,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Upper bound on any single collective receive
    pub collective_timeout_secs: u64,

    /// Sampler options
    pub sampling: SamplingControls,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            master_seed: None,
            ensemble_size: 1,
            scratch_dir: None,
            output_dir: PathBuf::from("chains"),
            log_level: "info".to_string(),
            collective_timeout_secs: 600,
            sampling: SamplingControls::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from an explicit path, or fall back to defaults
    ///
    /// `None` or a path that does not exist yields defaults (with a warning for a
    /// named file that is missing).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.ensemble_size == 0 {
            return Err(Error::Config("ensemble_size must be at least 1".to_string()));
        }
        if self.collective_timeout_secs == 0 {
            return Err(Error::Config(
                "collective_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.sampling.validate()
    }

    /// Resolve the per-rank run context
    ///
    /// Creates the namespaced scratch directory `<scratch>/run-<id>/rank-<rank>`
    /// so concurrent workers on shared storage never collide.
    pub fn into_context(self, rank: usize) -> Result<RunContext> {
        self.validate()?;

        let master_seed = self.master_seed.unwrap_or_else(entropy_seed);
        let run_id = Uuid::new_v4();
        let scratch_base = self.scratch_dir.clone().unwrap_or_else(default_scratch_base);
        let scratch_dir = scratch_base
            .join(format!("run-{}", run_id))
            .join(format!("rank-{}", rank));

        std::fs::create_dir_all(&scratch_dir).map_err(|e| {
            Error::Config(format!(
                "cannot create scratch directory {}: {}",
                scratch_dir.display(),
                e
            ))
        })?;

        Ok(RunContext {
            seeds: SeedSequence::new(master_seed),
            run_id,
            rank,
            scratch_dir,
            output_dir: self.output_dir,
            ensemble_size: self.ensemble_size,
            collective_timeout: Duration::from_secs(self.collective_timeout_secs),
            sampling: self.sampling,
        })
    }
}

/// Immutable settings shared by every component of one rank's run
#[derive(Debug, Clone)]
pub struct RunContext {
    seeds: SeedSequence,
    run_id: Uuid,
    rank: usize,
    scratch_dir: PathBuf,
    output_dir: PathBuf,
    ensemble_size: usize,
    collective_timeout: Duration,
    sampling: SamplingControls,
}

impl RunContext {
    /// Master seed of the run
    pub fn master_seed(&self) -> u64 {
        self.seeds.master()
    }

    pub fn seeds(&self) -> &SeedSequence {
        &self.seeds
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Per-rank scratch directory (already created)
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ensemble_size(&self) -> usize {
        self.ensemble_size
    }

    pub fn collective_timeout(&self) -> Duration {
        self.collective_timeout
    }

    pub fn sampling(&self) -> &SamplingControls {
        &self.sampling
    }

    /// Replace the master seed with the value agreed across ranks
    pub fn with_master_seed(mut self, master_seed: u64) -> Self {
        self.seeds = SeedSequence::new(master_seed);
        self
    }
}

/// Configuration file path following the resolution order
///
/// Returns `None` when no candidate exists, meaning compiled defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("imgn").join("config.toml"))
        .filter(|p| p.exists())
}

/// OS-dependent default scratch base
fn default_scratch_base() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("imgn"))
        .unwrap_or_else(|| std::env::temp_dir().join("imgn"))
}
