use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{ConfigError, MarketGymResult};

pub mod session;

pub use session::Session;

/// Which temporal partition a run draws its data from.
///
/// Callers name the phase explicitly; nothing about the partition choice is
/// inferred from the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Phase {
    /// The earlier partition of the horizon.
    Train,

    /// The later, held-out partition. Only exists when `train_ratio < 1`.
    Test,
}

/// Session configuration. Validated up front, before any data is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Dataset to open; `None` joins every dataset the source holds.
    pub dataset_name: Option<String>,

    /// Number of chunks each feed partition is streamed in. Bounds peak
    /// memory, never changes which rows are replayed.
    pub n_chunks: usize,

    /// Leading fraction of the horizon used for training. `1.0` disables
    /// the test partition entirely.
    pub train_ratio: f64,

    /// Worker count for training. `1` keeps the agent's canonical pipe in
    /// the loop; anything larger isolates workers behind pipe copies.
    pub n_async_envs: usize,

    /// Step the vectorized workers in parallel rather than sequentially.
    pub async_envs: bool,

    /// Tile the training partition into disjoint per-worker slices instead
    /// of replicating it.
    pub exclusive_async_envs: bool,

    /// Starting cash for every episode, unless a range is configured.
    pub initial_cash: f64,

    /// Inclusive sampling range for starting cash; fresh draw per reset.
    pub initial_cash_range: Option<(f64, f64)>,

    /// Inclusive sampling range for each asset's starting quantity; one
    /// independent draw per asset per reset. `None` starts flat.
    pub initial_asset_quantities_range: Option<(f64, f64)>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_name: None,
            n_chunks: 1,
            train_ratio: 0.8,
            n_async_envs: 1,
            async_envs: false,
            exclusive_async_envs: false,
            initial_cash: 10_000.0,
            initial_cash_range: None,
            initial_asset_quantities_range: None,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset_name(self, name: impl Into<String>) -> Self {
        Self {
            dataset_name: Some(name.into()),
            ..self
        }
    }

    pub fn with_n_chunks(self, n_chunks: usize) -> Self {
        Self { n_chunks, ..self }
    }

    pub fn with_train_ratio(self, train_ratio: f64) -> Self {
        Self { train_ratio, ..self }
    }

    pub fn with_n_async_envs(self, n_async_envs: usize) -> Self {
        Self {
            n_async_envs,
            ..self
        }
    }

    pub fn with_async_envs(self, async_envs: bool) -> Self {
        Self { async_envs, ..self }
    }

    pub fn with_exclusive_async_envs(self, exclusive: bool) -> Self {
        Self {
            exclusive_async_envs: exclusive,
            ..self
        }
    }

    pub fn with_initial_cash(self, initial_cash: f64) -> Self {
        Self {
            initial_cash,
            ..self
        }
    }

    pub fn with_initial_cash_range(self, low: f64, high: f64) -> Self {
        Self {
            initial_cash_range: Some((low, high)),
            ..self
        }
    }

    pub fn with_initial_asset_quantities_range(self, low: f64, high: f64) -> Self {
        Self {
            initial_asset_quantities_range: Some((low, high)),
            ..self
        }
    }

    pub fn validate(&self) -> MarketGymResult<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return Err(ConfigError::InvalidTrainRatio(self.train_ratio).into());
        }
        if self.n_chunks == 0 {
            return Err(ConfigError::InvalidChunkCount(self.n_chunks).into());
        }
        if self.n_async_envs == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.n_async_envs).into());
        }
        for (what, range) in [
            ("initial_cash_range", self.initial_cash_range),
            (
                "initial_asset_quantities_range",
                self.initial_asset_quantities_range,
            ),
        ] {
            if let Some((low, high)) = range
                && low > high
            {
                return Err(ConfigError::InvalidRange { what, low, high }.into());
            }
        }
        Ok(())
    }
}

/// A training algorithm on top of a [`Session`].
///
/// `train` is algorithm-specific; evaluation over the held-out partition is
/// shared by every trainer and provided here.
pub trait Trainer {
    fn session_mut(&mut self) -> &mut Session;

    /// Runs the algorithm's optimization loop over the training partition.
    fn train(&mut self, n_episode: usize) -> MarketGymResult<()>;

    /// Replays `n_episode` episodes over the held-out test partition with
    /// the current policy. Evaluation only accumulates pipe statistics.
    fn test(&mut self, n_episode: usize) -> MarketGymResult<()> {
        self.session_mut().test(n_episode)
    }
}
