use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::{
    error::{MarketGymResult, PoolError},
    gym::{Reward, StepOutcome, action::Actions, env::MarketEnv, observation::Observation},
    pipe::{self, SharedPipe},
};

/// One environment paired with the observation pipe that post-processes
/// everything it emits. Both `reset` and `step` observations pass through
/// the pipe before the caller sees them.
pub struct PipedEnv {
    env: MarketEnv,
    pipe: SharedPipe,
}

impl PipedEnv {
    pub fn new(env: MarketEnv, pipe: SharedPipe) -> Self {
        Self { env, pipe }
    }

    pub fn env(&self) -> &MarketEnv {
        &self.env
    }

    pub fn pipe(&self) -> &SharedPipe {
        &self.pipe
    }

    pub fn reset(&mut self) -> MarketGymResult<Observation> {
        let obs = self.env.reset()?;
        pipe::apply(&self.pipe, obs)
    }

    pub fn step(&mut self, actions: &Actions) -> MarketGymResult<StepResult> {
        let (obs, reward, outcome) = self.env.step(actions)?;
        Ok(StepResult {
            observation: pipe::apply(&self.pipe, obs)?,
            reward,
            outcome,
        })
    }
}

/// Per-worker result of one pool step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: Reward,
    pub outcome: StepOutcome,
}

/// How a vectorized pool drives its workers through one batched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ExecutionMode {
    /// Workers are stepped one after another on the calling thread.
    Sequential,

    /// Workers are stepped on the rayon thread pool. Results are still
    /// ordered by worker index.
    Parallel,
}

/// A set of environments driven in lockstep.
///
/// `Single` wraps exactly one worker; `Vector` drives several, each with its
/// own state-disjoint observation pipe. Batched results are always ordered
/// by worker index, regardless of execution mode.
pub enum EnvPool {
    Single(PipedEnv),
    Vector {
        workers: Vec<PipedEnv>,
        mode: ExecutionMode,
    },
}

impl std::fmt::Debug for EnvPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(_) => f.debug_tuple("Single").finish_non_exhaustive(),
            Self::Vector { workers, mode } => f
                .debug_struct("Vector")
                .field("n_workers", &workers.len())
                .field("mode", mode)
                .finish(),
        }
    }
}

impl EnvPool {
    pub fn n_workers(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Vector { workers, .. } => workers.len(),
        }
    }

    pub fn workers(&self) -> &[PipedEnv] {
        match self {
            Self::Single(worker) => std::slice::from_ref(worker),
            Self::Vector { workers, .. } => workers,
        }
    }

    /// Resets every worker and returns their first observations in worker
    /// order.
    pub fn reset(&mut self) -> MarketGymResult<Vec<Observation>> {
        debug!(n_workers = self.n_workers(), "resetting environment pool");
        match self {
            Self::Single(worker) => Ok(vec![worker.reset()?]),
            Self::Vector { workers, mode } => match mode {
                ExecutionMode::Sequential => workers
                    .iter_mut()
                    .enumerate()
                    .map(|(index, w)| w.reset().map_err(|e| worker_error(index, e)))
                    .collect(),
                ExecutionMode::Parallel => workers
                    .par_iter_mut()
                    .enumerate()
                    .map(|(index, w)| w.reset().map_err(|e| worker_error(index, e)))
                    .collect(),
            },
        }
    }

    /// Steps every worker with its own action. `actions[i]` goes to worker
    /// `i`; the result vector follows the same order. A single failing
    /// worker fails the whole batch.
    pub fn step(&mut self, actions: &[Actions]) -> MarketGymResult<Vec<StepResult>> {
        if actions.len() != self.n_workers() {
            return Err(PoolError::ActionArity {
                expected: self.n_workers(),
                got: actions.len(),
            }
            .into());
        }

        match self {
            Self::Single(worker) => Ok(vec![worker.step(&actions[0])?]),
            Self::Vector { workers, mode } => match mode {
                ExecutionMode::Sequential => workers
                    .iter_mut()
                    .zip(actions)
                    .enumerate()
                    .map(|(index, (w, a))| w.step(a).map_err(|e| worker_error(index, e)))
                    .collect(),
                ExecutionMode::Parallel => workers
                    .par_iter_mut()
                    .zip(actions)
                    .enumerate()
                    .map(|(index, (w, a))| w.step(a).map_err(|e| worker_error(index, e)))
                    .collect(),
            },
        }
    }
}

fn worker_error(index: usize, source: crate::error::MarketGymError) -> crate::error::MarketGymError {
    PoolError::Worker {
        index,
        source: Box::new(source),
    }
    .into()
}
