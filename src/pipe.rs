use std::sync::{Arc, Mutex};

use ndarray::Array1;

use crate::{
    error::{MarketGymResult, PipeError},
    gym::observation::Observation,
};

/// Stateful transform applied to raw environment observations before they
/// reach the agent.
///
/// Applying a pipe updates its internal running statistics as a side effect;
/// there are no I/O side effects. `clone_pipe` is an explicit contract: the
/// returned copy shares no mutable state with the original, so updates to one
/// never affect the other. This is what makes per-worker isolation possible
/// when the same logical pipe serves parallel environments.
pub trait ObservationPipe: Send {
    fn apply(&mut self, obs: Observation) -> MarketGymResult<Observation>;

    /// Produces an independent, state-disjoint deep copy.
    fn clone_pipe(&self) -> Box<dyn ObservationPipe>;
}

/// Shared handle to one pipe. `Arc` identity is the object identity the
/// memoization invariants of the trainer are stated over.
pub type SharedPipe = Arc<Mutex<Box<dyn ObservationPipe>>>;

/// Wraps a pipe into a shared handle.
pub fn share(pipe: impl ObservationPipe + 'static) -> SharedPipe {
    Arc::new(Mutex::new(Box::new(pipe)))
}

/// Deep-copies the pipe behind a shared handle into a fresh, state-disjoint
/// handle.
pub fn duplicate(pipe: &SharedPipe) -> MarketGymResult<SharedPipe> {
    let guard = pipe.lock().map_err(|_| PipeError::Poisoned)?;
    Ok(Arc::new(Mutex::new(guard.clone_pipe())))
}

/// Applies a shared pipe to one observation.
pub fn apply(pipe: &SharedPipe, obs: Observation) -> MarketGymResult<Observation> {
    let mut guard = pipe.lock().map_err(|_| PipeError::Poisoned)?;
    guard.apply(obs)
}

// ================================================================================================
// Implementations
// ================================================================================================

/// Passes observations through unchanged. Useful as a default and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPipe;

impl ObservationPipe for IdentityPipe {
    fn apply(&mut self, obs: Observation) -> MarketGymResult<Observation> {
        Ok(obs)
    }

    fn clone_pipe(&self) -> Box<dyn ObservationPipe> {
        Box::new(*self)
    }
}

/// Per-feature running standardization via Welford's online algorithm.
///
/// Each applied observation first updates the running mean/variance, then is
/// normalized to `(x - mean) / sqrt(var + epsilon)`. The feature width is
/// fixed by the first observation seen; later observations must match it.
#[derive(Debug, Clone)]
pub struct RunningNorm {
    count: u64,
    mean: Array1<f64>,
    m2: Array1<f64>,
    epsilon: f64,
}

impl RunningNorm {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: Array1::zeros(0),
            m2: Array1::zeros(0),
            epsilon: 1e-8,
        }
    }

    pub fn with_epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Number of observations folded into the statistics so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Population variance per feature. Zero until two samples are seen.
    pub fn variance(&self) -> Array1<f64> {
        if self.count < 2 {
            return Array1::zeros(self.mean.len());
        }
        &self.m2 / self.count as f64
    }

    fn update(&mut self, features: &Array1<f64>) -> MarketGymResult<()> {
        if self.count == 0 {
            self.mean = Array1::zeros(features.len());
            self.m2 = Array1::zeros(features.len());
        } else if features.len() != self.mean.len() {
            return Err(PipeError::FeatureShape {
                expected: self.mean.len(),
                got: features.len(),
            }
            .into());
        }

        self.count += 1;
        let n = self.count as f64;
        for (i, &x) in features.iter().enumerate() {
            let delta = x - self.mean[i];
            self.mean[i] += delta / n;
            let delta2 = x - self.mean[i];
            self.m2[i] += delta * delta2;
        }
        Ok(())
    }
}

impl Default for RunningNorm {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationPipe for RunningNorm {
    fn apply(&mut self, obs: Observation) -> MarketGymResult<Observation> {
        self.update(&obs.features)?;
        let var = self.variance();
        let features = Array1::from_shape_fn(obs.features.len(), |i| {
            (obs.features[i] - self.mean[i]) / (var[i] + self.epsilon).sqrt()
        });
        Ok(Observation { features, ..obs })
    }

    fn clone_pipe(&self) -> Box<dyn ObservationPipe> {
        Box::new(self.clone())
    }
}

/// Ordered composition of pipes, applied front to back.
pub struct PipeStack {
    stages: Vec<Box<dyn ObservationPipe>>,
}

impl PipeStack {
    pub fn new(stages: Vec<Box<dyn ObservationPipe>>) -> Self {
        Self { stages }
    }
}

impl ObservationPipe for PipeStack {
    fn apply(&mut self, obs: Observation) -> MarketGymResult<Observation> {
        self.stages
            .iter_mut()
            .try_fold(obs, |obs, stage| stage.apply(obs))
    }

    fn clone_pipe(&self) -> Box<dyn ObservationPipe> {
        Box::new(Self {
            stages: self.stages.iter().map(|s| s.clone_pipe()).collect(),
        })
    }
}
