use serde::{Deserialize, Serialize};

use crate::{impl_add_sub_mul_div_primitive, impl_from_primitive};

pub mod action;
pub mod env;
pub mod observation;
pub mod pool;

/// Step reward: the change in simulated account equity across one tick,
/// in quote currency. The surrounding RL setup may reshape it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Reward(pub f64);
impl_from_primitive!(Reward, f64);
impl_add_sub_mul_div_primitive!(Reward, f64);

/// Lifecycle status of one simulated trading environment.
///
/// ```md
/// Current State | Action  | Next State        | Notes
/// --------------|---------|-------------------|---------------------------------
/// `Ready`       | reset() | Running           | First observation returned
/// `Running`     | step()  | Running            | Feed has rows left
/// `Running`     | step()  | Done               | Feed partition exhausted
/// `Done`        | reset() | Running            | Rewind feed, reseed account
/// `Ready`/`Done`| step()  | error              | `reset()` required first
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    /// Initial state. The environment is waiting for `reset()`.
    Ready,

    /// An episode is active and the environment accepts `step()` calls.
    Running,

    /// The feed partition is exhausted. `reset()` starts a fresh episode.
    Done,
}

impl EnvStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    InProgress,
    /// The feed partition is exhausted; the episode is over.
    Done,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
