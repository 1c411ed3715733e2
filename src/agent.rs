use tracing::debug;

use crate::{
    data::metadata::DatasetMetadata,
    error::{DataError, MarketGymResult},
    gym::{action::Actions, observation::Observation},
    pipe::{ObservationPipe, SharedPipe, share},
};

/// Maps an observation to the next action. Implementations are the learned
/// (or rule-based) decision component; everything around them is plumbing.
pub trait Policy: Send {
    fn act(&self, obs: &Observation) -> MarketGymResult<Actions>;
}

/// Policy that never trades. A useful baseline and test double.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldPolicy;

impl Policy for HoldPolicy {
    fn act(&self, obs: &Observation) -> MarketGymResult<Actions> {
        Ok(Actions::hold(obs.quantities.len()))
    }
}

/// A trading agent: a policy plus the canonical observation pipe its policy
/// was fitted against.
///
/// The dataset metadata is bound lazily, the first time the agent is trained
/// on a dataset. From then on every session must present identical metadata;
/// an agent trained on one asset universe cannot silently be reused on
/// another.
pub struct Agent {
    policy: Box<dyn Policy>,
    pipe: SharedPipe,
    dataset_metadata: Option<DatasetMetadata>,
}

impl Agent {
    pub fn new(policy: impl Policy + 'static, pipe: impl ObservationPipe + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            pipe: share(pipe),
            dataset_metadata: None,
        }
    }

    pub fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    /// Canonical pipe handle. Single-environment training mutates the pipe
    /// behind this exact handle; vectorized training never touches it.
    pub fn pipe(&self) -> &SharedPipe {
        &self.pipe
    }

    pub fn dataset_metadata(&self) -> Option<&DatasetMetadata> {
        self.dataset_metadata.as_ref()
    }

    /// Binds the agent to a dataset, or verifies it is already bound to an
    /// identical one.
    pub fn attach_metadata(&mut self, metadata: DatasetMetadata) -> MarketGymResult<()> {
        match &self.dataset_metadata {
            None => {
                debug!(dataset = metadata.name(), "binding agent to dataset");
                self.dataset_metadata = Some(metadata);
                Ok(())
            }
            Some(bound) if *bound == metadata => Ok(()),
            Some(bound) => Err(DataError::MetadataMismatch(format!(
                "agent is bound to '{}' but the session loaded '{}'",
                bound.name(),
                metadata.name()
            ))
            .into()),
        }
    }
}
