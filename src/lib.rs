pub mod agent;
pub mod data;
pub mod error;
pub mod feed;
pub mod gym;
mod macros;
pub mod pipe;
pub mod train;

pub use agent::{Agent, HoldPolicy, Policy};
pub use data::domain::{AssetSymbol, Cash, Resolution};
pub use data::metadata::{ColumnSchema, DatasetMetadata};
pub use data::source::{InMemoryReader, InMemorySource, MarketSource, RowReader};
pub use error::{MarketGymError, MarketGymResult};
pub use feed::{MarketFeed, SplitMode};
pub use gym::action::Actions;
pub use gym::env::{InitialConditions, MarketEnv};
pub use gym::observation::Observation;
pub use gym::pool::{EnvPool, ExecutionMode, PipedEnv, StepResult};
pub use gym::{EnvStatus, Reward, StepOutcome};
pub use pipe::{IdentityPipe, ObservationPipe, PipeStack, RunningNorm, SharedPipe};
pub use train::{Phase, Session, TrainConfig, Trainer};
