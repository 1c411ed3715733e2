use chrono::{TimeZone, Utc};
use marketgym::{
    Agent, AssetSymbol, ColumnSchema, DatasetMetadata, HoldPolicy, InMemorySource,
    MarketGymResult, Observation, ObservationPipe, Resolution, SharedPipe,
};
use ndarray::Array2;

pub fn setup_metadata(name: &str, assets: &[&str]) -> DatasetMetadata {
    DatasetMetadata::new(
        name,
        assets.iter().map(|&a| AssetSymbol::from(a)),
        Resolution::Minute(1),
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ColumnSchema::new(["close"], 0).unwrap(),
    )
    .unwrap()
}

/// Single-asset source where the price at tick `i` is `i`.
pub fn setup_source(n_rows: usize) -> InMemorySource {
    let rows = Array2::from_shape_fn((n_rows, 1), |(r, _)| r as f64);
    InMemorySource::new()
        .with_dataset(setup_metadata("crypto", &["BTC"]), rows)
        .unwrap()
}

pub fn setup_agent() -> Agent {
    Agent::new(HoldPolicy, StampPipe::new())
}

/// Pipe that stamps its own sample count into the first feature. Makes the
/// flow of observations through a specific pipe instance observable from
/// the outside.
pub struct StampPipe {
    count: usize,
}

impl StampPipe {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl ObservationPipe for StampPipe {
    fn apply(&mut self, mut obs: Observation) -> MarketGymResult<Observation> {
        self.count += 1;
        obs.features[0] = self.count as f64;
        Ok(obs)
    }

    fn clone_pipe(&self) -> Box<dyn ObservationPipe> {
        Box::new(Self { count: self.count })
    }
}

/// Reads a stamp pipe's sample count. The probe itself counts as one sample,
/// so a pipe that has seen `k` observations reports `k + 1`.
pub fn probe_count(pipe: &SharedPipe) -> usize {
    let probe = Observation {
        features: ndarray::array![0.0],
        cash: marketgym::Cash(0.0),
        quantities: ndarray::array![0.0],
    };
    marketgym::pipe::apply(pipe, probe).unwrap().features[0] as usize
}
