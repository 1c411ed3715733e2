use thiserror::Error;

pub type MarketGymResult<T> = Result<T, MarketGymError>;

#[derive(Debug, Error)]
pub enum MarketGymError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Train(#[from] TrainError),
}

/// Configuration errors. Raised before any data is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("train_ratio must be in (0, 1], got {0}")]
    InvalidTrainRatio(f64),

    #[error("n_chunks must be >= 1, got {0}")]
    InvalidChunkCount(usize),

    #[error("n_async_envs must be >= 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("split count must be >= 1, got {0}")]
    InvalidSplitCount(usize),

    #[error(
        "exclusive split of {rows} rows into {parts} parts would drop rows: \
         row count must be divisible by the split count"
    )]
    UnevenSplit { rows: usize, parts: usize },

    #[error(
        "exclusive split of {rows} rows into {parts} parts leaves partitions \
         smaller than n_chunks = {n_chunks}"
    )]
    PartitionTooSmallForChunks {
        rows: usize,
        parts: usize,
        n_chunks: usize,
    },

    #[error("invalid inclusive range [{low}, {high}] for {what}: low must not exceed high")]
    InvalidRange { what: &'static str, low: f64, high: f64 },
}

/// Errors related to data sources, schemas, and metadata consistency.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("dataset '{0}' not found in source")]
    DatasetNotFound(String),

    #[error("source holds no datasets")]
    EmptySource,

    #[error("dataset '{0}' has no rows")]
    EmptyDataset(String),

    #[error(
        "agent dataset metadata does not match metadata loaded from source: {0}"
    )]
    MetadataMismatch(String),

    #[error("cannot join datasets: {0}")]
    IncompatibleJoin(String),

    #[error("row range {start}..{end} out of bounds for reader with {n_rows} rows")]
    RowsOutOfBounds {
        start: usize,
        end: usize,
        n_rows: usize,
    },

    #[error("row width {got} does not match schema width {expected}")]
    RowWidthMismatch { expected: usize, got: usize },

    #[error("invalid column schema: {0}")]
    InvalidSchema(String),

    #[error("data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to the environment lifecycle and action execution.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid environment state: {0}")]
    InvalidState(String),

    #[error("action has {got} entries but the asset universe has {expected}")]
    ActionShape { expected: usize, got: usize },
}

/// Errors related to observation pipelines.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("observation has {got} features but pipe was fitted on {expected}")]
    FeatureShape { expected: usize, got: usize },

    #[error("observation pipe lock poisoned")]
    Poisoned,
}

/// Errors related to the vectorized environment pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool has {expected} workers but {got} actions were supplied")]
    ActionArity { expected: usize, got: usize },

    #[error("worker {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: Box<MarketGymError>,
    },
}

/// Usage errors in the training orchestration.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(
        "no test partition exists: train_ratio = {0}. Construct the session \
         with train_ratio < 1 to enable testing"
    )]
    NoTestPartition(f64),

    #[error("n_episode must be >= 1, got {0}")]
    InvalidEpisodeCount(usize),
}
