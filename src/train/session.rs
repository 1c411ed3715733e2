use std::sync::Arc;

use ndarray::Array1;
use tracing::{debug, info};

use crate::{
    agent::Agent,
    data::{domain::Cash, source::MarketSource},
    error::{MarketGymResult, TrainError},
    feed::{MarketFeed, SplitMode},
    gym::{
        env::{InitialConditions, MarketEnv},
        pool::{EnvPool, ExecutionMode, PipedEnv},
    },
    pipe::{self, SharedPipe},
    train::{Phase, TrainConfig},
};

/// One agent bound to one temporally partitioned dataset.
///
/// Construction validates the configuration, opens the source exactly once,
/// binds (or verifies) the agent's dataset metadata, and splits the horizon
/// into the train partition and the optional held-out test partition. After
/// that the session builds environment pools on demand; the underlying data
/// is never re-read per pool.
pub struct Session {
    agent: Agent,
    cfg: TrainConfig,
    train_feed: MarketFeed,
    test_feed: Option<MarketFeed>,
    // Deep copies of the agent's canonical pipe, one per worker. Built on
    // first vectorized pool and reused for every later one, so worker
    // statistics accumulate across training runs.
    worker_pipes: Option<Vec<SharedPipe>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        mut agent: Agent,
        source: &dyn MarketSource,
        cfg: TrainConfig,
    ) -> MarketGymResult<Self> {
        cfg.validate()?;

        let (metadata, reader) = source.open(cfg.dataset_name.as_deref())?;
        agent.attach_metadata(metadata.clone())?;

        let full = MarketFeed::new(metadata, reader, cfg.n_chunks)?;
        let (train_feed, test_feed) = full.split_ratio(cfg.train_ratio)?;

        info!(
            dataset = train_feed.metadata().name(),
            train_rows = train_feed.len(),
            test_rows = test_feed.as_ref().map(|f| f.len()).unwrap_or_default(),
            "session opened"
        );

        Ok(Self {
            agent,
            cfg,
            train_feed,
            test_feed,
            worker_pipes: None,
        })
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }

    pub fn train_feed(&self) -> &MarketFeed {
        &self.train_feed
    }

    pub fn test_feed(&self) -> Option<&MarketFeed> {
        self.test_feed.as_ref()
    }

    /// Builds the environment pool for `phase`.
    ///
    /// With one worker the pool drives the agent's canonical pipe, so its
    /// statistics keep fitting online. With several workers each environment
    /// gets its own feed slice and its own memoized pipe copy; the canonical
    /// pipe is left untouched.
    #[tracing::instrument(skip(self))]
    pub fn build_env(&mut self, phase: Phase) -> MarketGymResult<EnvPool> {
        let feed = match phase {
            Phase::Train => self.train_feed.clone(),
            Phase::Test => self
                .test_feed
                .as_ref()
                .ok_or(TrainError::NoTestPartition(self.cfg.train_ratio))?
                .clone(),
        };
        let init = self.initial_conditions(feed.metadata().n_assets())?;

        if self.cfg.n_async_envs == 1 {
            let env = MarketEnv::new(feed, init)?;
            let worker = PipedEnv::new(env, Arc::clone(self.agent.pipe()));
            return Ok(EnvPool::Single(worker));
        }

        let split_mode = if self.cfg.exclusive_async_envs {
            SplitMode::Exclusive
        } else {
            SplitMode::Replicated
        };
        let feeds = feed.split_count(self.cfg.n_async_envs, split_mode)?;
        let pipes = self.worker_pipes()?;

        let workers = feeds
            .into_iter()
            .zip(pipes)
            .map(|(feed, pipe)| Ok(PipedEnv::new(MarketEnv::new(feed, init.clone())?, pipe)))
            .collect::<MarketGymResult<Vec<_>>>()?;

        let mode = if self.cfg.async_envs {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        debug!(n_workers = workers.len(), %split_mode, %mode, "built vectorized pool");
        Ok(EnvPool::Vector { workers, mode })
    }

    /// Replays `n_episode` full episodes over the test partition with the
    /// agent's current policy. Evaluation never updates the policy; its only
    /// effect is the statistics that accumulate inside the observation
    /// pipes touched.
    pub fn test(&mut self, n_episode: usize) -> MarketGymResult<()> {
        if n_episode == 0 {
            return Err(TrainError::InvalidEpisodeCount(n_episode).into());
        }

        let mut pool = self.build_env(Phase::Test)?;
        let n_workers = pool.n_workers();

        for episode in 0..n_episode {
            let mut observations = pool.reset()?;
            let mut total = 0.0;

            // Exclusive tiles and replicated spans are equal length, so
            // every worker reports `Done` on the same batched step.
            loop {
                let actions = observations
                    .iter()
                    .map(|obs| self.agent.policy().act(obs))
                    .collect::<MarketGymResult<Vec<_>>>()?;
                let results = pool.step(&actions)?;

                total += results.iter().map(|r| r.reward.0).sum::<f64>();
                let all_done = results.iter().all(|r| r.outcome.is_done());
                observations = results.into_iter().map(|r| r.observation).collect();
                if all_done {
                    break;
                }
            }

            debug!(
                episode,
                mean_reward = total / n_workers as f64,
                "test episode finished"
            );
        }

        Ok(())
    }

    // ============================================================================================
    // Internals
    // ============================================================================================

    fn initial_conditions(&self, n_assets: usize) -> MarketGymResult<InitialConditions> {
        let mut init =
            InitialConditions::fixed(Cash(self.cfg.initial_cash), Array1::zeros(n_assets));
        if let Some((low, high)) = self.cfg.initial_cash_range {
            init = init.with_cash_range(low, high)?;
        }
        if let Some((low, high)) = self.cfg.initial_asset_quantities_range {
            init = init.with_quantity_range(low, high)?;
        }
        Ok(init)
    }

    /// The per-worker pipe copies, deep-copied from the canonical pipe the
    /// first time a vectorized pool is built and reused thereafter. On
    /// failure nothing is memoized.
    fn worker_pipes(&mut self) -> MarketGymResult<Vec<SharedPipe>> {
        if self.worker_pipes.is_none() {
            let built = (0..self.cfg.n_async_envs)
                .map(|_| pipe::duplicate(self.agent.pipe()))
                .collect::<MarketGymResult<Vec<_>>>()?;
            debug!(n = built.len(), "memoized worker pipe copies");
            self.worker_pipes = Some(built);
        }
        let pipes = self.worker_pipes.as_deref().unwrap_or_default();
        Ok(pipes.iter().map(Arc::clone).collect())
    }
}
