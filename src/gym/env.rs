use ndarray::{Array1, Array2};
use rand::Rng;
use tracing::debug;

use crate::{
    data::domain::Cash,
    error::{ConfigError, EnvError, MarketGymResult},
    feed::MarketFeed,
    gym::{EnvStatus, Reward, StepOutcome, action::Actions, observation::Observation},
};

/// Starting account state for each episode.
///
/// When a range is configured, every `reset()` draws a fresh independent
/// sample from the inclusive interval; otherwise the fixed values are used
/// (typically the agent's last known live account state). Per-asset
/// quantities sample one draw per asset: the sampling shape is the integer
/// asset count.
#[derive(Debug, Clone)]
pub struct InitialConditions {
    fixed_cash: Cash,
    fixed_quantities: Array1<f64>,
    cash_range: Option<(f64, f64)>,
    quantity_range: Option<(f64, f64)>,
}

impl InitialConditions {
    pub fn fixed(cash: Cash, quantities: Array1<f64>) -> Self {
        Self {
            fixed_cash: cash,
            fixed_quantities: quantities,
            cash_range: None,
            quantity_range: None,
        }
    }

    pub fn with_cash_range(self, low: f64, high: f64) -> MarketGymResult<Self> {
        if low > high {
            return Err(ConfigError::InvalidRange {
                what: "initial_cash_range",
                low,
                high,
            }
            .into());
        }
        Ok(Self {
            cash_range: Some((low, high)),
            ..self
        })
    }

    pub fn with_quantity_range(self, low: f64, high: f64) -> MarketGymResult<Self> {
        if low > high {
            return Err(ConfigError::InvalidRange {
                what: "initial_asset_quantities_range",
                low,
                high,
            }
            .into());
        }
        Ok(Self {
            quantity_range: Some((low, high)),
            ..self
        })
    }

    fn sample_cash(&self) -> Cash {
        match self.cash_range {
            Some((low, high)) => Cash(rand::rng().random_range(low..=high)),
            None => self.fixed_cash,
        }
    }

    fn sample_quantities(&self, n_assets: usize) -> Array1<f64> {
        match self.quantity_range {
            Some((low, high)) => {
                let mut rng = rand::rng();
                Array1::from_shape_fn(n_assets, |_| rng.random_range(low..=high))
            }
            None => self.fixed_quantities.clone(),
        }
    }
}

/// Single-agent simulated trading session driven by one data feed.
///
/// State: simulated cash, per-asset quantities, the feed's chunk cursor, and
/// the lifecycle status. Not safe to share between concurrent callers;
/// correctness relies on strictly serialized `reset`/`step` calls.
#[derive(Debug, Clone)]
pub struct MarketEnv {
    feed: MarketFeed,
    init: InitialConditions,
    cash: Cash,
    quantities: Array1<f64>,
    chunk: Option<Array2<f64>>,
    row: usize,
    status: EnvStatus,
}

impl MarketEnv {
    pub fn new(feed: MarketFeed, init: InitialConditions) -> MarketGymResult<Self> {
        let n_assets = feed.metadata().n_assets();
        if init.fixed_quantities.len() != n_assets {
            return Err(EnvError::InvalidState(format!(
                "initial quantities have {} entries but the asset universe has {n_assets}",
                init.fixed_quantities.len()
            ))
            .into());
        }

        let cash = init.fixed_cash;
        let quantities = init.fixed_quantities.clone();
        Ok(Self {
            feed,
            init,
            cash,
            quantities,
            chunk: None,
            row: 0,
            status: EnvStatus::Ready,
        })
    }

    pub fn status(&self) -> EnvStatus {
        self.status
    }

    pub fn cash(&self) -> Cash {
        self.cash
    }

    pub fn quantities(&self) -> &Array1<f64> {
        &self.quantities
    }

    pub fn feed(&self) -> &MarketFeed {
        &self.feed
    }

    /// Simulated account equity at the current tick's prices.
    pub fn equity(&self) -> MarketGymResult<f64> {
        let prices = self.prices()?;
        Ok(self.cash.0 + self.quantities.dot(&prices))
    }

    /// Reseeds the account, rewinds the feed to the partition start, and
    /// returns the first raw observation.
    pub fn reset(&mut self) -> MarketGymResult<Observation> {
        self.cash = self.init.sample_cash();
        self.quantities = self.init.sample_quantities(self.feed.metadata().n_assets());

        self.feed.rewind();
        self.chunk = self.feed.next_chunk()?;
        self.row = 0;

        if self.chunk.is_none() {
            return Err(EnvError::InvalidState(
                "feed partition is empty, nothing to replay".to_string(),
            )
            .into());
        }

        self.status = EnvStatus::Running;
        debug!(
            span = ?self.feed.span(),
            cash = self.cash.0,
            "environment reset"
        );
        self.observation()
    }

    /// Executes `actions` at current prices, advances one tick, and returns
    /// the next observation with the equity-delta reward. The outcome is
    /// `Done` exactly when the feed partition is exhausted.
    pub fn step(&mut self, actions: &Actions) -> MarketGymResult<(Observation, Reward, StepOutcome)> {
        self.check_step_status()?;

        let n_assets = self.feed.metadata().n_assets();
        if actions.len() != n_assets {
            return Err(EnvError::ActionShape {
                expected: n_assets,
                got: actions.len(),
            }
            .into());
        }

        // Execute deltas at current prices. The fill itself is
        // equity-neutral: cash decreases by exactly the value bought.
        let prices = self.prices()?;
        let cost: f64 = actions.0.dot(&prices);
        self.cash = Cash(self.cash.0 - cost);
        self.quantities = &self.quantities + &actions.0;

        let equity_before = self.cash.0 + self.quantities.dot(&prices);

        let outcome = self.advance()?;
        let equity_after = self.equity()?;
        let reward = Reward(equity_after - equity_before);

        if outcome.is_done() {
            self.status = EnvStatus::Done;
        }

        Ok((self.observation()?, reward, outcome))
    }

    // ============================================================================================
    // Internals
    // ============================================================================================

    fn check_step_status(&self) -> MarketGymResult<()> {
        match self.status {
            EnvStatus::Running => Ok(()),
            EnvStatus::Ready => Err(EnvError::InvalidState(
                "environment is not started, call `reset()` before stepping".to_string(),
            )
            .into()),
            EnvStatus::Done => Err(EnvError::InvalidState(
                "feed partition is exhausted, call `reset()` to restart".to_string(),
            )
            .into()),
        }
    }

    /// Moves the cursor one tick forward, pulling the next chunk when the
    /// current one is consumed. Never re-materializes consumed chunks.
    fn advance(&mut self) -> MarketGymResult<StepOutcome> {
        let rows_in_chunk = self
            .chunk
            .as_ref()
            .map(|c| c.nrows())
            .unwrap_or_default();

        if self.row + 1 < rows_in_chunk {
            self.row += 1;
            return Ok(StepOutcome::InProgress);
        }

        match self.feed.next_chunk()? {
            Some(next) => {
                self.chunk = Some(next);
                self.row = 0;
                Ok(StepOutcome::InProgress)
            }
            // Keep the last row current so the terminal observation is valid.
            None => Ok(StepOutcome::Done),
        }
    }

    fn current_row(&self) -> MarketGymResult<ndarray::ArrayView1<'_, f64>> {
        let chunk = self.chunk.as_ref().ok_or_else(|| {
            EnvError::InvalidState("no chunk materialized, call `reset()` first".to_string())
        })?;
        Ok(chunk.row(self.row))
    }

    fn prices(&self) -> MarketGymResult<Array1<f64>> {
        let row = self.current_row()?;
        let md = self.feed.metadata();
        Ok(Array1::from_shape_fn(md.n_assets(), |i| {
            row[md.price_column(i)]
        }))
    }

    fn observation(&self) -> MarketGymResult<Observation> {
        Ok(Observation {
            features: self.current_row()?.to_owned(),
            cash: self.cash,
            quantities: self.quantities.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        domain::{AssetSymbol, Resolution},
        metadata::{ColumnSchema, DatasetMetadata},
        source::InMemoryReader,
    };
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    // ============================================================================================
    // Test Helpers
    // ============================================================================================

    fn metadata() -> DatasetMetadata {
        DatasetMetadata::new(
            "crypto",
            [AssetSymbol::from("BTC")],
            Resolution::Minute(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ColumnSchema::new(["close"], 0).unwrap(),
        )
        .unwrap()
    }

    /// Feed where the price at tick `i` is `i`.
    fn ramp_feed(n_rows: usize, n_chunks: usize) -> MarketFeed {
        let md = metadata();
        let rows = Array2::from_shape_fn((n_rows, 1), |(r, _)| r as f64);
        let reader = Arc::new(InMemoryReader::new(rows, &md).unwrap());
        MarketFeed::new(md, reader, n_chunks).unwrap()
    }

    fn env(n_rows: usize, n_chunks: usize, cash: f64, qty: f64) -> MarketEnv {
        let init = InitialConditions::fixed(Cash(cash), ndarray::array![qty]);
        MarketEnv::new(ramp_feed(n_rows, n_chunks), init).unwrap()
    }

    fn hold() -> Actions {
        Actions::hold(1)
    }

    // ============================================================================================
    // Lifecycle
    // ============================================================================================

    #[test]
    fn step_before_reset_fails() {
        let mut e = env(5, 1, 100.0, 0.0);
        assert!(e.status().is_ready());
        assert!(e.step(&hold()).is_err());
    }

    #[test]
    fn reset_returns_first_observation() {
        let mut e = env(5, 1, 100.0, 2.0);
        let obs = e.reset().unwrap();
        assert_eq!(obs.features[0], 0.0);
        assert_eq!(obs.cash, Cash(100.0));
        assert_eq!(obs.quantities[0], 2.0);
        assert!(e.status().is_running());
    }

    #[test]
    fn done_exactly_when_partition_is_exhausted() {
        let mut e = env(5, 1, 100.0, 0.0);
        e.reset().unwrap();

        for expected_tick in 1..5 {
            let (obs, _, outcome) = e.step(&hold()).unwrap();
            assert!(!outcome.is_done());
            assert_eq!(obs.features[0], expected_tick as f64);
        }

        let (_, _, outcome) = e.step(&hold()).unwrap();
        assert!(outcome.is_done());
        assert!(e.status().is_done());
        assert!(e.step(&hold()).is_err());
    }

    #[test]
    fn chunked_replay_matches_unchunked() {
        for n_chunks in [1usize, 2, 5] {
            let mut e = env(10, n_chunks, 0.0, 0.0);
            e.reset().unwrap();
            let mut ticks = vec![0.0];
            loop {
                let (obs, _, outcome) = e.step(&hold()).unwrap();
                if outcome.is_done() {
                    break;
                }
                ticks.push(obs.features[0]);
            }
            let expected: Vec<f64> = (0..10).map(|i| i as f64).collect();
            assert_eq!(ticks, expected, "n_chunks = {n_chunks}");
        }
    }

    #[test]
    fn reset_restarts_from_partition_start() {
        let mut e = env(4, 2, 100.0, 0.0);
        e.reset().unwrap();
        e.step(&hold()).unwrap();
        e.step(&hold()).unwrap();

        let obs = e.reset().unwrap();
        assert_eq!(obs.features[0], 0.0);
        assert!(e.status().is_running());
    }

    // ============================================================================================
    // Accounting
    // ============================================================================================

    #[test]
    fn holding_one_unit_earns_the_price_delta() {
        let mut e = env(5, 1, 100.0, 1.0);
        e.reset().unwrap();
        // Price ramps by 1 per tick and the account holds one unit.
        let (_, reward, _) = e.step(&hold()).unwrap();
        assert!((reward.0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn buying_debits_cash_at_current_price() {
        let mut e = env(5, 1, 100.0, 0.0);
        e.reset().unwrap();
        e.step(&hold()).unwrap(); // now at tick 1, price 1.0

        let buy = Actions::from(vec![3.0]);
        e.step(&buy).unwrap();
        assert!((e.cash().0 - 97.0).abs() < 1e-12);
        assert_eq!(e.quantities()[0], 3.0);
    }

    #[test]
    fn fills_are_equity_neutral() {
        let mut e = env(2, 1, 100.0, 0.0);
        e.reset().unwrap();
        // Buy at tick 0 (price 0 -> 1): equity delta comes only from the move.
        let (_, reward, _) = e.step(&Actions::from(vec![5.0])).unwrap();
        assert!((reward.0 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn action_shape_is_validated() {
        let mut e = env(5, 1, 100.0, 0.0);
        e.reset().unwrap();
        assert!(e.step(&Actions::from(vec![1.0, 2.0])).is_err());
    }

    // ============================================================================================
    // Initial conditions
    // ============================================================================================

    #[test]
    fn ranged_reset_draws_within_bounds() {
        let init = InitialConditions::fixed(Cash(0.0), ndarray::array![0.0])
            .with_cash_range(50.0, 60.0)
            .unwrap()
            .with_quantity_range(1.0, 2.0)
            .unwrap();
        let mut e = MarketEnv::new(ramp_feed(5, 1), init).unwrap();

        for _ in 0..20 {
            let obs = e.reset().unwrap();
            assert!(obs.cash.0 >= 50.0 && obs.cash.0 <= 60.0);
            assert!(obs.quantities[0] >= 1.0 && obs.quantities[0] <= 2.0);
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let init = InitialConditions::fixed(Cash(0.0), ndarray::array![0.0]);
        assert!(init.with_cash_range(10.0, 5.0).is_err());
    }

    #[test]
    fn quantity_sampling_shape_is_the_asset_count() {
        let md = DatasetMetadata::new(
            "multi",
            [AssetSymbol::from("BTC"), AssetSymbol::from("ETH")],
            Resolution::Minute(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ColumnSchema::new(["close"], 0).unwrap(),
        )
        .unwrap();
        let rows = Array2::from_shape_fn((3, 2), |(r, c)| (r + c) as f64);
        let reader = Arc::new(InMemoryReader::new(rows, &md).unwrap());
        let feed = MarketFeed::new(md, reader, 1).unwrap();

        let init = InitialConditions::fixed(Cash(0.0), ndarray::array![0.0, 0.0])
            .with_quantity_range(1.0, 1.0)
            .unwrap();
        let mut e = MarketEnv::new(feed, init).unwrap();
        let obs = e.reset().unwrap();
        assert_eq!(obs.quantities.len(), 2);
    }
}
