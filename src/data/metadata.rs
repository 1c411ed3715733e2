use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{AssetSymbol, Resolution},
    error::{DataError, MarketGymResult},
};

/// Column layout shared by every row of one dataset.
///
/// Rows are flat `f64` vectors laid out as `n_assets` contiguous blocks, one
/// block of `per_asset` feature columns per asset, in metadata asset order.
/// `price_index` names the column inside each block that carries the asset's
/// tradeable price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    per_asset: Box<[String]>,
    price_index: usize,
}

impl ColumnSchema {
    pub fn new(
        per_asset: impl IntoIterator<Item = impl Into<String>>,
        price_index: usize,
    ) -> MarketGymResult<Self> {
        let per_asset: Box<[String]> = per_asset.into_iter().map(Into::into).collect();
        if per_asset.is_empty() {
            return Err(DataError::InvalidSchema(
                "schema must declare at least one column per asset".to_string(),
            )
            .into());
        }
        if price_index >= per_asset.len() {
            return Err(DataError::InvalidSchema(format!(
                "price_index {price_index} out of bounds for {} columns per asset",
                per_asset.len()
            ))
            .into());
        }
        Ok(Self {
            per_asset,
            price_index,
        })
    }

    pub fn columns_per_asset(&self) -> usize {
        self.per_asset.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.per_asset
    }

    pub fn price_index(&self) -> usize {
        self.price_index
    }
}

/// Immutable description of one dataset: asset universe, time resolution,
/// horizon start, and column schema. Shared by every partition derived from
/// the dataset.
///
/// Two metadata instances must compare equal, field for field, for a training
/// session to accept a dataset against an already-configured agent. Partial
/// compatibility is not accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    name: String,
    assets: Box<[AssetSymbol]>,
    resolution: Resolution,
    start: DateTime<Utc>,
    schema: ColumnSchema,
}

impl DatasetMetadata {
    pub fn new(
        name: impl Into<String>,
        assets: impl IntoIterator<Item = AssetSymbol>,
        resolution: Resolution,
        start: DateTime<Utc>,
        schema: ColumnSchema,
    ) -> MarketGymResult<Self> {
        let assets: Box<[AssetSymbol]> = assets.into_iter().collect();
        if assets.is_empty() {
            return Err(DataError::InvalidSchema(
                "asset universe must not be empty".to_string(),
            )
            .into());
        }
        Ok(Self {
            name: name.into(),
            assets,
            resolution,
            start,
            schema,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assets(&self) -> &[AssetSymbol] {
        &self.assets
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Total feature width of one row.
    pub fn n_features(&self) -> usize {
        self.n_assets() * self.schema.columns_per_asset()
    }

    /// Flat row index of asset `i`'s price column.
    pub fn price_column(&self, asset_idx: usize) -> usize {
        asset_idx * self.schema.columns_per_asset() + self.schema.price_index()
    }

    /// Joins two dataset descriptions column-wise into one wider universe.
    ///
    /// Used when a source is opened without a dataset name and all datasets
    /// are replayed together. Both sides must agree on resolution, horizon
    /// start, and per-asset column layout; the asset universes are
    /// concatenated in order (self first).
    pub fn join(&self, other: &Self) -> MarketGymResult<Self> {
        if self.resolution != other.resolution {
            return Err(DataError::IncompatibleJoin(format!(
                "resolution {} != {}",
                self.resolution, other.resolution
            ))
            .into());
        }
        if self.start != other.start {
            return Err(DataError::IncompatibleJoin(format!(
                "horizon start {} != {}",
                self.start, other.start
            ))
            .into());
        }
        if self.schema != other.schema {
            return Err(DataError::IncompatibleJoin(
                "per-asset column schemas differ".to_string(),
            )
            .into());
        }

        let assets = self
            .assets
            .iter()
            .chain(other.assets.iter())
            .cloned()
            .collect::<Box<[_]>>();

        Ok(Self {
            name: format!("{}+{}", self.name, other.name),
            assets,
            resolution: self.resolution,
            start: self.start,
            schema: self.schema.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schema() -> ColumnSchema {
        ColumnSchema::new(["close", "volume"], 0).unwrap()
    }

    fn metadata(name: &str, assets: &[&str]) -> DatasetMetadata {
        DatasetMetadata::new(
            name,
            assets.iter().map(|s| AssetSymbol::from(*s)),
            Resolution::Minute(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            schema(),
        )
        .unwrap()
    }

    #[test]
    fn price_index_must_be_in_bounds() {
        assert!(ColumnSchema::new(["close"], 1).is_err());
        assert!(ColumnSchema::new(["close"], 0).is_ok());
    }

    #[test]
    fn empty_universe_rejected() {
        let result = DatasetMetadata::new(
            "empty",
            std::iter::empty(),
            Resolution::Minute(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            schema(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn feature_width_counts_all_asset_blocks() {
        let md = metadata("crypto", &["BTC", "ETH", "SOL"]);
        assert_eq!(md.n_assets(), 3);
        assert_eq!(md.n_features(), 6);
        assert_eq!(md.price_column(0), 0);
        assert_eq!(md.price_column(2), 4);
    }

    #[test]
    fn equality_is_field_for_field() {
        let a = metadata("crypto", &["BTC", "ETH"]);
        let b = metadata("crypto", &["BTC", "ETH"]);
        let c = metadata("crypto", &["BTC", "SOL"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn join_concatenates_universes_in_order() {
        let a = metadata("spot", &["BTC", "ETH"]);
        let b = metadata("alts", &["SOL"]);
        let joined = a.join(&b).unwrap();
        assert_eq!(joined.n_assets(), 3);
        assert_eq!(joined.assets()[2], AssetSymbol::from("SOL"));
        assert_eq!(joined.name(), "spot+alts");
    }

    #[test]
    fn join_rejects_mismatched_resolution() {
        let a = metadata("spot", &["BTC"]);
        let mut b = metadata("alts", &["SOL"]);
        b.resolution = Resolution::Hour(1);
        assert!(a.join(&b).is_err());
    }
}
