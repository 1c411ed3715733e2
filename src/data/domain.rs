use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{impl_add_sub_mul_div_primitive, impl_from_primitive};

/// Simulated account cash, in quote currency. Prices and per-asset
/// quantities stay raw `f64` columns of the observation tensors.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Cash(pub f64);
impl_from_primitive!(Cash, f64);
impl_add_sub_mul_div_primitive!(Cash, f64);

/// Ticker symbol of one asset in the universe. Ordering of symbols is fixed
/// by [`DatasetMetadata`](crate::data::metadata::DatasetMetadata) and shared
/// by feeds, environments, and pipes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetSymbol(pub String);

impl AssetSymbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetSymbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time resolution of one dataset row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
pub enum Resolution {
    #[strum(to_string = "{0}m")]
    Minute(u32),

    #[strum(to_string = "{0}h")]
    Hour(u32),

    #[strum(to_string = "{0}d")]
    Day(u32),
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Minute(1)
    }
}
