use ndarray::Array1;

/// Per-asset quantity deltas, in metadata asset order. Positive entries buy,
/// negative entries sell; all executions settle at the current tick's prices.
#[derive(Debug, Clone, PartialEq)]
pub struct Actions(pub Array1<f64>);

impl Actions {
    /// The all-zero action: hold every position.
    pub fn hold(n_assets: usize) -> Self {
        Self(Array1::zeros(n_assets))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for Actions {
    fn from(deltas: Vec<f64>) -> Self {
        Self(Array1::from_vec(deltas))
    }
}
