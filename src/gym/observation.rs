use ndarray::Array1;

use crate::data::domain::Cash;

/// What the agent sees after each tick: the raw feature row plus the
/// simulated account state. Observation pipes transform the feature vector
/// before it reaches the policy; the account fields pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub features: Array1<f64>,
    pub cash: Cash,
    pub quantities: Array1<f64>,
}

impl Observation {
    pub fn n_features(&self) -> usize {
        self.features.len()
    }
}
