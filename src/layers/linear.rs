//! Dense linear layer

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Fully connected layer: `y = x . W + b`
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weights of shape `[in_features, out_features]`
    weight: Array2<f64>,
    /// Bias of shape `[out_features]`, absent for bias-free projections
    bias: Option<Array1<f64>>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a layer with Xavier/Glorot-initialized weights and zero bias
    pub fn new(in_features: usize, out_features: usize, random_state: Option<u64>) -> Self {
        Self::init(in_features, out_features, true, random_state)
    }

    /// Create a bias-free layer (used for the attentive prediction projection)
    pub fn without_bias(in_features: usize, out_features: usize, random_state: Option<u64>) -> Self {
        Self::init(in_features, out_features, false, random_state)
    }

    fn init(
        in_features: usize,
        out_features: usize,
        with_bias: bool,
        random_state: Option<u64>,
    ) -> Self {
        let mut rng = match random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        // Xavier/Glorot initialization
        let scale = (2.0 / (in_features + out_features) as f64).sqrt();
        let weight = Array2::from_shape_fn((in_features, out_features), |_| {
            rng.gen::<f64>() * 2.0 * scale - scale
        });

        let bias = if with_bias {
            Some(Array1::zeros(out_features))
        } else {
            None
        };

        Self {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    /// Forward pass over a batch of shape `[batch, in_features]`
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let out = x.dot(&self.weight);
        match &self.bias {
            Some(b) => out + b,
            None => out,
        }
    }

    /// Input feature width
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output feature width
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Whether the layer carries a bias term
    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }
}
