//! Inverted dropout

use ndarray::Array2;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Inverted dropout: zeroes activations with probability `p` while training
/// and rescales survivors by `1 / (1 - p)`, so inference needs no scaling.
#[derive(Debug, Clone)]
pub struct Dropout {
    p: f64,
    rng: Xoshiro256PlusPlus,
    training: bool,
}

impl Dropout {
    /// Create a dropout layer with rate `p`, clamped to `[0, 0.99]`
    pub fn new(p: f64, random_state: Option<u64>) -> Self {
        let rng = match random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        Self {
            p: p.clamp(0.0, 0.99),
            rng,
            training: true,
        }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Configured dropout rate
    pub fn rate(&self) -> f64 {
        self.p
    }

    /// Forward pass
    pub fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        if !self.training || self.p == 0.0 {
            return x.clone();
        }

        let keep = 1.0 - self.p;
        x.mapv(|v| {
            if self.rng.gen::<f64>() < self.p {
                0.0
            } else {
                v / keep
            }
        })
    }
}
