//! Activation functions for head layers and the positive-output guard

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Activation function for the stacked dense head layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadActivation {
    /// Hyperbolic tangent
    Tanh,
    /// Rectified Linear Unit
    Relu,
    /// Gaussian Error Linear Unit (tanh approximation)
    Gelu,
    /// Leaky ReLU with negative slope 0.01
    LeakyRelu,
}

impl Default for HeadActivation {
    fn default() -> Self {
        Self::Relu
    }
}

impl HeadActivation {
    /// Apply the activation element-wise
    pub fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            HeadActivation::Tanh => z.mapv(|v| v.tanh()),
            HeadActivation::Relu => z.mapv(|v| v.max(0.0)),
            HeadActivation::Gelu => z.mapv(gelu),
            HeadActivation::LeakyRelu => z.mapv(|v| if v > 0.0 { v } else { 0.01 * v }),
        }
    }
}

/// Activation enforcing a nonnegative final prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositiveActivation {
    /// Smooth approximation of ReLU: `ln(1 + e^x)`
    Softplus,
    /// Rectified Linear Unit
    Relu,
}

impl Default for PositiveActivation {
    fn default() -> Self {
        Self::Softplus
    }
}

impl PositiveActivation {
    /// Apply the activation element-wise
    pub fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            PositiveActivation::Softplus => z.mapv(softplus),
            PositiveActivation::Relu => z.mapv(|v| v.max(0.0)),
        }
    }
}

// tanh form of GELU, accurate to ~1e-3 of the erf definition
fn gelu(v: f64) -> f64 {
    const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
    0.5 * v * (1.0 + (SQRT_2_OVER_PI * (v + 0.044715 * v.powi(3))).tanh())
}

// overflow-safe ln(1 + e^x)
fn softplus(v: f64) -> f64 {
    v.max(0.0) + (-v.abs()).exp().ln_1p()
}
