//! Layer building blocks module
//!
//! Provides the model's own head and projection machinery:
//! - Dense (linear) layers with seeded Xavier initialization
//! - Batch normalization with running statistics
//! - Inverted dropout
//! - Stacked dense heads (MLP) built from a config
//! - Element-wise activation kinds

mod activations;
mod batchnorm;
mod dropout;
mod linear;
mod mlp;

pub use activations::{HeadActivation, PositiveActivation};
pub use batchnorm::BatchNorm1d;
pub use dropout::Dropout;
pub use linear::Linear;
pub use mlp::{Mlp, MlpConfig};

/// Derive a per-layer seed from a base seed so stacked layers do not share
/// initial weights. `None` stays `None` (entropy-seeded).
pub(crate) fn offset_seed(seed: Option<u64>, k: u64) -> Option<u64> {
    seed.map(|s| s.wrapping_add(k))
}
