//! WideDeep - Multi-branch model assembly
//!
//! This crate assembles a "Wide & Deep" prediction model from independently
//! built sub-networks: a wide (linear) branch plus up to three deep branches
//! (tabular, text, image), merged additively into a `[batch, pred_dim]`
//! prediction. Sub-network internals stay outside the crate behind capability
//! traits; the crate's job is validation, wiring and forward orchestration.
//!
//! # Modules
//!
//! ## Model Assembly
//! - [`model`] - The collector: builder, validation, combine modes, forward pass
//! - [`components`] - Capability traits the pluggable sub-networks implement
//!
//! ## Machinery
//! - [`layers`] - Dense heads, terminal projections, normalization, dropout
//! - [`fds`] - Feature distribution smoothing for skewed regression targets
//!
//! ## Infrastructure
//! - [`error`] - Error types and the crate-wide `Result` alias

// Core error handling
pub mod error;

// Sub-network capability traits
pub mod components;

// Head and projection machinery
pub mod layers;

// Feature distribution smoothing
pub mod fds;

// Model assembly
pub mod model;

pub use error::{Result, WideDeepError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, WideDeepError};

    // Capability traits
    pub use crate::components::{
        AttentiveComponent, HeadComponent, ModelComponent, TabularComponent,
    };

    // Model assembly
    pub use crate::model::{ModelInput, ModelOutput, WideDeep, WideDeepBuilder};

    // Head building and output guards
    pub use crate::layers::{HeadActivation, Mlp, MlpConfig, PositiveActivation};

    // Feature smoothing
    pub use crate::fds::{FdsConfig, FdsLayer, SmoothingKernel};
}
