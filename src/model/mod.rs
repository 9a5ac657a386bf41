//! Model assembly module
//!
//! Provides the multi-branch collector:
//! - `WideDeep` and its builder (validation, combine modes, forward pass)
//! - `ModelInput`, the per-branch input batch
//! - `ModelOutput`, the tagged forward-pass output

mod input;
mod output;
mod wide_deep;

pub use input::ModelInput;
pub use output::ModelOutput;
pub use wide_deep::{WideDeep, WideDeepBuilder};
