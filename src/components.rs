//! Capability contracts for sub-network collaborators
//!
//! The model never looks inside a branch: each sub-network is an opaque
//! capability that maps a batch of inputs to a batch of activations and
//! declares how wide those activations are. Any model satisfying the
//! contract can fill a slot, not just components shipped alongside this
//! crate.

use ndarray::Array2;

use crate::error::Result;

/// Default dropout rate assumed for branches that do not declare their own.
pub const DEFAULT_DROPOUT: f64 = 0.1;

/// Contract for the wide branch and for dense deep branches.
///
/// The wide branch's "linear output width" is its `output_dim`; for the
/// deep branches it is the width of the last layer of activations, before
/// any prediction head.
pub trait ModelComponent: Send + Sync {
    /// Map a batch of inputs to a batch of activations of shape
    /// `[batch, output_dim]`.
    fn forward(&mut self, input: &Array2<f64>) -> Result<Array2<f64>>;

    /// Declared width of the activations produced by [`forward`].
    ///
    /// [`forward`]: ModelComponent::forward
    fn output_dim(&self) -> usize;

    /// Dropout rate used internally by this component.
    ///
    /// Consulted only by the feature-smoothing path, which drops smoothed
    /// tabular features at the same rate the branch drops its own.
    fn dropout_rate(&self) -> f64 {
        DEFAULT_DROPOUT
    }

    /// Switch the component between training and inference behavior.
    ///
    /// Components without mode-dependent state can rely on the default.
    fn set_training(&mut self, _training: bool) {}
}

/// Contract for attentive tabular branches (TabNet-style architectures).
///
/// These produce an auxiliary sparsity-regularization loss alongside their
/// activations, which the model carries through to its own output.
pub trait AttentiveComponent: Send + Sync {
    /// Map a batch of inputs to `(activations, sparsity_loss)`.
    fn forward(&mut self, input: &Array2<f64>) -> Result<(Array2<f64>, f64)>;

    /// Declared width of the activations.
    fn output_dim(&self) -> usize;

    /// Switch the component between training and inference behavior.
    fn set_training(&mut self, _training: bool) {}
}

/// Contract for a caller-supplied combined head.
///
/// The head consumes the concatenated activations of every present deep
/// branch, so its declared input width must equal their summed output
/// widths. The declared output width sizes the terminal prediction
/// projection, which the model owns and builds once.
pub trait HeadComponent: Send + Sync {
    /// Map concatenated branch activations to head activations.
    fn forward(&mut self, input: &Array2<f64>) -> Result<Array2<f64>>;

    /// Declared width of the concatenated input this head consumes.
    fn input_dim(&self) -> usize;

    /// Declared width of the activations this head produces.
    fn output_dim(&self) -> usize;

    /// Switch the head between training and inference behavior.
    fn set_training(&mut self, _training: bool) {}
}

/// The tabular slot of the model, tagged by branch kind.
///
/// The attentive (TabNet-style) special case is resolved here, once, by the
/// variant the caller supplies; the forward pass never inspects runtime
/// types to decide whether an auxiliary loss exists.
pub enum TabularComponent {
    /// A dense tabular branch producing plain activations.
    Dense(Box<dyn ModelComponent>),
    /// An attentive branch producing activations plus a sparsity loss.
    Attentive(Box<dyn AttentiveComponent>),
}

impl TabularComponent {
    /// Declared activation width of the underlying branch.
    pub fn output_dim(&self) -> usize {
        match self {
            TabularComponent::Dense(c) => c.output_dim(),
            TabularComponent::Attentive(c) => c.output_dim(),
        }
    }

    /// Whether this slot holds the attentive variant.
    pub fn is_attentive(&self) -> bool {
        matches!(self, TabularComponent::Attentive(_))
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        match self {
            TabularComponent::Dense(c) => c.set_training(training),
            TabularComponent::Attentive(c) => c.set_training(training),
        }
    }
}
