//! Stacked dense head
//!
//! A sequence of dense blocks used as the combined head over concatenated
//! branch activations. Block layout follows the classic LinBnDrop ordering:
//! normalization and dropout either before or after the linear transform,
//! selected by `linear_first`.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{offset_seed, BatchNorm1d, Dropout, HeadActivation, Linear};

/// Configuration for the stacked dense head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Activation function applied after each linear transform
    pub activation: HeadActivation,
    /// Dropout rate inside each block (0 disables the layer)
    pub dropout: f64,
    /// Batch-normalize dense blocks
    pub batchnorm: bool,
    /// Batch-normalize the last block as well
    pub batchnorm_last: bool,
    /// Apply the linear transform before normalization and dropout
    pub linear_first: bool,
    /// Random seed for weight initialization
    pub random_state: Option<u64>,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_dims: vec![100],
            activation: HeadActivation::default(),
            dropout: 0.1,
            batchnorm: false,
            batchnorm_last: false,
            linear_first: false,
            random_state: Some(42),
        }
    }
}

impl MlpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_dims(mut self, hidden_dims: Vec<usize>) -> Self {
        self.hidden_dims = hidden_dims;
        self
    }

    pub fn with_activation(mut self, activation: HeadActivation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_batchnorm(mut self, batchnorm: bool) -> Self {
        self.batchnorm = batchnorm;
        self
    }

    pub fn with_batchnorm_last(mut self, batchnorm_last: bool) -> Self {
        self.batchnorm_last = batchnorm_last;
        self
    }

    pub fn with_linear_first(mut self, linear_first: bool) -> Self {
        self.linear_first = linear_first;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// One dense block: linear + activation, with optional normalization and
/// dropout placed according to `linear_first`.
#[derive(Debug, Clone)]
struct DenseBlock {
    norm: Option<BatchNorm1d>,
    dropout: Option<Dropout>,
    linear: Linear,
    activation: HeadActivation,
    linear_first: bool,
}

impl DenseBlock {
    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        if self.linear_first {
            let mut out = self.activation.apply(&self.linear.forward(x));
            if let Some(norm) = &mut self.norm {
                out = norm.forward(&out);
            }
            if let Some(dropout) = &mut self.dropout {
                out = dropout.forward(&out);
            }
            out
        } else {
            let mut out = match &mut self.norm {
                Some(norm) => norm.forward(x),
                None => x.clone(),
            };
            if let Some(dropout) = &mut self.dropout {
                out = dropout.forward(&out);
            }
            self.activation.apply(&self.linear.forward(&out))
        }
    }

    fn train(&mut self) {
        if let Some(norm) = &mut self.norm {
            norm.train();
        }
        if let Some(dropout) = &mut self.dropout {
            dropout.train();
        }
    }

    fn eval(&mut self) {
        if let Some(norm) = &mut self.norm {
            norm.eval();
        }
        if let Some(dropout) = &mut self.dropout {
            dropout.eval();
        }
    }
}

/// Stacked dense head over a flat feature vector.
///
/// An empty `hidden_dims` list yields an identity head whose output width
/// equals its input width.
#[derive(Debug, Clone)]
pub struct Mlp {
    blocks: Vec<DenseBlock>,
    input_dim: usize,
    output_dim: usize,
}

impl Mlp {
    pub fn new(input_dim: usize, config: &MlpConfig) -> Self {
        let mut dims = Vec::with_capacity(config.hidden_dims.len() + 1);
        dims.push(input_dim);
        dims.extend(config.hidden_dims.iter().copied());

        let mut blocks = Vec::with_capacity(config.hidden_dims.len());
        for i in 1..dims.len() {
            let (inp, out) = (dims[i - 1], dims[i]);
            let last = i == dims.len() - 1;
            let has_norm = config.batchnorm && (!last || config.batchnorm_last);

            // the linear layer drops its bias when normalization absorbs it
            let linear_seed = offset_seed(config.random_state, 2 * i as u64);
            let linear = if has_norm {
                Linear::without_bias(inp, out, linear_seed)
            } else {
                Linear::new(inp, out, linear_seed)
            };

            let norm_width = if config.linear_first { out } else { inp };
            let norm = has_norm.then(|| BatchNorm1d::new(norm_width));

            let dropout = (config.dropout > 0.0).then(|| {
                Dropout::new(
                    config.dropout,
                    offset_seed(config.random_state, 2 * i as u64 + 1),
                )
            });

            blocks.push(DenseBlock {
                norm,
                dropout,
                linear,
                activation: config.activation,
                linear_first: config.linear_first,
            });
        }

        let output_dim = config.hidden_dims.last().copied().unwrap_or(input_dim);
        Self {
            blocks,
            input_dim,
            output_dim,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for block in &mut self.blocks {
            out = block.forward(&out);
        }
        out
    }

    pub fn train(&mut self) {
        for block in &mut self.blocks {
            block.train();
        }
    }

    pub fn eval(&mut self) {
        for block in &mut self.blocks {
            block.eval();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape() {
        let config = MlpConfig::default()
            .with_hidden_dims(vec![8, 4])
            .with_dropout(0.0);
        let mut mlp = Mlp::new(6, &config);

        let x = Array2::from_elem((5, 6), 0.5);
        let out = mlp.forward(&x);

        assert_eq!(out.dim(), (5, 4));
        assert_eq!(mlp.input_dim(), 6);
        assert_eq!(mlp.output_dim(), 4);
    }

    #[test]
    fn test_empty_hidden_dims_is_identity() {
        let config = MlpConfig::default().with_hidden_dims(vec![]);
        let mut mlp = Mlp::new(7, &config);

        let x = Array2::from_shape_fn((3, 7), |(i, j)| (i * 7 + j) as f64);
        assert_eq!(mlp.forward(&x), x);
        assert_eq!(mlp.output_dim(), 7);
    }

    #[test]
    fn test_seeded_determinism() {
        let config = MlpConfig::default()
            .with_hidden_dims(vec![10, 3])
            .with_dropout(0.0)
            .with_random_state(7);
        let mut a = Mlp::new(4, &config);
        let mut b = Mlp::new(4, &config);

        let x = Array2::from_elem((2, 4), 1.0);
        assert_eq!(a.forward(&x), b.forward(&x));
    }

    #[test]
    fn test_batchnorm_skips_last_block_by_default() {
        let config = MlpConfig::default()
            .with_hidden_dims(vec![8, 4])
            .with_batchnorm(true);
        let mlp = Mlp::new(6, &config);

        assert!(mlp.blocks[0].norm.is_some());
        assert!(mlp.blocks[1].norm.is_none());
        // bias is absorbed by normalization where present
        assert!(!mlp.blocks[0].linear.has_bias());
        assert!(mlp.blocks[1].linear.has_bias());
    }

    #[test]
    fn test_batchnorm_last_enables_final_block_norm() {
        let config = MlpConfig::default()
            .with_hidden_dims(vec![8, 4])
            .with_batchnorm(true)
            .with_batchnorm_last(true);
        let mlp = Mlp::new(6, &config);

        assert!(mlp.blocks[1].norm.is_some());
    }

    #[test]
    fn test_eval_mode_is_deterministic_with_dropout() {
        let config = MlpConfig::default()
            .with_hidden_dims(vec![8])
            .with_dropout(0.5);
        let mut mlp = Mlp::new(6, &config);
        mlp.eval();

        let x = Array2::from_elem((4, 6), 0.3);
        let first = mlp.forward(&x);
        let second = mlp.forward(&x);
        assert_eq!(first, second);
    }
}
