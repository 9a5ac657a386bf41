//! One-dimensional batch normalization

use ndarray::{Array1, Array2, Axis};

/// Batch normalization over the feature axis of `[batch, features]` inputs.
///
/// While training, each batch is normalized with its own statistics and the
/// running estimates move toward them at `momentum`. At eval the running
/// estimates are frozen and reused, so inference is deterministic.
#[derive(Debug, Clone)]
pub struct BatchNorm1d {
    num_features: usize,
    momentum: f64,
    eps: f64,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    gamma: Array1<f64>,
    beta: Array1<f64>,
    training: bool,
}

impl BatchNorm1d {
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            momentum: 0.1,
            eps: 1e-5,
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            training: true,
        }
    }

    pub fn train(&mut self) {
        self.training = true;
    }

    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Number of normalized features
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Forward pass
    pub fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let (mean, var) = if self.training {
            let mean = x
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(self.num_features));
            let var = x.var_axis(Axis(0), 0.0);
            self.running_mean = blend(&self.running_mean, &mean, self.momentum);
            self.running_var = blend(&self.running_var, &var, self.momentum);
            (mean, var)
        } else {
            (self.running_mean.clone(), self.running_var.clone())
        };

        let std = var.mapv(|v| (v + self.eps).sqrt());
        (x - &mean) / &std * &self.gamma + &self.beta
    }
}

/// Momentum update moving `prev` toward `new`
fn blend(prev: &Array1<f64>, new: &Array1<f64>, momentum: f64) -> Array1<f64> {
    prev * (1.0 - momentum) + new * momentum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_training_normalizes_batch() {
        let mut bn = BatchNorm1d::new(2);
        let x = array![[1.0, 10.0], [3.0, 30.0], [5.0, 50.0]];

        let out = bn.forward(&x);

        for col in 0..2 {
            let mean: f64 = out.column(col).iter().sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-9, "column {} should be centered", col);
        }
    }

    #[test]
    fn test_eval_uses_running_stats() {
        let mut bn = BatchNorm1d::new(1);
        let x = array![[4.0], [6.0]];

        // one training pass moves the running mean toward 5.0
        bn.forward(&x);
        bn.eval();

        let out_a = bn.forward(&array![[5.0]]);
        let out_b = bn.forward(&array![[5.0]]);
        assert_eq!(out_a, out_b, "eval mode must not mutate running stats");
    }

    #[test]
    fn test_forward_shape() {
        let mut bn = BatchNorm1d::new(10);
        let x = Array2::from_shape_fn((32, 10), |_| rand::random::<f64>());

        let out = bn.forward(&x);
        assert_eq!(out.shape(), &[32, 10]);
    }
}
