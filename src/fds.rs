//! Feature Distribution Smoothing (FDS)
//!
//! A training-time calibration layer for single-output regression on skewed
//! target distributions. Targets are binned into buckets; per-bucket running
//! mean/variance of the penultimate features are tracked across training, a
//! kernel window smooths those statistics across neighboring buckets, and
//! `smooth` re-calibrates each feature row from its bucket's running
//! statistics to the smoothed ones (whiten and recolor).
//!
//! Trainer loop: feed raw features and targets to [`FdsLayer::update_running_stats`]
//! while training, call [`FdsLayer::refresh_smoothed_stats`] at each epoch
//! boundary, and the model applies [`FdsLayer::smooth`] in its training
//! forward pass from `start_smooth` onwards.

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WideDeepError};

const EPS: f64 = 1e-5;

/// Kernel used to smooth statistics across neighboring target buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingKernel {
    /// Gaussian window with bandwidth `sigma`
    Gaussian,
    /// Symmetric triangular window
    Triangular,
    /// Laplace window with scale `sigma`
    Laplace,
}

impl Default for SmoothingKernel {
    fn default() -> Self {
        Self::Gaussian
    }
}

/// Feature Distribution Smoothing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdsConfig {
    /// Width of the feature rows being calibrated (0 = filled in by the model
    /// from the tabular branch output width)
    pub feature_dim: usize,
    /// Number of target buckets
    pub n_buckets: usize,
    /// Lowest bucket index in use; targets below it are clamped up
    pub bucket_start: usize,
    /// Lower edge of the target range
    pub y_min: f64,
    /// Upper edge of the target range
    pub y_max: f64,
    /// First epoch at which running statistics are updated
    pub start_update: usize,
    /// First epoch at which calibration is applied
    pub start_smooth: usize,
    /// Kernel window shape
    pub kernel: SmoothingKernel,
    /// Kernel window size (odd)
    pub kernel_size: usize,
    /// Kernel bandwidth
    pub sigma: f64,
    /// Weight of the newest batch statistics in the running update
    pub momentum: f64,
    /// Lower clip for the variance re-scaling ratio
    pub clip_min: Option<f64>,
    /// Upper clip for the variance re-scaling ratio
    pub clip_max: Option<f64>,
}

impl Default for FdsConfig {
    fn default() -> Self {
        Self {
            feature_dim: 0,
            n_buckets: 100,
            bucket_start: 0,
            y_min: 0.0,
            y_max: 100.0,
            start_update: 0,
            start_smooth: 1,
            kernel: SmoothingKernel::default(),
            kernel_size: 5,
            sigma: 2.0,
            momentum: 0.1,
            clip_min: None,
            clip_max: None,
        }
    }
}

impl FdsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature_dim(mut self, feature_dim: usize) -> Self {
        self.feature_dim = feature_dim;
        self
    }

    pub fn with_n_buckets(mut self, n_buckets: usize) -> Self {
        self.n_buckets = n_buckets;
        self
    }

    pub fn with_bucket_start(mut self, bucket_start: usize) -> Self {
        self.bucket_start = bucket_start;
        self
    }

    /// Target range covered by the buckets
    pub fn with_target_range(mut self, y_min: f64, y_max: f64) -> Self {
        self.y_min = y_min;
        self.y_max = y_max;
        self
    }

    pub fn with_start_update(mut self, start_update: usize) -> Self {
        self.start_update = start_update;
        self
    }

    pub fn with_start_smooth(mut self, start_smooth: usize) -> Self {
        self.start_smooth = start_smooth;
        self
    }

    pub fn with_kernel(mut self, kernel: SmoothingKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_clip(mut self, clip_min: f64, clip_max: f64) -> Self {
        self.clip_min = Some(clip_min);
        self.clip_max = Some(clip_max);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 {
            return Err(WideDeepError::ConfigError(
                "FDS feature_dim must be at least 1".to_string(),
            ));
        }
        if self.n_buckets == 0 {
            return Err(WideDeepError::ConfigError(
                "FDS n_buckets must be at least 1".to_string(),
            ));
        }
        if self.bucket_start >= self.n_buckets {
            return Err(WideDeepError::ConfigError(format!(
                "FDS bucket_start {} must be below n_buckets {}",
                self.bucket_start, self.n_buckets
            )));
        }
        if !(self.y_min < self.y_max) {
            return Err(WideDeepError::ConfigError(format!(
                "FDS target range [{}, {}] is empty",
                self.y_min, self.y_max
            )));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(WideDeepError::ConfigError(format!(
                "FDS kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        if !(self.momentum > 0.0 && self.momentum <= 1.0) {
            return Err(WideDeepError::ConfigError(format!(
                "FDS momentum must be in (0, 1], got {}",
                self.momentum
            )));
        }
        if !(self.sigma > 0.0) {
            return Err(WideDeepError::ConfigError(format!(
                "FDS sigma must be positive, got {}",
                self.sigma
            )));
        }
        if let (Some(lo), Some(hi)) = (self.clip_min, self.clip_max) {
            if lo >= hi {
                return Err(WideDeepError::ConfigError(format!(
                    "FDS clip range [{}, {}] is empty",
                    lo, hi
                )));
            }
        }
        Ok(())
    }
}

/// Feature Distribution Smoothing layer
///
/// Holds per-bucket running and smoothed feature statistics, both shaped
/// `[n_buckets, feature_dim]`.
#[derive(Debug, Clone)]
pub struct FdsLayer {
    config: FdsConfig,
    running_mean: Array2<f64>,
    running_var: Array2<f64>,
    smoothed_mean: Array2<f64>,
    smoothed_var: Array2<f64>,
    samples_tracked: Vec<usize>,
    smoothed_ready: bool,
}

impl FdsLayer {
    pub fn new(config: FdsConfig) -> Result<Self> {
        config.validate()?;

        let shape = (config.n_buckets, config.feature_dim);
        Ok(Self {
            running_mean: Array2::zeros(shape),
            running_var: Array2::ones(shape),
            smoothed_mean: Array2::zeros(shape),
            smoothed_var: Array2::ones(shape),
            samples_tracked: vec![0; config.n_buckets],
            smoothed_ready: false,
            config,
        })
    }

    pub fn config(&self) -> &FdsConfig {
        &self.config
    }

    /// Whether smoothed statistics have been computed since the last reset
    pub fn smoothed_ready(&self) -> bool {
        self.smoothed_ready
    }

    /// Total number of feature rows folded into the running statistics
    pub fn samples_tracked(&self) -> usize {
        self.samples_tracked.iter().sum()
    }

    /// Clear all statistics
    pub fn reset(&mut self) {
        self.running_mean.fill(0.0);
        self.running_var.fill(1.0);
        self.smoothed_mean.fill(0.0);
        self.smoothed_var.fill(1.0);
        self.samples_tracked.iter_mut().for_each(|c| *c = 0);
        self.smoothed_ready = false;
    }

    /// Fold a batch of raw features and their targets into the per-bucket
    /// running statistics. Ignored before `start_update`.
    pub fn update_running_stats(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        epoch: usize,
    ) -> Result<()> {
        self.check_batch(features, labels)?;
        if epoch < self.config.start_update {
            return Ok(());
        }

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.config.n_buckets];
        for (i, &y) in labels.iter().enumerate() {
            groups[self.bucket_index(y)].push(i);
        }

        let d = self.config.feature_dim;
        let momentum = self.config.momentum;
        for (b, rows) in groups.iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let n = rows.len() as f64;

            let mut mean = Array1::<f64>::zeros(d);
            for &i in rows {
                mean += &features.row(i);
            }
            mean /= n;

            let mut var = Array1::<f64>::zeros(d);
            for &i in rows {
                let diff = &features.row(i) - &mean;
                var += &(&diff * &diff);
            }
            var /= n;

            if self.samples_tracked[b] == 0 {
                self.running_mean.row_mut(b).assign(&mean);
                self.running_var.row_mut(b).assign(&var);
            } else {
                let prev_mean = self.running_mean.row(b).to_owned();
                let prev_var = self.running_var.row(b).to_owned();
                self.running_mean
                    .row_mut(b)
                    .assign(&(&prev_mean * (1.0 - momentum) + &mean * momentum));
                self.running_var
                    .row_mut(b)
                    .assign(&(&prev_var * (1.0 - momentum) + &var * momentum));
            }
            self.samples_tracked[b] += rows.len();
        }

        Ok(())
    }

    /// Convolve the running statistics across neighboring buckets with the
    /// configured kernel window. Untracked buckets are skipped and window
    /// weights are renormalized over the tracked neighbors.
    pub fn refresh_smoothed_stats(&mut self) {
        let window = self.kernel_window();
        let half = (self.config.kernel_size / 2) as isize;
        let d = self.config.feature_dim;

        let mut smoothed_mean = self.running_mean.clone();
        let mut smoothed_var = self.running_var.clone();

        for b in self.config.bucket_start..self.config.n_buckets {
            if self.samples_tracked[b] == 0 {
                continue;
            }
            let mut mean_acc = Array1::<f64>::zeros(d);
            let mut var_acc = Array1::<f64>::zeros(d);
            let mut total = 0.0;
            for (k, &w) in window.iter().enumerate() {
                let j = b as isize + k as isize - half;
                if j < self.config.bucket_start as isize || j >= self.config.n_buckets as isize {
                    continue;
                }
                let j = j as usize;
                if self.samples_tracked[j] == 0 {
                    continue;
                }
                mean_acc += &(&self.running_mean.row(j) * w);
                var_acc += &(&self.running_var.row(j) * w);
                total += w;
            }
            if total > 0.0 {
                smoothed_mean.row_mut(b).assign(&(mean_acc / total));
                smoothed_var.row_mut(b).assign(&(var_acc / total));
            }
        }

        self.smoothed_mean = smoothed_mean;
        self.smoothed_var = smoothed_var;
        self.smoothed_ready = self.samples_tracked.iter().any(|&c| c > 0);
        debug!(
            tracked_buckets = self.samples_tracked.iter().filter(|&&c| c > 0).count(),
            ready = self.smoothed_ready,
            "Refreshed smoothed statistics"
        );
    }

    /// Re-calibrate each feature row from its bucket's running statistics to
    /// the smoothed ones. Identity before `start_smooth`, before the first
    /// [`refresh_smoothed_stats`](Self::refresh_smoothed_stats), and for rows
    /// whose bucket was never tracked.
    pub fn smooth(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        epoch: usize,
    ) -> Result<Array2<f64>> {
        self.check_batch(features, labels)?;
        if epoch < self.config.start_smooth || !self.smoothed_ready {
            return Ok(features.clone());
        }

        let n = features.nrows();
        let d = self.config.feature_dim;
        let calibrated: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| self.calibrate_row(features, labels[i], i))
            .collect();

        let flat: Vec<f64> = calibrated.into_iter().flatten().collect();
        Array2::from_shape_vec((n, d), flat).map_err(WideDeepError::from)
    }

    fn calibrate_row(&self, features: &Array2<f64>, label: f64, i: usize) -> Vec<f64> {
        let b = self.bucket_index(label);
        let row = features.row(i);
        if self.samples_tracked[b] == 0 {
            return row.to_vec();
        }

        row.iter()
            .enumerate()
            .map(|(j, &v)| {
                let mut factor =
                    (self.smoothed_var[[b, j]] + EPS) / (self.running_var[[b, j]] + EPS);
                if let Some(lo) = self.config.clip_min {
                    factor = factor.max(lo);
                }
                if let Some(hi) = self.config.clip_max {
                    factor = factor.min(hi);
                }
                (v - self.running_mean[[b, j]]) * factor.sqrt() + self.smoothed_mean[[b, j]]
            })
            .collect()
    }

    fn check_batch(&self, features: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
        if features.ncols() != self.config.feature_dim {
            return Err(WideDeepError::DimensionMismatch {
                context: "FDS feature width".to_string(),
                expected: self.config.feature_dim,
                actual: features.ncols(),
            });
        }
        if labels.len() != features.nrows() {
            return Err(WideDeepError::DimensionMismatch {
                context: "FDS target count".to_string(),
                expected: features.nrows(),
                actual: labels.len(),
            });
        }
        Ok(())
    }

    fn bucket_index(&self, y: f64) -> usize {
        let span = self.config.y_max - self.config.y_min;
        let raw = ((y - self.config.y_min) / span * self.config.n_buckets as f64).floor();
        (raw as isize).clamp(
            self.config.bucket_start as isize,
            self.config.n_buckets as isize - 1,
        ) as usize
    }

    fn kernel_window(&self) -> Vec<f64> {
        let half = (self.config.kernel_size / 2) as isize;
        let sigma = self.config.sigma;
        let raw: Vec<f64> = (-half..=half)
            .map(|x| match self.config.kernel {
                SmoothingKernel::Gaussian => (-((x * x) as f64) / (2.0 * sigma * sigma)).exp(),
                SmoothingKernel::Triangular => 1.0 - x.abs() as f64 / (half as f64 + 1.0),
                SmoothingKernel::Laplace => (-(x.abs() as f64) / sigma).exp(),
            })
            .collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}
