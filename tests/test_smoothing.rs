//! Integration test: feature distribution smoothing trainer loop

use ndarray::{Array1, Array2};
use widedeep::prelude::*;

/// Tabular branch with a fixed output and no smoothing dropout, so the
/// training forward pass is deterministic
struct DryBranch {
    width: usize,
    fill: f64,
}

impl ModelComponent for DryBranch {
    fn forward(&mut self, input: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(Array2::from_elem((input.nrows(), self.width), self.fill))
    }

    fn output_dim(&self) -> usize {
        self.width
    }

    fn dropout_rate(&self) -> f64 {
        0.0
    }
}

fn smoothed_model(width: usize, fill: f64) -> WideDeep {
    WideDeep::builder()
        .with_tabular(DryBranch { width, fill })
        .with_smoothing_config(
            FdsConfig::new()
                .with_n_buckets(10)
                .with_target_range(0.0, 10.0)
                .with_kernel_size(3),
        )
        .with_random_state(7)
        .build()
        .unwrap()
}

#[test]
fn test_trainer_feedback_loop_updates_statistics() {
    let mut model = smoothed_model(4, 2.0);

    let input = ModelInput::new().with_tabular(Array2::zeros((6, 8)));
    let targets = Array1::from(vec![1.5, 1.5, 2.5, 2.5, 3.5, 3.5]);

    for epoch in 0..3 {
        let out = model.forward_with_targets(&input, &targets, epoch).unwrap();
        let features = out.raw_features().expect("training exposes raw features");

        let fds = model.smoothing_mut().unwrap();
        fds.update_running_stats(features, &targets, epoch).unwrap();
        fds.refresh_smoothed_stats();
    }

    let fds = model.smoothing().unwrap();
    assert!(fds.smoothed_ready());
    assert_eq!(fds.samples_tracked(), 18);
}

#[test]
fn test_calibration_changes_training_predictions() {
    let mut model = smoothed_model(2, 5.0);

    let input = ModelInput::new().with_tabular(Array2::zeros((4, 8)));
    let targets = Array1::from(vec![2.5; 4]);

    // no statistics yet: the smoothing path is an identity
    let before = model
        .forward_with_targets(&input, &targets, 1)
        .unwrap()
        .into_prediction();

    // plant statistics in two neighboring buckets with differing means
    let fds = model.smoothing_mut().unwrap();
    let hi = Array2::from_elem((8, 2), 10.0);
    let hi_targets = Array1::from(vec![2.5; 8]);
    let lo = Array2::from_elem((8, 2), 0.0);
    let lo_targets = Array1::from(vec![3.5; 8]);
    fds.update_running_stats(&hi, &hi_targets, 0).unwrap();
    fds.update_running_stats(&lo, &lo_targets, 0).unwrap();
    fds.refresh_smoothed_stats();

    let after = model
        .forward_with_targets(&input, &targets, 1)
        .unwrap()
        .into_prediction();

    assert_ne!(
        before, after,
        "calibrated features should change the training prediction"
    );
}

#[test]
fn test_eval_predictions_ignore_statistics() {
    let mut model = smoothed_model(2, 5.0);
    model.eval();

    let input = ModelInput::new().with_tabular(Array2::zeros((4, 8)));
    let before = model.forward(&input).unwrap().into_prediction();

    let fds = model.smoothing_mut().unwrap();
    let hi = Array2::from_elem((8, 2), 10.0);
    let hi_targets = Array1::from(vec![2.5; 8]);
    fds.update_running_stats(&hi, &hi_targets, 0).unwrap();
    fds.refresh_smoothed_stats();

    let after = model.forward(&input).unwrap().into_prediction();
    assert_eq!(before, after, "smoothing is a training-only calibration");
}
