use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use widedeep::prelude::*;

/// A real dense sub-network so the bench exercises realistic tensor work
struct DenseBranch {
    weight: Array2<f64>,
}

impl DenseBranch {
    fn new(input_dim: usize, output_dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let weight = Array2::from_shape_fn((input_dim, output_dim), |_| rng.gen::<f64>() - 0.5);
        Self { weight }
    }
}

impl ModelComponent for DenseBranch {
    fn forward(&mut self, input: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(input.dot(&self.weight))
    }

    fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn dropout_rate(&self) -> f64 {
        0.0
    }
}

fn random_batch(rows: usize, cols: usize) -> Array2<f64> {
    let mut rng = rand::thread_rng();
    Array2::from_shape_fn((rows, cols), |_| rng.gen::<f64>())
}

fn bench_per_branch_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("per_branch_forward");

    let mut model = WideDeep::builder()
        .with_wide(DenseBranch::new(10, 1))
        .with_tabular(DenseBranch::new(20, 16))
        .build()
        .unwrap();
    model.eval();

    for batch in [128, 1024, 8192].iter() {
        let input = ModelInput::new()
            .with_wide(random_batch(*batch, 10))
            .with_tabular(random_batch(*batch, 20));

        group.bench_with_input(BenchmarkId::new("forward", batch), &input, |b, input| {
            b.iter(|| model.forward(black_box(input)).unwrap())
        });
    }

    group.finish();
}

fn bench_head_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("head_forward");

    let mut model = WideDeep::builder()
        .with_tabular(DenseBranch::new(20, 16))
        .with_text(DenseBranch::new(30, 8))
        .with_head(
            MlpConfig::default()
                .with_hidden_dims(vec![32, 16])
                .with_dropout(0.0),
        )
        .build()
        .unwrap();
    model.eval();

    for batch in [128, 1024, 8192].iter() {
        let input = ModelInput::new()
            .with_tabular(random_batch(*batch, 20))
            .with_text(random_batch(*batch, 30));

        group.bench_with_input(BenchmarkId::new("forward", batch), &input, |b, input| {
            b.iter(|| model.forward(black_box(input)).unwrap())
        });
    }

    group.finish();
}

fn bench_smoothed_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("smoothed_training");
    group.sample_size(10);

    let mut model = WideDeep::builder()
        .with_tabular(DenseBranch::new(20, 16))
        .with_smoothing_config(
            FdsConfig::new()
                .with_n_buckets(50)
                .with_target_range(0.0, 50.0),
        )
        .build()
        .unwrap();

    // plant statistics so the bench measures real calibration
    let warmup = random_batch(2048, 16);
    let warmup_targets = Array1::from_shape_fn(2048, |i| (i % 50) as f64);
    {
        let fds = model.smoothing_mut().unwrap();
        fds.update_running_stats(&warmup, &warmup_targets, 0).unwrap();
        fds.refresh_smoothed_stats();
    }

    for batch in [128, 1024, 8192].iter() {
        let input = ModelInput::new().with_tabular(random_batch(*batch, 20));
        let targets = Array1::from_shape_fn(*batch, |i| (i % 50) as f64);

        group.bench_with_input(BenchmarkId::new("forward", batch), &input, |b, input| {
            b.iter(|| {
                model
                    .forward_with_targets(black_box(input), &targets, 1)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_per_branch_forward,
    bench_head_forward,
    bench_smoothed_training
);
criterion_main!(benches);
