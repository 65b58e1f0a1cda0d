// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger;
use log::info;
use rand::{thread_rng, RngCore, SeedableRng};
use rand::rngs::StdRng;

use ideal_observer::evaluation::{collect_discriminants, EvaluationParams};
use ideal_observer::image_funcs::render_with_target_outline;
use ideal_observer::image_model::{generate_image, TargetSpec};
use ideal_observer::observers::{ClassPrior, CovarianceModel, ObserverContext,
                                ObserverKind, Task, TaskStatistics};

/// Example program for evaluating the linear observers on synthetic
/// signal-present and signal-absent images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Image height.
    #[arg(long, default_value_t = 64)]
    height: usize,

    /// Image width.
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Row of the target center.
    #[arg(long, default_value_t = 32.0)]
    target_row: f64,

    /// Column of the target center.
    #[arg(long, default_value_t = 32.0)]
    target_col: f64,

    /// Amplitude added within the target disk.
    #[arg(long, default_value_t = -1.5, allow_hyphen_values = true)]
    amplitude: f64,

    /// Radius of the target disk.
    #[arg(long, default_value_t = 8.0)]
    radius: f64,

    /// Standard deviation of the additive noise.
    #[arg(long, default_value_t = 0.1)]
    noise_std: f64,

    /// Target mean declared to the observers. Defaults to the amplitude.
    #[arg(long, allow_hyphen_values = true)]
    target_mean: Option<f64>,

    /// Target variance declared to the observers.
    #[arg(long, default_value_t = 0.0)]
    target_variance: f64,

    /// Background variance declared to the observers.
    #[arg(long, default_value_t = 1.0)]
    background_variance: f64,

    /// Prior probability of signal presence, used by the Hotelling observer.
    #[arg(long, default_value_t = 0.5)]
    signal_probability: f64,

    /// Invert covariances as scalars instead of pseudo-inverting a
    /// constant matrix.
    #[arg(long, default_value_t = false)]
    scalar_covariance: bool,

    /// Number of paired trials.
    #[arg(short, long, default_value_t = 100)]
    trials: usize,

    /// Decision threshold.
    #[arg(long, default_value_t = 4.0, allow_hyphen_values = true)]
    threshold: f64,

    /// Lowest threshold of an optional ROC sweep.
    #[arg(long, default_value_t = -1000.0, allow_hyphen_values = true)]
    sweep_min: f64,

    /// Highest threshold of an optional ROC sweep.
    #[arg(long, default_value_t = 1000.0, allow_hyphen_values = true)]
    sweep_max: f64,

    /// Number of thresholds in the ROC sweep. Zero disables the sweep.
    #[arg(long, default_value_t = 0)]
    sweep_steps: usize,

    /// Random seed. If omitted, each run differs.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory where sample images are written.
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let params = params_from_args(&args);
    params.validate()?;
    let seed = args.seed.unwrap_or_else(|| thread_rng().next_u64());
    info!("Using seed {}", seed);

    show_sample_pair(&params, seed, args.output.as_deref())?;

    let samples = collect_discriminants(
        args.trials, &EvaluationParams{seed: Some(seed), ..params.clone()})?;
    println!("\nROC operating point at threshold {} over {} trials:",
             args.threshold, args.trials);
    for (name, point) in samples.operating_points(args.threshold) {
        println!("{:>10}: TPR {:.3}  FPR {:.3}",
                 name, point.true_positive_rate, point.false_positive_rate);
    }

    if args.sweep_steps > 0 {
        if args.sweep_max < args.sweep_min {
            bail!("Sweep max {} is below sweep min {}", args.sweep_max, args.sweep_min);
        }
        let thresholds = sweep_thresholds(args.sweep_min, args.sweep_max, args.sweep_steps);
        println!("\nROC sweep (threshold, TPR, FPR):");
        for observer in samples.observers() {
            println!("# {}", observer);
            for &t in &thresholds {
                if let Some(point) = samples.operating_point(observer.name(), t) {
                    println!("{:.3}, {:.3}, {:.3}",
                             t, point.true_positive_rate, point.false_positive_rate);
                }
            }
        }
    }

    println!("\nSummary:");
    for observer in samples.observers() {
        if let Some(summary) = samples.summary(observer.name()) {
            println!("{:>10}: d' {:.3}  AUC {:.3}  mean present {:.3}  mean absent {:.3}",
                     observer.name(), summary.detectability, summary.auc,
                     summary.signal_present.mean, summary.signal_absent.mean);
        }
    }
    Ok(())
}

fn params_from_args(args: &Args) -> EvaluationParams {
    let target = TargetSpec{position: (args.target_row, args.target_col),
                            amplitude: args.amplitude,
                            radius: args.radius};
    let statistics = TaskStatistics{
        background_mean: 0.0,
        background_variance: args.background_variance,
        noise_mean: 0.0,
        noise_variance: args.noise_std * args.noise_std,
        target_mean: args.target_mean.unwrap_or(args.amplitude),
        target_variance: args.target_variance};
    let covariance_model = if args.scalar_covariance {
        CovarianceModel::Scalar
    } else {
        CovarianceModel::MatrixPinv
    };
    EvaluationParams{
        size: (args.height, args.width),
        target,
        noise_std: args.noise_std,
        context: ObserverContext{
            statistics,
            prior: ClassPrior::with_signal_probability(args.signal_probability),
            covariance_model},
        observers: ObserverKind::all(target.position, target.radius),
        seed: args.seed}
}

fn sweep_thresholds(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps == 1 {
        return vec![min];
    }
    let step = (max - min) / (steps - 1) as f64;
    (0..steps).map(|i| min + i as f64 * step).collect()
}

// Generates one image of each class, prints every observer's discriminant
// for both, and optionally saves the images.
fn show_sample_pair(params: &EvaluationParams, seed: u64, output: Option<&str>)
                    -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let with_target = generate_image(params.size, Some(&params.target),
                                     params.noise_std, &mut rng);
    let without_target = generate_image(params.size, None, params.noise_std, &mut rng);

    for observer in &params.observers {
        let task = match observer.task() {
            Task::SignalKnownExactly => "SKE",
            Task::SignalKnownStatistically => "SKS",
        };
        println!("{} observer ({}, signal present): {:.4}", observer, task,
                 observer.discriminant(&with_target, &params.context)?);
        println!("{} observer ({}, signal absent): {:.4}", observer, task,
                 observer.discriminant(&without_target, &params.context)?);
    }

    if let Some(output) = output {
        let metadata = fs::metadata(output)
            .with_context(|| format!("Output dir '{}' does not exist?", output))?;
        if !metadata.is_dir() {
            bail!("Output '{}' must be a directory", output);
        }
        for (name, image) in [("with_target.png", &with_target),
                              ("without_target.png", &without_target)] {
            let mut path = PathBuf::from(output);
            path.push(name);
            render_with_target_outline(image, &params.target).save(&path)
                .with_context(|| format!("Could not write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
    }
    Ok(())
}
