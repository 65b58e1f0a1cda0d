// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Monte-Carlo estimation of ROC operating points. Each trial draws one
//! signal-present and one signal-absent image (independent realizations),
//! and every observer reduces both to discriminants. Thresholding the
//! discriminants and counting exceedances gives the true and false positive
//! rates.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use rand::{thread_rng, RngCore, SeedableRng};
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::image_model::{generate_image, Image, TargetSpec};
use crate::observers::{ObserverContext, ObserverError, ObserverKind};
use crate::stats_funcs::{count_exceeding, detectability_index, empirical_auc,
                         stats_for_samples, SampleStats};

/// Parameters for generating trials and evaluating observers on them.
#[derive(Clone, Debug)]
pub struct EvaluationParams {
    /// Image (height, width).
    pub size: (usize, usize),

    /// The target present in signal-present images.
    pub target: TargetSpec,

    /// Standard deviation of the additive noise in every image.
    pub noise_std: f64,

    /// Statistics, priors, and covariance model handed to the observers.
    pub context: ObserverContext,

    /// Observers to evaluate. Names must be distinct.
    pub observers: Vec<ObserverKind>,

    /// Base seed for the per-trial random streams. If None, a seed is drawn
    /// from the thread RNG, so results are not reproducible.
    pub seed: Option<u64>,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        let target = TargetSpec::default();
        EvaluationParams{size: (64, 64),
                         target,
                         noise_std: 0.1,
                         context: ObserverContext::default(),
                         observers: ObserverKind::all(target.position, target.radius),
                         seed: None}
    }
}

impl EvaluationParams {
    pub fn validate(&self) -> Result<(), ObserverError> {
        let invalid = |msg: String| Err(ObserverError::InvalidParameter(msg));
        let (height, width) = self.size;
        if height == 0 || width == 0 {
            return invalid(format!("image size {}x{} is empty", height, width));
        }
        let (row, col) = self.target.position;
        if !row.is_finite() || !col.is_finite() {
            return invalid(format!("target position {:?} is not finite",
                                   self.target.position));
        }
        if !self.target.amplitude.is_finite() {
            return invalid(format!("target amplitude {} is not finite",
                                   self.target.amplitude));
        }
        if !(self.target.radius >= 0.0) || !self.target.radius.is_finite() {
            return invalid(format!("target radius {} is not a non-negative number",
                                   self.target.radius));
        }
        if !(self.noise_std >= 0.0) || !self.noise_std.is_finite() {
            return invalid(format!("noise std {} is not a non-negative number",
                                   self.noise_std));
        }
        let statistics = &self.context.statistics;
        for (name, mean) in [("background", statistics.background_mean),
                             ("noise", statistics.noise_mean),
                             ("target", statistics.target_mean)] {
            if !mean.is_finite() {
                return invalid(format!("{} mean {} is not finite", name, mean));
            }
        }
        for (name, variance) in [("background", statistics.background_variance),
                                 ("noise", statistics.noise_variance),
                                 ("target", statistics.target_variance)] {
            if !(variance >= 0.0) || !variance.is_finite() {
                return invalid(format!("{} variance {} is not a non-negative number",
                                       name, variance));
            }
        }
        if !self.context.prior.is_normalized() {
            return invalid(format!("class priors {:?} do not sum to one",
                                   self.context.prior));
        }
        if self.observers.is_empty() {
            return invalid("no observers to evaluate".to_string());
        }
        for (i, observer) in self.observers.iter().enumerate() {
            if let ObserverKind::RoiSke{position, radius} = observer {
                if !position.0.is_finite() || !position.1.is_finite() {
                    return invalid(format!("ROI-SKE position {:?} is not finite", position));
                }
                if !(*radius >= 0.0) || !radius.is_finite() {
                    return invalid(format!("ROI-SKE radius {} is not a non-negative number",
                                           radius));
                }
            }
            if self.observers[..i].iter().any(|o| o.name() == observer.name()) {
                return invalid(format!("observer {} is listed twice", observer));
            }
        }
        Ok(())
    }
}

/// Estimated (true positive rate, false positive rate) pair for one
/// threshold.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RocPoint {
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
}

/// Figures of merit for one observer over the whole sample pool.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ObserverSummary {
    pub signal_present: SampleStats,
    pub signal_absent: SampleStats,
    pub detectability: f64,
    pub auc: f64,
}

/// Discriminants of every observer over every trial. Thresholding can be
/// repeated at any number of thresholds without regenerating images.
#[derive(Clone, Debug)]
pub struct DiscriminantSamples {
    observers: Vec<ObserverKind>,
    trial_count: usize,

    // Indexed [observer][trial].
    signal_present: Vec<Vec<f64>>,
    signal_absent: Vec<Vec<f64>>,
}

impl DiscriminantSamples {
    pub fn observers(&self) -> &[ObserverKind] {
        &self.observers
    }

    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    fn index_of(&self, observer: &str) -> Option<usize> {
        self.observers.iter().position(|o| o.name() == observer)
    }

    /// Signal-present discriminants of the named observer, in trial order.
    pub fn signal_present(&self, observer: &str) -> Option<&[f64]> {
        self.index_of(observer).map(|i| self.signal_present[i].as_slice())
    }

    /// Signal-absent discriminants of the named observer, in trial order.
    pub fn signal_absent(&self, observer: &str) -> Option<&[f64]> {
        self.index_of(observer).map(|i| self.signal_absent[i].as_slice())
    }

    /// A trial counts as a true (false) positive when its signal-present
    /// (signal-absent) discriminant strictly exceeds `threshold`.
    pub fn operating_point(&self, observer: &str, threshold: f64) -> Option<RocPoint> {
        let i = self.index_of(observer)?;
        let trials = self.trial_count as f64;
        Some(RocPoint{
            true_positive_rate:
                count_exceeding(&self.signal_present[i], threshold) as f64 / trials,
            false_positive_rate:
                count_exceeding(&self.signal_absent[i], threshold) as f64 / trials})
    }

    /// Operating points of all observers, keyed by observer name.
    pub fn operating_points(&self, threshold: f64) -> BTreeMap<&'static str, RocPoint> {
        self.observers.iter().filter_map(|o| {
            self.operating_point(o.name(), threshold).map(|p| (o.name(), p))
        }).collect()
    }

    pub fn summary(&self, observer: &str) -> Option<ObserverSummary> {
        let i = self.index_of(observer)?;
        let signal_present = stats_for_samples(&self.signal_present[i]);
        let signal_absent = stats_for_samples(&self.signal_absent[i]);
        Some(ObserverSummary{
            signal_present,
            signal_absent,
            detectability: detectability_index(&signal_present, &signal_absent),
            auc: empirical_auc(&self.signal_present[i], &self.signal_absent[i])})
    }
}

// Discriminants of one trial, indexed by observer.
struct TrialResult {
    signal_present: Vec<f64>,
    signal_absent: Vec<f64>,
}

// Draws the signal-present and signal-absent images of one trial. Both come
// from one stream, one after the other, so they share no realization.
fn trial_images(params: &EvaluationParams, seed: u64) -> (Image, Image) {
    let mut rng = StdRng::seed_from_u64(seed);
    let with_target = generate_image(params.size, Some(&params.target),
                                     params.noise_std, &mut rng);
    let without_target = generate_image(params.size, None, params.noise_std, &mut rng);
    (with_target, without_target)
}

fn run_trial(params: &EvaluationParams, seed: u64) -> Result<TrialResult, ObserverError> {
    let (with_target, without_target) = trial_images(params, seed);
    let mut result = TrialResult{
        signal_present: Vec::<f64>::with_capacity(params.observers.len()),
        signal_absent: Vec::<f64>::with_capacity(params.observers.len())};
    for observer in &params.observers {
        result.signal_present.push(observer.discriminant(&with_target, &params.context)?);
        result.signal_absent.push(observer.discriminant(&without_target, &params.context)?);
    }
    Ok(result)
}

/// Runs `trial_count` independent trials and records every observer's
/// discriminants.
///
/// Trials are evaluated in parallel. Trial `i` draws its images from an RNG
/// seeded with the base seed plus `i`, so for a given `params.seed` the
/// samples do not depend on scheduling.
pub fn collect_discriminants(trial_count: usize, params: &EvaluationParams)
                             -> Result<DiscriminantSamples, ObserverError> {
    params.validate()?;
    if trial_count == 0 {
        return Err(ObserverError::InvalidParameter(
            "trial count must be positive".to_string()));
    }
    let collect_start = Instant::now();
    let base_seed = params.seed.unwrap_or_else(|| thread_rng().next_u64());
    debug!("Running {} trials with base seed {}", trial_count, base_seed);

    let trials = (0..trial_count).into_par_iter()
        .map(|trial| run_trial(params, base_seed.wrapping_add(trial as u64)))
        .collect::<Result<Vec<TrialResult>, ObserverError>>()?;

    let observer_count = params.observers.len();
    let mut signal_present = vec![Vec::<f64>::with_capacity(trial_count); observer_count];
    let mut signal_absent = vec![Vec::<f64>::with_capacity(trial_count); observer_count];
    for trial in trials {
        for i in 0..observer_count {
            signal_present[i].push(trial.signal_present[i]);
            signal_absent[i].push(trial.signal_absent[i]);
        }
    }
    info!("Evaluated {} observers over {} trials of {}x{} images in {:?}",
          observer_count, trial_count, params.size.0, params.size.1,
          collect_start.elapsed());
    Ok(DiscriminantSamples{observers: params.observers.clone(),
                           trial_count,
                           signal_present,
                           signal_absent})
}

/// Estimates one ROC operating point per observer at `threshold` from
/// `trial_count` fresh trials.
///
/// # Returns
/// Map from observer name to its [RocPoint].
pub fn evaluate_roc_point(threshold: f64, trial_count: usize, params: &EvaluationParams)
                          -> Result<BTreeMap<&'static str, RocPoint>, ObserverError> {
    let samples = collect_discriminants(trial_count, params)?;
    Ok(samples.operating_points(threshold))
}

/// Sweeps `thresholds` over a single pool of trials. Since all thresholds
/// see the same discriminants, the rates of each observer's curve are
/// non-increasing wherever the thresholds are increasing.
///
/// # Returns
/// Map from observer name to one [RocPoint] per threshold, in the order of
/// `thresholds`.
pub fn roc_curve(thresholds: &[f64], trial_count: usize, params: &EvaluationParams)
                 -> Result<BTreeMap<&'static str, Vec<RocPoint>>, ObserverError> {
    let samples = collect_discriminants(trial_count, params)?;
    let mut curves = BTreeMap::<&'static str, Vec<RocPoint>>::new();
    for observer in samples.observers() {
        let points = thresholds.iter()
            .filter_map(|&t| samples.operating_point(observer.name(), t))
            .collect();
        curves.insert(observer.name(), points);
    }
    Ok(curves)
}

// mod tests.
