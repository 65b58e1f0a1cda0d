// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub stddev: f64,
}

/// Mean and (population) standard deviation of `samples`.
pub fn stats_for_samples(samples: &[f64]) -> SampleStats {
    if samples.is_empty() {
        return SampleStats{mean: 0.0, stddev: 0.0};
    }
    let count = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / count;
    let second_moment: f64 =
        samples.iter().map(|s| (s - mean) * (s - mean)).sum();
    let stddev = (second_moment / count).sqrt();
    SampleStats{mean, stddev}
}

/// Returns the detectability index d' of a discriminant, given its statistics
/// under signal-present and signal-absent conditions:
///
/// d' = (mean_1 - mean_0) / sqrt((var_1 + var_0) / 2)
///
/// If both classes have zero spread, the result is 0 when the means coincide
/// and signed infinity otherwise.
pub fn detectability_index(present: &SampleStats, absent: &SampleStats) -> f64 {
    let mean_difference = present.mean - absent.mean;
    let pooled_variance =
        (present.stddev * present.stddev + absent.stddev * absent.stddev) / 2.0;
    if pooled_variance == 0.0 {
        return match mean_difference.partial_cmp(&0.0) {
            Some(Ordering::Greater) => f64::INFINITY,
            Some(Ordering::Less) => f64::NEG_INFINITY,
            _ => 0.0,
        };
    }
    mean_difference / pooled_variance.sqrt()
}

/// Number of `samples` strictly greater than `threshold`.
pub fn count_exceeding(samples: &[f64], threshold: f64) -> usize {
    samples.iter().filter(|&&s| s > threshold).count()
}

/// Nonparametric (Mann-Whitney) estimate of the area under the ROC curve:
/// the probability that a signal-present discriminant exceeds a
/// signal-absent one, with ties counting one half. Returns 0.5 if either
/// sample set is empty.
pub fn empirical_auc(present: &[f64], absent: &[f64]) -> f64 {
    if present.is_empty() || absent.is_empty() {
        return 0.5;
    }
    let mut sorted_absent = absent.to_vec();
    sorted_absent.sort_by(|a, b| a.total_cmp(b));
    let mut wins = 0.0;
    for p in present {
        let below = sorted_absent.partition_point(|a| a < p);
        let at_or_below = sorted_absent.partition_point(|a| a <= p);
        wins += below as f64 + 0.5 * (at_or_below - below) as f64;
    }
    wins / (present.len() as f64 * absent.len() as f64)
}

// mod tests.
