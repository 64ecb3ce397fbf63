//! Sample statistics used by the baseline estimator

use serde::{Deserialize, Serialize};

/// Summary of a non-empty sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    /// Unbiased sample standard deviation (n - 1 denominator)
    pub stddev: f64,
    pub median: f64,
}

impl SampleStats {
    /// Needs at least two finite samples for an unbiased stddev.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.len() < 2 || samples.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        // Constant series: exact zero spread, mean equal to the value itself
        if sorted[0] == sorted[sorted.len() - 1] {
            return Some(Self {
                mean: sorted[0],
                stddev: 0.0,
                median: sorted[0],
            });
        }

        let mean = mean(samples)?;
        Some(Self {
            mean,
            stddev: sample_stddev(samples, mean)?,
            median: median_sorted(&sorted)?,
        })
    }
}

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

pub fn sample_stddev(samples: &[f64], mean: f64) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let ss: f64 = samples.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some((ss / (samples.len() - 1) as f64).sqrt())
}

pub fn median(samples: &[f64]) -> Option<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    median_sorted(&sorted)
}

fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}
