//! Anomaly Detector
//!
//! Pure comparison of one observation against its baseline. No state, no I/O:
//! identical inputs always give identical verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::baseline::Baseline;
use crate::error::ValidationError;
use crate::rates::Rate;

/// Threshold k in standard deviations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Sensitivity {
    One,
    #[default]
    Two,
    Three,
}

impl Sensitivity {
    pub fn sigma(&self) -> f64 {
        f64::from(u8::from(*self))
    }
}

impl TryFrom<u8> for Sensitivity {
    type Error = ValidationError;

    fn try_from(sigma: u8) -> Result<Self, Self::Error> {
        match sigma {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(ValidationError::SensitivityOutOfRange { sigma }),
        }
    }
}

impl From<Sensitivity> for u8 {
    fn from(s: Sensitivity) -> u8 {
        match s {
            Sensitivity::One => 1,
            Sensitivity::Two => 2,
            Sensitivity::Three => 3,
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}σ", u8::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Lower,
    Upper,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub direction: Direction,
    /// `None` when the baseline has zero spread and observed != mean
    pub z_score: Option<f64>,
    pub threshold_sigma: f64,
}

impl AnomalyFlag {
    pub fn is_anomaly(&self) -> bool {
        self.direction != Direction::Normal
    }
}

/// Outcome for one (series, observation) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classification {
    Flagged(AnomalyFlag),
    InsufficientData { sample_size: usize, required: usize },
    UndefinedObservation,
}

impl Classification {
    pub fn flag(&self) -> Option<&AnomalyFlag> {
        match self {
            Self::Flagged(flag) => Some(flag),
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.flag().map(|f| f.direction)
    }

    pub fn is_anomaly(&self) -> bool {
        self.flag().is_some_and(AnomalyFlag::is_anomaly)
    }
}

/// Compare an observation with (mean, stddev) at threshold `k`.
///
/// Strict inequalities: z equal to ±k is normal.
pub fn detect(observed: f64, mean: f64, stddev: f64, k: Sensitivity) -> AnomalyFlag {
    let threshold = k.sigma();

    if stddev > 0.0 {
        let z = (observed - mean) / stddev;
        let direction = if z < -threshold {
            Direction::Lower
        } else if z > threshold {
            Direction::Upper
        } else {
            Direction::Normal
        };
        return AnomalyFlag {
            direction,
            z_score: Some(z),
            threshold_sigma: threshold,
        };
    }

    // Zero spread: any deviation at all is outside the band
    let (direction, z_score) = if observed < mean {
        (Direction::Lower, None)
    } else if observed > mean {
        (Direction::Upper, None)
    } else {
        (Direction::Normal, Some(0.0))
    };
    AnomalyFlag {
        direction,
        z_score,
        threshold_sigma: threshold,
    }
}

/// Classify an observation against its baseline.
///
/// A low-confidence baseline yields `InsufficientData` whatever was observed.
pub fn classify(observed: Rate, baseline: &Baseline, k: Sensitivity) -> Classification {
    let Some(stats) = baseline.trusted_stats() else {
        return Classification::InsufficientData {
            sample_size: baseline.sample_size,
            required: baseline.min_samples,
        };
    };
    match observed {
        Rate::Defined(v) => Classification::Flagged(detect(v, stats.mean, stats.stddev, k)),
        Rate::Undefined => Classification::UndefinedObservation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::SeriesKey;
    use crate::rates::MetricName;
    use crate::record::DimensionKey;
    use chrono::NaiveDate;

    fn baseline(samples: &[f64], min_samples: usize) -> Baseline {
        let d = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        Baseline::from_samples(
            SeriesKey::daily(DimensionKey::Overall, MetricName::TransactionSuccessRate),
            d,
            d,
            samples,
            min_samples,
        )
    }

    #[test]
    fn test_lower_anomaly_at_two_sigma() {
        let flag = detect(70.0, 90.0, 5.0, Sensitivity::Two);
        assert_eq!(flag.direction, Direction::Lower);
        assert_eq!(flag.z_score, Some(-4.0));
    }

    #[test]
    fn test_boundary_is_normal() {
        assert_eq!(detect(100.0, 90.0, 5.0, Sensitivity::Two).direction, Direction::Normal);
        assert_eq!(detect(80.0, 90.0, 5.0, Sensitivity::Two).direction, Direction::Normal);
        assert_eq!(detect(100.5, 90.0, 5.0, Sensitivity::Two).direction, Direction::Upper);
        assert_eq!(detect(95.5, 90.0, 5.0, Sensitivity::One).direction, Direction::Upper);
        assert_eq!(detect(75.0, 90.0, 5.0, Sensitivity::Three).direction, Direction::Normal);
    }

    #[test]
    fn test_observed_equal_to_mean_is_normal() {
        let flag = detect(90.0, 90.0, 5.0, Sensitivity::One);
        assert_eq!(flag.direction, Direction::Normal);
        assert_eq!(flag.z_score, Some(0.0));
    }

    #[test]
    fn test_zero_spread() {
        assert_eq!(detect(0.1, 0.1, 0.0, Sensitivity::Three).direction, Direction::Normal);

        let low = detect(0.09, 0.1, 0.0, Sensitivity::Three);
        assert_eq!(low.direction, Direction::Lower);
        assert_eq!(low.z_score, None);

        assert_eq!(detect(0.11, 0.1, 0.0, Sensitivity::One).direction, Direction::Upper);
    }

    #[test]
    fn test_low_confidence_is_insufficient_data() {
        let b = baseline(&[90.0, 91.0, 89.0], 5);
        assert_eq!(
            classify(Rate::Defined(10.0), &b, Sensitivity::One),
            Classification::InsufficientData {
                sample_size: 3,
                required: 5
            }
        );
        // Checked before the observation itself
        assert!(matches!(
            classify(Rate::Undefined, &b, Sensitivity::One),
            Classification::InsufficientData { .. }
        ));
    }

    #[test]
    fn test_undefined_observation() {
        let b = baseline(&[90.0, 91.0, 89.0, 90.0, 90.0], 5);
        assert_eq!(
            classify(Rate::Undefined, &b, Sensitivity::Two),
            Classification::UndefinedObservation
        );
        assert!(classify(Rate::Defined(50.0), &b, Sensitivity::Two).is_anomaly());
    }

    #[test]
    fn test_sensitivity_parsing() {
        assert_eq!(Sensitivity::try_from(3).unwrap().sigma(), 3.0);
        assert_eq!(
            Sensitivity::try_from(4),
            Err(ValidationError::SensitivityOutOfRange { sigma: 4 })
        );
        assert!(Sensitivity::try_from(0).is_err());
        assert_eq!(Sensitivity::default(), Sensitivity::Two);
        assert_eq!(serde_json::to_string(&Sensitivity::Three).unwrap(), "3");
    }
}
