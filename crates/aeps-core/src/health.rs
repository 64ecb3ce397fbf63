//! Health Scorer
//!
//! Weighted composite of transaction success and bio-auth success, with the
//! green/yellow/red tiers used by the operations dashboard.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rates::{DerivedMetric, Rate};

pub const TRANSACTION_WEIGHT: f64 = 0.7;
pub const BIOAUTH_WEIGHT: f64 = 0.3;

/// Tier breakpoints as (green at or above, yellow at or above), in percent
pub const COMPOSITE_TIERS: (f64, f64) = (90.0, 75.0);
pub const TRANSACTION_TIERS: (f64, f64) = (95.0, 85.0);
pub const BIOAUTH_TIERS: (f64, f64) = (90.0, 80.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Green,
    Yellow,
    Red,
}

impl HealthTier {
    pub fn from_score(score: f64, (green, yellow): (f64, f64)) -> Self {
        if score >= green {
            Self::Green
        } else if score >= yellow {
            Self::Yellow
        } else {
            Self::Red
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    /// Success rate in percent
    pub rate_pct: Rate,
    /// `None` when the rate is undefined
    pub tier: Option<HealthTier>,
}

impl ComponentScore {
    fn new(rate_pct: Rate, tiers: (f64, f64)) -> Self {
        Self {
            rate_pct,
            tier: rate_pct.value().map(|v| HealthTier::from_score(v, tiers)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Composite {
    Defined { score: f64, tier: HealthTier },
    /// Either component was undefined
    Undefined,
}

impl Composite {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Defined { score, .. } => Some(*score),
            Self::Undefined => None,
        }
    }

    pub fn tier(&self) -> Option<HealthTier> {
        match self {
            Self::Defined { tier, .. } => Some(*tier),
            Self::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub transaction: ComponentScore,
    pub bioauth: ComponentScore,
    pub composite: Composite,
}

impl HealthScore {
    /// Score from success percentages (0..=100)
    pub fn from_percentages(transaction_pct: Rate, bioauth_pct: Rate) -> Self {
        // Non-finite input is undefined, even when built as `Defined`
        let transaction_pct = transaction_pct.value().map_or(Rate::Undefined, Rate::from_value);
        let bioauth_pct = bioauth_pct.value().map_or(Rate::Undefined, Rate::from_value);
        let composite = match (transaction_pct, bioauth_pct) {
            (Rate::Defined(t), Rate::Defined(b)) => {
                let score = (TRANSACTION_WEIGHT * t + BIOAUTH_WEIGHT * b).clamp(0.0, 100.0);
                Composite::Defined {
                    score,
                    tier: HealthTier::from_score(score, COMPOSITE_TIERS),
                }
            }
            _ => Composite::Undefined,
        };

        Self {
            transaction: ComponentScore::new(transaction_pct, TRANSACTION_TIERS),
            bioauth: ComponentScore::new(bioauth_pct, BIOAUTH_TIERS),
            composite,
        }
    }

    /// Score a roll-up; `None` (no records) scores as undefined
    pub fn from_metric(metric: Option<&DerivedMetric>) -> Self {
        match metric {
            Some(m) => Self::from_percentages(
                m.success_rate.as_percent(),
                m.auth_success_rate.as_percent(),
            ),
            None => Self::from_percentages(Rate::Undefined, Rate::Undefined),
        }
    }
}
