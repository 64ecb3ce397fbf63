//! Rate Calculator
//!
//! Turns raw counts into rates and value metrics. Every ratio goes through
//! `Rate::ratio`, so a zero denominator produces `Rate::Undefined` instead of
//! NaN, infinity or a silent zero.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::MetricRecord;

/// Rupees in one Crore (GTV reporting unit)
pub const RUPEES_PER_CRORE: f64 = 10_000_000.0;

/// A ratio that may have no meaningful value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Rate {
    Defined(f64),
    /// Zero denominator; excluded from aggregation, never treated as zero
    Undefined,
}

impl Rate {
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator > 0.0 && numerator.is_finite() && denominator.is_finite() {
            Self::Defined(numerator / denominator)
        } else {
            Self::Undefined
        }
    }

    pub fn from_counts(numerator: u64, denominator: u64) -> Self {
        Self::ratio(numerator as f64, denominator as f64)
    }

    /// Wrap a plain value, treating non-finite input as undefined
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Self::Defined(value)
        } else {
            Self::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Self::Defined(v) => Self::from_value(f(v)),
            Self::Undefined => Self::Undefined,
        }
    }

    /// Fraction in [0,1] to percentage in [0,100]
    pub fn as_percent(self) -> Self {
        self.map(|v| v * 100.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{:.4}", v),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

/// Derived view over one record or a roll-up of many
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub transaction_count: u64,
    pub transaction_success_count: u64,
    /// success / count, in [0,1]
    pub success_rate: Rate,
    /// auth success / auth attempts, in [0,1]
    pub auth_success_rate: Rate,
    /// auth attempts / unique users
    pub per_user_rate: Rate,
    /// Gross transaction value, rupees
    pub gtv: f64,
    pub gtv_crores: f64,
    pub record_count: usize,
    /// At least one contributing record was partial
    pub partial: bool,
}

impl DerivedMetric {
    pub fn from_record(record: &MetricRecord) -> Self {
        Self::rollup(std::iter::once(record))
    }

    /// No traffic: zero counts and value, every ratio undefined
    pub fn empty() -> Self {
        Self::rollup(std::iter::empty())
    }

    /// Sum raw counts first, divide once (ratio of sums).
    ///
    /// Unique users are summed across buckets, which over-counts users seen
    /// in more than one bucket; the store only supplies per-bucket counts.
    pub fn rollup<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricRecord>,
    {
        let mut txn = 0u64;
        let mut txn_success = 0u64;
        let mut value = 0.0f64;
        let mut auth = 0u64;
        let mut auth_success = 0u64;
        let mut users = 0u64;
        let mut record_count = 0usize;
        let mut partial = false;

        for r in records {
            txn = txn.saturating_add(r.transaction_count);
            txn_success = txn_success.saturating_add(r.transaction_success_count);
            if r.transaction_value.is_finite() {
                value += r.transaction_value;
            }
            auth = auth.saturating_add(r.auth_attempt_count);
            auth_success = auth_success.saturating_add(r.auth_success_count);
            users = users.saturating_add(r.unique_user_count);
            record_count += 1;
            partial |= r.is_partial();
        }

        Self {
            transaction_count: txn,
            transaction_success_count: txn_success,
            success_rate: Rate::from_counts(txn_success, txn),
            auth_success_rate: Rate::from_counts(auth_success, auth),
            per_user_rate: Rate::from_counts(auth, users),
            gtv: value,
            gtv_crores: value / RUPEES_PER_CRORE,
            record_count,
            partial,
        }
    }
}

/// Metrics the engine tracks baselines for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    TransactionSuccessRate,
    AuthSuccessRate,
    PerUserAuthRate,
    GtvCrores,
    TransactionCount,
}

impl MetricName {
    pub const TRACKED: [MetricName; 5] = [
        MetricName::TransactionSuccessRate,
        MetricName::AuthSuccessRate,
        MetricName::PerUserAuthRate,
        MetricName::GtvCrores,
        MetricName::TransactionCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionSuccessRate => "transaction_success_rate",
            Self::AuthSuccessRate => "auth_success_rate",
            Self::PerUserAuthRate => "per_user_auth_rate",
            Self::GtvCrores => "gtv_crores",
            Self::TransactionCount => "transaction_count",
        }
    }

    /// Observable value of this metric. Success rates are reported in percent.
    pub fn observe(&self, metric: &DerivedMetric) -> Rate {
        match self {
            Self::TransactionSuccessRate => metric.success_rate.as_percent(),
            Self::AuthSuccessRate => metric.auth_success_rate.as_percent(),
            Self::PerUserAuthRate => metric.per_user_rate,
            Self::GtvCrores => Rate::from_value(metric.gtv_crores),
            Self::TransactionCount => Rate::Defined(metric.transaction_count as f64),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricName {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::TRACKED
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| crate::error::ValidationError::InvalidField {
                field: "metric",
                reason: format!("unknown metric '{}'", s),
            })
    }
}
