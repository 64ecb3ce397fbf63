//! Mover Ranker
//!
//! Ranks dimension values (states, banks) by signed percentage deviation of
//! their current value from their own historical median.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::baseline::Baseline;
use crate::error::ValidationError;
use crate::rates::{MetricName, Rate};
use crate::record::DimensionKind;

/// Length of each mover list, validated to `[MIN, MAX]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct TopN(usize);

impl TopN {
    pub const MIN: usize = 1;
    pub const MAX: usize = 25;

    pub fn new(n: usize) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&n) {
            return Err(ValidationError::TopNOutOfRange {
                top_n: n,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(n))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for TopN {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<usize> for TopN {
    type Error = ValidationError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<TopN> for usize {
    fn from(n: TopN) -> usize {
        n.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoverOptions {
    pub top_n: TopN,
    /// Gainers must exceed +band, decliners fall below -band
    pub significance_band_pct: Option<f64>,
    /// Values whose current metric is below this are skipped
    pub min_current_value: Option<f64>,
}

/// One dimension value offered for ranking
#[derive(Debug, Clone)]
pub struct MoverCandidate<'a> {
    pub id: String,
    pub current: Rate,
    pub baseline: &'a Baseline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoverEntry {
    pub id: String,
    pub current: f64,
    pub median: f64,
    /// (current - median) / |median| * 100
    pub deviation_pct: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    LowConfidence { sample_size: usize, required: usize },
    ZeroMedian,
    UndefinedCurrent,
    BelowVolumeFloor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excluded {
    pub id: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoverRank {
    pub kind: DimensionKind,
    pub metric: MetricName,
    /// Every eligible value, deviation descending
    pub ranked: Vec<MoverEntry>,
    pub gainers: Vec<MoverEntry>,
    pub decliners: Vec<MoverEntry>,
    pub excluded: Vec<Excluded>,
}

fn eligible(candidate: &MoverCandidate<'_>, options: &MoverOptions) -> Result<MoverEntry, ExclusionReason> {
    let baseline = candidate.baseline;
    let stats = baseline
        .trusted_stats()
        .ok_or(ExclusionReason::LowConfidence {
            sample_size: baseline.sample_size,
            required: baseline.min_samples,
        })?;
    let current = candidate
        .current
        .value()
        .ok_or(ExclusionReason::UndefinedCurrent)?;
    if options.min_current_value.is_some_and(|floor| current < floor) {
        return Err(ExclusionReason::BelowVolumeFloor);
    }
    if stats.median == 0.0 {
        return Err(ExclusionReason::ZeroMedian);
    }

    Ok(MoverEntry {
        id: candidate.id.clone(),
        current,
        median: stats.median,
        deviation_pct: (current - stats.median) / stats.median.abs() * 100.0,
        sample_size: baseline.sample_size,
    })
}

fn by_deviation_desc(a: &MoverEntry, b: &MoverEntry) -> Ordering {
    b.deviation_pct
        .total_cmp(&a.deviation_pct)
        .then_with(|| a.id.cmp(&b.id))
}

fn by_deviation_asc(a: &MoverEntry, b: &MoverEntry) -> Ordering {
    a.deviation_pct
        .total_cmp(&b.deviation_pct)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn rank(
    kind: DimensionKind,
    metric: MetricName,
    candidates: &[MoverCandidate<'_>],
    options: &MoverOptions,
) -> MoverRank {
    let mut ranked = Vec::with_capacity(candidates.len());
    let mut excluded = Vec::new();

    for c in candidates {
        match eligible(c, options) {
            Ok(entry) => ranked.push(entry),
            Err(reason) => excluded.push(Excluded {
                id: c.id.clone(),
                reason,
            }),
        }
    }
    excluded.sort_by(|a, b| a.id.cmp(&b.id));

    let band = options.significance_band_pct.unwrap_or(0.0).abs();
    let top_n = options.top_n.get();

    let mut gainers: Vec<MoverEntry> = ranked
        .iter()
        .filter(|e| e.deviation_pct > band)
        .cloned()
        .collect();
    gainers.sort_by(by_deviation_desc);
    gainers.truncate(top_n);

    let mut decliners: Vec<MoverEntry> = ranked
        .iter()
        .filter(|e| e.deviation_pct < -band)
        .cloned()
        .collect();
    decliners.sort_by(by_deviation_asc);
    decliners.truncate(top_n);

    ranked.sort_by(by_deviation_desc);

    MoverRank {
        kind,
        metric,
        ranked,
        gainers,
        decliners,
        excluded,
    }
}
