//! Baseline Estimator and Shared Baseline Cache
//!
//! A baseline summarises the W complete days preceding the evaluation date
//! for one (dimension, metric[, hour]) series. The evaluation date is never
//! part of its own baseline.
//!
//! Baselines are recomputed on every evaluation; upstream data may be
//! corrected retroactively. The cache only makes the latest result visible to
//! concurrent readers: entries are `Arc<Baseline>` replaced wholesale, so a
//! reader sees either the old or the new baseline, never a mix.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::ValidationError;
use crate::rates::{MetricName, Rate};
use crate::record::DimensionKey;
use crate::snapshot::Snapshot;
use crate::stats::SampleStats;

/// Samples required before a baseline is trusted
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Default capacity of a `BaselineCache`
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

// ============================================================================
// WINDOW
// ============================================================================

/// Lookback length in days, validated to `[MIN_DAYS, MAX_DAYS]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LookbackWindow(u32);

impl LookbackWindow {
    pub const MIN_DAYS: u32 = 7;
    pub const MAX_DAYS: u32 = 90;

    pub fn new(days: u32) -> Result<Self, ValidationError> {
        if !(Self::MIN_DAYS..=Self::MAX_DAYS).contains(&days) {
            return Err(ValidationError::WindowOutOfRange {
                days,
                min: Self::MIN_DAYS,
                max: Self::MAX_DAYS,
            });
        }
        Ok(Self(days))
    }

    pub fn days(&self) -> u32 {
        self.0
    }

    /// First day of the window for an evaluation date
    pub fn start(&self, evaluation_date: NaiveDate) -> NaiveDate {
        evaluation_date - Duration::days(i64::from(self.0))
    }

    /// Last day of the window: the day before the evaluation date
    pub fn end(&self, evaluation_date: NaiveDate) -> NaiveDate {
        evaluation_date - Duration::days(1)
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self(Self::MIN_DAYS)
    }
}

// ============================================================================
// BASELINE
// ============================================================================

/// Identity of one observed series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub dimension: DimensionKey,
    pub metric: MetricName,
    /// Hour-of-day profile; `None` for whole-day series
    pub hour: Option<u8>,
}

impl SeriesKey {
    pub fn daily(dimension: DimensionKey, metric: MetricName) -> Self {
        Self {
            dimension,
            metric,
            hour: None,
        }
    }

    pub fn hourly(dimension: DimensionKey, metric: MetricName, hour: u8) -> Self {
        Self {
            dimension,
            metric,
            hour: Some(hour),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hour {
            Some(h) => write!(f, "{}/{}@{:02}h", self.dimension, self.metric, h),
            None => write!(f, "{}/{}", self.dimension, self.metric),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Sufficient,
    /// Fewer samples than required; no anomaly verdicts may be drawn
    Low,
}

/// Rolling statistic for one series over one lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub key: SeriesKey,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub sample_size: usize,
    pub min_samples: usize,
    /// `None` when fewer than two samples exist
    pub stats: Option<SampleStats>,
    pub confidence: Confidence,
}

impl Baseline {
    pub fn from_samples(
        key: SeriesKey,
        window_start: NaiveDate,
        window_end: NaiveDate,
        samples: &[f64],
        min_samples: usize,
    ) -> Self {
        let stats = SampleStats::from_samples(samples);
        let confidence = if samples.len() >= min_samples && stats.is_some() {
            Confidence::Sufficient
        } else {
            Confidence::Low
        };
        Self {
            key,
            window_start,
            window_end,
            sample_size: samples.len(),
            min_samples,
            stats,
            confidence,
        }
    }

    /// Statistics usable for verdicts; `None` for low-confidence baselines
    pub fn trusted_stats(&self) -> Option<&SampleStats> {
        match self.confidence {
            Confidence::Sufficient => self.stats.as_ref(),
            Confidence::Low => None,
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

/// Computes baselines from a snapshot; holds no state between calls
#[derive(Debug, Clone, Copy)]
pub struct BaselineEstimator {
    window: LookbackWindow,
    min_samples: usize,
}

impl BaselineEstimator {
    pub fn new(window: LookbackWindow, min_samples: usize) -> Result<Self, ValidationError> {
        if min_samples < 2 || min_samples > window.days() as usize {
            return Err(ValidationError::MinSamplesOutOfRange {
                min_samples,
                window_days: window.days(),
            });
        }
        Ok(Self {
            window,
            min_samples,
        })
    }

    pub fn window(&self) -> LookbackWindow {
        self.window
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Daily samples for `key` in the window before `evaluation_date`.
    ///
    /// A day contributes only if it has in-scope records, none of them
    /// partial, and the metric is defined for it.
    pub fn samples(&self, snapshot: &Snapshot, key: &SeriesKey, evaluation_date: NaiveDate) -> Vec<f64> {
        let start = self.window.start(evaluation_date);
        let end = self.window.end(evaluation_date);

        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter_map(|d| snapshot.rollup(d, &key.dimension, key.hour))
            .filter(|m| !m.partial)
            .filter_map(|m| match key.metric.observe(&m) {
                Rate::Defined(v) => Some(v),
                Rate::Undefined => None,
            })
            .collect()
    }

    pub fn estimate(&self, snapshot: &Snapshot, key: &SeriesKey, evaluation_date: NaiveDate) -> Baseline {
        let samples = self.samples(snapshot, key, evaluation_date);
        let baseline = Baseline::from_samples(
            key.clone(),
            self.window.start(evaluation_date),
            self.window.end(evaluation_date),
            &samples,
            self.min_samples,
        );

        if baseline.is_low_confidence() {
            debug!(
                series = %key,
                samples = baseline.sample_size,
                required = self.min_samples,
                "Low-confidence baseline"
            );
        }

        baseline
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub replacements: u64,
    pub evictions: u64,
}

/// Latest baseline per (series, window), shared across evaluation cycles
pub struct BaselineCache {
    entries: RwLock<HashMap<u64, Arc<Baseline>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    replacements: AtomicU64,
    evictions: AtomicU64,
}

impl BaselineCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity.min(1024))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// xxh3 over the canonical key text
    pub fn cache_key(key: &SeriesKey, window: LookbackWindow) -> u64 {
        let canonical = format!("{}|w{}", key, window.days());
        xxhash_rust::xxh3::xxh3_64(canonical.as_bytes())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Arc<Baseline>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Arc<Baseline>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latest published baseline, possibly stale
    pub fn get(&self, key: &SeriesKey, window: LookbackWindow) -> Option<Arc<Baseline>> {
        let found = self.read().get(&Self::cache_key(key, window)).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Replace the cached baseline for this series.
    ///
    /// A baseline for an older window never overwrites a newer one; an equal
    /// window (retroactive recompute) does.
    pub fn publish(&self, baseline: Baseline, window: LookbackWindow) -> Arc<Baseline> {
        let hash = Self::cache_key(&baseline.key, window);
        let fresh = Arc::new(baseline);
        let mut entries = self.write();

        if let Some(existing) = entries.get(&hash) {
            if existing.window_end > fresh.window_end {
                return Arc::clone(existing);
            }
            self.replacements.fetch_add(1, Ordering::Relaxed);
        } else if entries.len() >= self.capacity {
            Self::evict_oldest(&mut entries);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        entries.insert(hash, Arc::clone(&fresh));
        fresh
    }

    pub fn publish_all<I>(&self, baselines: I, window: LookbackWindow) -> usize
    where
        I: IntoIterator<Item = Baseline>,
    {
        baselines
            .into_iter()
            .map(|b| self.publish(b, window))
            .count()
    }

    fn evict_oldest(entries: &mut HashMap<u64, Arc<Baseline>>) {
        let oldest = entries
            .iter()
            .min_by(|a, b| {
                a.1.window_end
                    .cmp(&b.1.window_end)
                    .then_with(|| a.0.cmp(b.0))
            })
            .map(|(&h, _)| h);
        if let Some(h) = oldest {
            entries.remove(&h);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for BaselineCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl fmt::Debug for BaselineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaselineCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
