//! Day-indexed view over the records fetched for one evaluation cycle

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::rates::DerivedMetric;
use crate::record::{DimensionKey, MetricRecord};

/// Immutable snapshot of records, grouped by date
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    days: BTreeMap<NaiveDate, Vec<MetricRecord>>,
    record_count: usize,
}

impl Snapshot {
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator<Item = MetricRecord>,
    {
        let mut days: BTreeMap<NaiveDate, Vec<MetricRecord>> = BTreeMap::new();
        let mut record_count = 0;
        for r in records {
            days.entry(r.date()).or_default().push(r);
            record_count += 1;
        }
        Self { days, record_count }
    }

    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn records_on(&self, date: NaiveDate) -> &[MetricRecord] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `date` has records and none of them is still being filled. A value
    /// missing from a complete day had no traffic.
    pub fn is_complete(&self, date: NaiveDate) -> bool {
        let records = self.records_on(date);
        !records.is_empty() && !records.iter().any(MetricRecord::is_partial)
    }

    /// Roll up every record on `date` inside `dimension` (and `hour`, if
    /// given). `None` when nothing is in scope.
    pub fn rollup(
        &self,
        date: NaiveDate,
        dimension: &DimensionKey,
        hour: Option<u8>,
    ) -> Option<DerivedMetric> {
        let records = self.days.get(&date)?;
        let mut in_scope = records
            .iter()
            .filter(|r| dimension.matches(r) && hour.is_none_or(|h| r.hour() == h))
            .peekable();
        in_scope.peek()?;
        Some(DerivedMetric::rollup(in_scope))
    }

    /// Every dimension key with at least one record, `Overall` first
    pub fn dimensions(&self) -> BTreeSet<DimensionKey> {
        let mut keys = BTreeSet::new();
        if self.is_empty() {
            return keys;
        }
        keys.insert(DimensionKey::Overall);
        for r in self.days.values().flatten() {
            keys.insert(DimensionKey::Aggregator(r.aggregator));
            keys.insert(DimensionKey::State(r.state.clone()));
            keys.insert(DimensionKey::Bank(r.bank.clone()));
        }
        keys
    }

    /// Hours of day with at least one record on any date
    pub fn hours(&self) -> BTreeSet<u8> {
        self.days.values().flatten().map(MetricRecord::hour).collect()
    }
}
