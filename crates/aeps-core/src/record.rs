//! Raw Metric Records and the Record Source Boundary
//!
//! A `MetricRecord` is one pre-aggregated bucket produced by the upstream
//! warehouse: (date, hour, aggregator, state, bank) plus raw counts and sums.
//! The engine never mutates records; it only rolls them up.
//!
//! Records reach the engine through the `RecordSource` trait. Query
//! construction, timeouts and retries belong to the source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SourceError, ValidationError};

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Payment-network intermediary routing the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregator {
    Ybl,
    Nsdl,
    Ybln,
}

impl Aggregator {
    pub const ALL: [Aggregator; 3] = [Aggregator::Ybl, Aggregator::Nsdl, Aggregator::Ybln];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Ybl => "YBL",
            Self::Nsdl => "NSDL",
            Self::Ybln => "YBLN",
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Aggregator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YBL" => Ok(Self::Ybl),
            "NSDL" => Ok(Self::Nsdl),
            "YBLN" => Ok(Self::Ybln),
            other => Err(ValidationError::InvalidField {
                field: "aggregator",
                reason: format!("unknown aggregator '{}'", other),
            }),
        }
    }
}

/// Which family of dimension values a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Overall,
    Aggregator,
    State,
    Bank,
}

/// A slice of the network that metrics are rolled up over
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DimensionKey {
    Overall,
    Aggregator(Aggregator),
    State(String),
    Bank(String),
}

impl DimensionKey {
    pub fn kind(&self) -> DimensionKind {
        match self {
            Self::Overall => DimensionKind::Overall,
            Self::Aggregator(_) => DimensionKind::Aggregator,
            Self::State(_) => DimensionKind::State,
            Self::Bank(_) => DimensionKind::Bank,
        }
    }

    /// Whether a record falls inside this slice
    pub fn matches(&self, record: &MetricRecord) -> bool {
        match self {
            Self::Overall => true,
            Self::Aggregator(a) => record.aggregator == *a,
            Self::State(s) => record.state == *s,
            Self::Bank(b) => record.bank == *b,
        }
    }

    /// Identifier of the dimension value, used for tie-breaks and display
    pub fn value_id(&self) -> &str {
        match self {
            Self::Overall => "overall",
            Self::Aggregator(a) => a.code(),
            Self::State(s) => s,
            Self::Bank(b) => b,
        }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overall => f.write_str("overall"),
            Self::Aggregator(a) => write!(f, "aggregator:{}", a),
            Self::State(s) => write!(f, "state:{}", s),
            Self::Bank(b) => write!(f, "bank:{}", b),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// (date, hour) bucket a record was aggregated into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeBucket {
    pub date: NaiveDate,
    /// Hour of day, 0..=23
    pub hour: u8,
}

impl TimeBucket {
    pub fn new(date: NaiveDate, hour: u8) -> Self {
        Self { date, hour }
    }
}

/// Whether the upstream store considers a bucket final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    #[default]
    Complete,
    /// Still being filled (e.g. the current hour); excluded from baselines
    Partial,
}

/// One pre-aggregated observation from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub bucket: TimeBucket,
    pub aggregator: Aggregator,
    pub state: String,
    pub bank: String,
    pub transaction_count: u64,
    pub transaction_success_count: u64,
    /// Value of successful transactions, in rupees
    pub transaction_value: f64,
    pub auth_attempt_count: u64,
    pub auth_success_count: u64,
    pub unique_user_count: u64,
    #[serde(default)]
    pub completeness: Completeness,
}

impl MetricRecord {
    /// Empty record for a bucket; counts are filled with the `with_*` builders
    pub fn new(
        bucket: TimeBucket,
        aggregator: Aggregator,
        state: impl Into<String>,
        bank: impl Into<String>,
    ) -> Self {
        Self {
            bucket,
            aggregator,
            state: state.into(),
            bank: bank.into(),
            transaction_count: 0,
            transaction_success_count: 0,
            transaction_value: 0.0,
            auth_attempt_count: 0,
            auth_success_count: 0,
            unique_user_count: 0,
            completeness: Completeness::Complete,
        }
    }

    pub fn with_transactions(mut self, count: u64, success: u64, value: f64) -> Self {
        self.transaction_count = count;
        self.transaction_success_count = success;
        self.transaction_value = value;
        self
    }

    pub fn with_auth(mut self, attempts: u64, success: u64, unique_users: u64) -> Self {
        self.auth_attempt_count = attempts;
        self.auth_success_count = success;
        self.unique_user_count = unique_users;
        self
    }

    pub fn partial(mut self) -> Self {
        self.completeness = Completeness::Partial;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.completeness == Completeness::Partial
    }

    pub fn date(&self) -> NaiveDate {
        self.bucket.date
    }

    pub fn hour(&self) -> u8 {
        self.bucket.hour
    }
}

// ============================================================================
// QUERY BOUNDARY
// ============================================================================

/// Inclusive hour-of-day filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    start: u8,
    end: u8,
}

impl HourRange {
    pub const FULL_DAY: HourRange = HourRange { start: 0, end: 23 };

    pub fn new(start: u8, end: u8) -> Result<Self, ValidationError> {
        if start > end || end > 23 {
            return Err(ValidationError::HourRangeInvalid { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    pub fn contains(&self, hour: u8) -> bool {
        hour >= self.start && hour <= self.end
    }

    pub fn hours(&self) -> impl Iterator<Item = u8> {
        self.start..=self.end
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self::FULL_DAY
    }
}

/// Snapshot request handed to the record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// First date, inclusive
    pub start_date: NaiveDate,
    /// Last date, inclusive
    pub end_date: NaiveDate,
    pub hours: HourRange,
    /// Empty = all aggregators
    #[serde(default)]
    pub aggregators: Vec<Aggregator>,
    /// Empty = all states
    #[serde(default)]
    pub states: Vec<String>,
    /// Empty = all banks
    #[serde(default)]
    pub banks: Vec<String>,
}

impl RecordQuery {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            hours: HourRange::FULL_DAY,
            aggregators: Vec::new(),
            states: Vec::new(),
            banks: Vec::new(),
        }
    }

    pub fn matches(&self, record: &MetricRecord) -> bool {
        let date = record.date();
        date >= self.start_date
            && date <= self.end_date
            && self.hours.contains(record.hour())
            && (self.aggregators.is_empty() || self.aggregators.contains(&record.aggregator))
            && (self.states.is_empty() || self.states.contains(&record.state))
            && (self.banks.is_empty() || self.banks.contains(&record.bank))
    }
}

/// Supplier of raw records (a warehouse query layer in production)
pub trait RecordSource: Send + Sync {
    fn fetch(&self, query: &RecordQuery) -> Result<Vec<MetricRecord>, SourceError>;
}

/// Record source over an owned, already-materialised collection
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<MetricRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<MetricRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }
}

impl RecordSource for InMemorySource {
    fn fetch(&self, query: &RecordQuery) -> Result<Vec<MetricRecord>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }
}

impl<S: RecordSource + ?Sized> RecordSource for std::sync::Arc<S> {
    fn fetch(&self, query: &RecordQuery) -> Result<Vec<MetricRecord>, SourceError> {
        (**self).fetch(query)
    }
}
