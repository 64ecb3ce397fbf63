//! Seeded AEPS Record Generator
//!
//! Produces hourly pre-aggregated records for every (aggregator, state, bank)
//! combination over a date range. Volume follows a diurnal curve, rates get
//! Gaussian jitter and ticket sizes are log-normal. Incidents distort chosen
//! slices so detection can be exercised end to end.

use aeps_core::{Aggregator, MetricRecord, TimeBucket};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal, NormalError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State with its relative share of national volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProfile {
    pub name: String,
    pub weight: f64,
}

impl StateProfile {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    /// Last generated date; history runs backwards from here
    pub end_date: NaiveDate,
    pub days: u32,
    pub aggregators: Vec<Aggregator>,
    pub states: Vec<StateProfile>,
    pub banks: Vec<String>,
    /// Transactions per hour for a weight-1.0 state at peak
    pub peak_hourly_transactions: f64,
    pub transaction_success_pct: f64,
    pub auth_success_pct: f64,
    /// Standard deviation of hourly rate jitter, percentage points
    pub rate_jitter_pct: f64,
    /// Log-normal sigma of hourly volume noise
    pub volume_noise: f64,
    pub avg_ticket_rupees: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            end_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap_or_default(),
            days: 15,
            aggregators: Aggregator::ALL.to_vec(),
            states: vec![
                StateProfile::new("Uttar Pradesh", 1.0),
                StateProfile::new("Bihar", 0.8),
                StateProfile::new("West Bengal", 0.6),
                StateProfile::new("Rajasthan", 0.5),
                StateProfile::new("Madhya Pradesh", 0.45),
                StateProfile::new("Jharkhand", 0.3),
                StateProfile::new("Odisha", 0.25),
                StateProfile::new("Assam", 0.15),
                StateProfile::new("Goa", 0.01),
            ],
            banks: ["SBI", "PNB", "BOB", "UBI"].map(String::from).to_vec(),
            peak_hourly_transactions: 2_000.0,
            transaction_success_pct: 94.0,
            auth_success_pct: 91.0,
            rate_jitter_pct: 0.8,
            volume_noise: 0.08,
            avg_ticket_rupees: 2_500.0,
        }
    }
}

impl GeneratorConfig {
    pub fn start_date(&self) -> NaiveDate {
        self.end_date - Duration::days(i64::from(self.days.saturating_sub(1)))
    }
}

#[derive(Debug)]
pub enum GeneratorError {
    Distribution(NormalError),
    InvalidConfig(String),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distribution(e) => write!(f, "Invalid noise distribution: {}", e),
            Self::InvalidConfig(e) => write!(f, "Invalid generator config: {}", e),
        }
    }
}

impl std::error::Error for GeneratorError {}

impl From<NormalError> for GeneratorError {
    fn from(e: NormalError) -> Self {
        Self::Distribution(e)
    }
}

// ============================================================================
// INCIDENTS
// ============================================================================

/// Distortion applied to a slice of generated records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Incident {
    /// Transaction success for one aggregator falls by `drop_pct` points
    AggregatorSuccessDrop {
        aggregator: Aggregator,
        date: NaiveDate,
        drop_pct: f64,
    },
    /// Bio-auth success pinned to `success_pct` within an hour window
    BioAuthOutage {
        date: NaiveDate,
        start_hour: u8,
        end_hour: u8,
        success_pct: f64,
    },
    /// Volume and value for one state scaled by `factor` (surge > 1, slump < 1)
    StateGtvShift {
        state: String,
        date: NaiveDate,
        factor: f64,
    },
    /// Final day stops at `cutoff_hour`, which is still being filled
    PartialFinalDay { cutoff_hour: u8 },
}

/// Hourly volume multiplier: quiet nights, business-hours peak
pub fn hour_weight(hour: u8) -> f64 {
    match hour {
        0..=5 => 0.08,
        6..=8 => 0.4,
        9..=17 => 1.0,
        18..=20 => 0.6,
        _ => 0.2,
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

pub struct Generator {
    config: GeneratorConfig,
    incidents: Vec<Incident>,
    rng: StdRng,
    jitter: Normal<f64>,
    volume: LogNormal<f64>,
    ticket: LogNormal<f64>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        if config.days == 0 {
            return Err(GeneratorError::InvalidConfig("days must be at least 1".into()));
        }
        if config.aggregators.is_empty() || config.states.is_empty() || config.banks.is_empty() {
            return Err(GeneratorError::InvalidConfig(
                "aggregators, states and banks must be non-empty".into(),
            ));
        }
        if !(config.avg_ticket_rupees > 0.0) {
            return Err(GeneratorError::InvalidConfig("avg_ticket_rupees must be positive".into()));
        }

        let jitter = Normal::new(0.0, config.rate_jitter_pct)?;
        let volume = LogNormal::new(0.0, config.volume_noise)?;
        let ticket = LogNormal::new(config.avg_ticket_rupees.ln(), 0.25)?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            incidents: Vec::new(),
            jitter,
            volume,
            ticket,
        })
    }

    pub fn with_incident(mut self, incident: Incident) -> Self {
        self.incidents.push(incident);
        self
    }

    pub fn with_incidents(mut self, incidents: impl IntoIterator<Item = Incident>) -> Self {
        self.incidents.extend(incidents);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Generate the full date range. Output order: date, hour, aggregator,
    /// state, bank.
    pub fn generate(&mut self) -> Vec<MetricRecord> {
        let start = self.config.start_date();
        let end = self.config.end_date;
        let cutoff = self.incidents.iter().find_map(|i| match i {
            Incident::PartialFinalDay { cutoff_hour } => Some((*cutoff_hour).min(23)),
            _ => None,
        });

        let aggregators = self.config.aggregators.clone();
        let states = self.config.states.clone();
        let banks = self.config.banks.clone();
        let agg_share = 1.0 / aggregators.len() as f64;
        let bank_share = 1.0 / banks.len() as f64;

        let mut out = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            let last_hour = match cutoff {
                Some(h) if date == end => h,
                _ => 23,
            };
            for hour in 0..=last_hour {
                let partial = cutoff.is_some() && date == end && hour == last_hour;
                for &aggregator in &aggregators {
                    for state in &states {
                        for bank in &banks {
                            let expected = self.config.peak_hourly_transactions
                                * state.weight
                                * agg_share
                                * bank_share
                                * hour_weight(hour)
                                * if partial { 0.5 } else { 1.0 };
                            let record = self.record(
                                TimeBucket::new(date, hour),
                                aggregator,
                                &state.name,
                                bank,
                                expected,
                                partial,
                            );
                            out.push(record);
                        }
                    }
                }
            }
        }
        out
    }

    fn record(
        &mut self,
        bucket: TimeBucket,
        aggregator: Aggregator,
        state: &str,
        bank: &str,
        expected: f64,
        partial: bool,
    ) -> MetricRecord {
        let mut volume_factor = 1.0;
        let mut txn_pct = self.config.transaction_success_pct;
        let mut auth_pct = self.config.auth_success_pct;

        for incident in &self.incidents {
            match incident {
                Incident::AggregatorSuccessDrop {
                    aggregator: a,
                    date,
                    drop_pct,
                } if *a == aggregator && *date == bucket.date => txn_pct -= drop_pct,
                Incident::BioAuthOutage {
                    date,
                    start_hour,
                    end_hour,
                    success_pct,
                } if *date == bucket.date && (*start_hour..=*end_hour).contains(&bucket.hour) => {
                    auth_pct = *success_pct
                }
                Incident::StateGtvShift { state: s, date, factor }
                    if s == state && *date == bucket.date =>
                {
                    volume_factor *= factor.max(0.0)
                }
                _ => {}
            }
        }

        let count = (expected * volume_factor * self.volume.sample(&mut self.rng)).round() as u64;
        let txn_pct = (txn_pct + self.jitter.sample(&mut self.rng)).clamp(0.0, 100.0);
        let success = ((count as f64) * txn_pct / 100.0).round() as u64;
        let value: f64 = (0..success.min(64))
            .map(|_| self.ticket.sample(&mut self.rng))
            .sum::<f64>()
            * if success > 64 { success as f64 / 64.0 } else { 1.0 };

        let attempts = ((count as f64) * self.rng.random_range(1.08..1.2)).round() as u64;
        let auth_pct = (auth_pct + self.jitter.sample(&mut self.rng)).clamp(0.0, 100.0);
        let auth_success = ((attempts as f64) * auth_pct / 100.0).round() as u64;
        let users = ((attempts as f64) / self.rng.random_range(1.2..1.4)).round() as u64;

        let record = MetricRecord::new(bucket, aggregator, state, bank)
            .with_transactions(count, success.min(count), value)
            .with_auth(attempts, auth_success.min(attempts), users);
        if partial { record.partial() } else { record }
    }
}
