//! Evaluation Cycle
//!
//! One `evaluate` call fetches a snapshot, recomputes every baseline,
//! classifies the evaluation date and bundles the results into a report:
//!
//! 1. Validate the request (fail fast, nothing is fetched on error)
//! 2. Fetch `[date - W, date]` through the record source
//! 3. Roll up the evaluation date (day totals, hourly, per aggregator)
//! 4. Baseline and classify every (dimension, metric[, hour]) series
//! 5. Health score, movers, GTV share, summary
//! 6. Publish the recomputed baselines into the shared cache
//!
//! Series are independent, so step 4 fans out over a small pool of scoped
//! worker threads fed by a bounded channel. Results are sorted by series key,
//! making the report independent of worker count and scheduling.

use chrono::NaiveDate;
use crossbeam_channel::{SendError, bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::anomaly::{Classification, Direction, Sensitivity, classify};
use crate::baseline::{Baseline, BaselineCache, BaselineEstimator, SeriesKey};
use crate::config::{EngineConfig, EvaluationParams};
use crate::error::{EngineError, ValidationError};
use crate::health::{HealthScore, HealthTier};
use crate::metrics;
use crate::movers::{self, MoverCandidate, MoverRank, TopN};
use crate::rates::{DerivedMetric, MetricName, Rate};
use crate::record::{Aggregator, DimensionKey, DimensionKind, HourRange, RecordQuery, RecordSource};
use crate::share::{ShareEntry, gtv_share};
use crate::snapshot::Snapshot;

/// Active anomalies above this count raise the alert to red
pub const RED_ALERT_ANOMALIES: usize = 5;

/// Metrics whose Overall anomalies drive the alert level
pub const ALERT_METRICS: [MetricName; 2] =
    [MetricName::TransactionSuccessRate, MetricName::AuthSuccessRate];

// ============================================================================
// REQUEST
// ============================================================================

/// Caller parameters for one cycle. `None` fields fall back to the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub evaluation_date: NaiveDate,
    #[serde(default)]
    pub hour_start: u8,
    #[serde(default = "last_hour")]
    pub hour_end: u8,
    #[serde(default)]
    pub aggregators: Vec<Aggregator>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub banks: Vec<String>,
    #[serde(default)]
    pub window_days: Option<u32>,
    #[serde(default)]
    pub sensitivity: Option<u8>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

fn last_hour() -> u8 {
    23
}

impl EvaluationRequest {
    pub fn for_date(evaluation_date: NaiveDate) -> Self {
        Self {
            evaluation_date,
            hour_start: 0,
            hour_end: 23,
            aggregators: Vec::new(),
            states: Vec::new(),
            banks: Vec::new(),
            window_days: None,
            sensitivity: None,
            top_n: None,
        }
    }

    pub fn hours(mut self, start: u8, end: u8) -> Self {
        self.hour_start = start;
        self.hour_end = end;
        self
    }

    pub fn aggregators(mut self, aggregators: impl IntoIterator<Item = Aggregator>) -> Self {
        self.aggregators = aggregators.into_iter().collect();
        self
    }

    pub fn states<I, T>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn banks<I, T>(mut self, banks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.banks = banks.into_iter().map(Into::into).collect();
        self
    }

    pub fn window_days(mut self, days: u32) -> Self {
        self.window_days = Some(days);
        self
    }

    pub fn sensitivity(mut self, sigma: u8) -> Self {
        self.sensitivity = Some(sigma);
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyMetric {
    pub hour: u8,
    pub metric: DerivedMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionMetric {
    pub dimension: DimensionKey,
    pub metric: DerivedMetric,
}

/// One classified series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesObservation {
    pub baseline: Baseline,
    pub observed: Rate,
    /// The observation includes buckets still being filled
    pub partial: bool,
    pub classification: Classification,
}

impl SeriesObservation {
    pub fn key(&self) -> &SeriesKey {
        &self.baseline.key
    }

    pub fn is_anomaly(&self) -> bool {
        self.classification.is_anomaly()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub evaluated: usize,
    pub lower: usize,
    pub upper: usize,
    pub normal: usize,
    pub insufficient_data: usize,
    pub undefined: usize,
    /// Overall success-rate anomalies (daily and hourly), see [`ALERT_METRICS`]
    pub overall_anomalies: usize,
    pub alert: HealthTier,
}

impl AnomalySummary {
    pub fn from_observations(observations: &[SeriesObservation]) -> Self {
        let mut s = Self {
            evaluated: observations.len(),
            lower: 0,
            upper: 0,
            normal: 0,
            insufficient_data: 0,
            undefined: 0,
            overall_anomalies: 0,
            alert: HealthTier::Green,
        };
        for o in observations {
            match o.classification {
                Classification::Flagged(flag) => match flag.direction {
                    Direction::Lower => s.lower += 1,
                    Direction::Upper => s.upper += 1,
                    Direction::Normal => s.normal += 1,
                },
                Classification::InsufficientData { .. } => s.insufficient_data += 1,
                Classification::UndefinedObservation => s.undefined += 1,
            }
            let key = o.key();
            if o.is_anomaly()
                && key.dimension == DimensionKey::Overall
                && ALERT_METRICS.contains(&key.metric)
            {
                s.overall_anomalies += 1;
            }
        }
        s.alert = alert_level(s.overall_anomalies);
        s
    }

    pub fn anomalies(&self) -> usize {
        self.lower + self.upper
    }
}

pub fn alert_level(active_anomalies: usize) -> HealthTier {
    match active_anomalies {
        0 => HealthTier::Green,
        n if n <= RED_ALERT_ANOMALIES => HealthTier::Yellow,
        _ => HealthTier::Red,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluation_id: Uuid,
    pub evaluation_date: NaiveDate,
    pub window_days: u32,
    pub sensitivity_sigma: u8,
    pub hours: HourRange,
    pub record_count: usize,
    /// Overall roll-up of the evaluation date; `None` without records
    pub day_totals: Option<DerivedMetric>,
    pub hourly: Vec<HourlyMetric>,
    pub aggregator_breakdown: Vec<DimensionMetric>,
    pub health: HealthScore,
    /// Sorted by series key
    pub observations: Vec<SeriesObservation>,
    pub state_movers: MoverRank,
    pub bank_movers: MoverRank,
    pub gtv_share: Vec<ShareEntry>,
    pub summary: AnomalySummary,
}

impl EvaluationReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &SeriesObservation> {
        self.observations.iter().filter(|o| o.is_anomaly())
    }

    pub fn observation(&self, key: &SeriesKey) -> Option<&SeriesObservation> {
        self.observations
            .binary_search_by(|o| o.key().cmp(key))
            .ok()
            .map(|i| &self.observations[i])
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

pub struct Evaluator<S: RecordSource> {
    source: S,
    config: EngineConfig,
    cache: Arc<BaselineCache>,
}

impl<S: RecordSource> Evaluator<S> {
    pub fn new(source: S, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let cache = Arc::new(BaselineCache::new(config.cache_capacity));
        Ok(Self {
            source,
            config,
            cache,
        })
    }

    /// Share a baseline cache with other evaluators
    pub fn with_cache(mut self, cache: Arc<BaselineCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<BaselineCache> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolve(&self, req: &EvaluationRequest) -> Result<(EvaluationParams, HourRange), ValidationError> {
        let params = EvaluationParams::new(
            req.window_days.unwrap_or(self.config.window_days),
            req.sensitivity.unwrap_or(self.config.sensitivity),
            req.top_n.unwrap_or(self.config.top_n),
            self.config.min_samples,
        )?;
        let hours = HourRange::new(req.hour_start, req.hour_end)?;
        Ok((params, hours))
    }

    pub fn evaluate(&self, req: &EvaluationRequest) -> Result<EvaluationReport, EngineError> {
        let started = Instant::now();
        let (params, hours) = self.resolve(req).inspect_err(|e| {
            metrics::VALIDATION_FAILURES_TOTAL.inc();
            warn!(error = %e, "Evaluation request rejected");
        })?;
        let estimator = BaselineEstimator::new(params.window, params.min_samples)?;

        let evaluation_id = Uuid::new_v4();
        let date = req.evaluation_date;
        info!(
            evaluation_id = %evaluation_id,
            date = %date,
            window_days = params.window.days(),
            sensitivity = %params.sensitivity,
            "Evaluation started"
        );

        let query = RecordQuery {
            start_date: params.window.start(date),
            end_date: date,
            hours,
            aggregators: req.aggregators.clone(),
            states: req.states.clone(),
            banks: req.banks.clone(),
        };
        let records = self.source.fetch(&query).inspect_err(|e| {
            metrics::SOURCE_FAILURES_TOTAL.inc();
            warn!(evaluation_id = %evaluation_id, error = %e, "Record fetch failed");
        })?;
        let snapshot = Snapshot::new(records);

        let day_totals = snapshot.rollup(date, &DimensionKey::Overall, None);
        if day_totals.as_ref().is_some_and(|m| m.partial) {
            warn!(
                evaluation_id = %evaluation_id,
                date = %date,
                "Evaluation date includes partial buckets"
            );
        }

        let hourly: Vec<HourlyMetric> = hours
            .hours()
            .filter_map(|hour| {
                snapshot
                    .rollup(date, &DimensionKey::Overall, Some(hour))
                    .map(|metric| HourlyMetric { hour, metric })
            })
            .collect();

        let aggregator_breakdown: Vec<DimensionMetric> = Aggregator::ALL
            .into_iter()
            .map(DimensionKey::Aggregator)
            .filter_map(|dimension| {
                snapshot
                    .rollup(date, &dimension, None)
                    .map(|metric| DimensionMetric { dimension, metric })
            })
            .collect();

        let health = HealthScore::from_metric(day_totals.as_ref());

        let keys = self.series_keys(&snapshot, hours);
        let day = EvaluationDay {
            date,
            complete: snapshot.is_complete(date),
        };
        let observations = self.evaluate_series(&snapshot, &estimator, keys, day, params.sensitivity);

        let state_movers = self.rank_movers(&observations, DimensionKind::State, params.top_n);
        let bank_movers = self.rank_movers(&observations, DimensionKind::Bank, params.top_n);

        let state_gtv: Vec<(String, f64)> = observations
            .iter()
            .filter(|o| {
                o.key().hour.is_none()
                    && o.key().metric == MetricName::GtvCrores
                    && o.key().dimension.kind() == DimensionKind::State
            })
            .filter_map(|o| Some((o.key().dimension.value_id().to_string(), o.observed.value()?)))
            .collect();
        let gtv_share = gtv_share(&state_gtv, self.config.share_others_threshold_pct);

        let summary = AnomalySummary::from_observations(&observations);

        let published = self
            .cache
            .publish_all(observations.iter().map(|o| o.baseline.clone()), params.window);
        metrics::CACHE_PUBLISHED_TOTAL.inc_by(published as u64);

        metrics::EVALUATIONS_TOTAL.inc();
        metrics::ANOMALIES_TOTAL.inc_by(summary.anomalies() as u64);
        metrics::INSUFFICIENT_DATA_TOTAL.inc_by(summary.insufficient_data as u64);
        metrics::EVALUATION_LATENCY.observe(started.elapsed().as_secs_f64());

        info!(
            evaluation_id = %evaluation_id,
            series = summary.evaluated,
            anomalies = summary.anomalies(),
            insufficient = summary.insufficient_data,
            alert = %summary.alert,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation finished"
        );

        Ok(EvaluationReport {
            evaluation_id,
            evaluation_date: date,
            window_days: params.window.days(),
            sensitivity_sigma: u8::from(params.sensitivity),
            hours,
            record_count: snapshot.len(),
            day_totals,
            hourly,
            aggregator_breakdown,
            health,
            observations,
            state_movers,
            bank_movers,
            gtv_share,
            summary,
        })
    }

    fn series_keys(&self, snapshot: &Snapshot, hours: HourRange) -> Vec<SeriesKey> {
        let mut keys = Vec::new();
        for dimension in snapshot.dimensions() {
            for metric in MetricName::TRACKED {
                keys.push(SeriesKey::daily(dimension.clone(), metric));
            }
        }
        if self.config.hourly_baselines {
            // Hours that never saw traffic have no profile worth reporting
            for hour in snapshot.hours().into_iter().filter(|h| hours.contains(*h)) {
                for metric in MetricName::TRACKED {
                    keys.push(SeriesKey::hourly(DimensionKey::Overall, metric, hour));
                }
            }
        }
        keys
    }

    fn evaluate_series(
        &self,
        snapshot: &Snapshot,
        estimator: &BaselineEstimator,
        keys: Vec<SeriesKey>,
        day: EvaluationDay,
        k: Sensitivity,
    ) -> Vec<SeriesObservation> {
        let workers = self.config.worker_count().min(keys.len()).max(1);
        let mut results = Vec::with_capacity(keys.len());

        if workers == 1 {
            results.extend(keys.iter().map(|key| evaluate_one(snapshot, estimator, key, day, k)));
        } else {
            let (job_tx, job_rx) = bounded::<SeriesKey>(workers * 64);
            let (result_tx, result_rx) = unbounded::<SeriesObservation>();

            thread::scope(|scope| {
                for id in 0..workers {
                    let rx = job_rx.clone();
                    let tx = result_tx.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("aeps-eval-{}", id))
                        .spawn_scoped(scope, move || {
                            for key in rx.iter() {
                                if tx.send(evaluate_one(snapshot, estimator, &key, day, k)).is_err() {
                                    break;
                                }
                            }
                        });
                    if let Err(e) = spawned {
                        warn!(worker = id, error = %e, "Evaluation worker failed to start");
                    }
                }
                drop(job_rx);
                drop(result_tx);

                for key in keys {
                    // No live workers: evaluate on the calling thread
                    if let Err(SendError(key)) = job_tx.send(key) {
                        results.push(evaluate_one(snapshot, estimator, &key, day, k));
                    }
                }
                drop(job_tx);
                results.extend(result_rx.iter());
            });
        }

        results.sort_by(|a, b| a.key().cmp(b.key()));
        debug!(series = results.len(), workers, "Series evaluated");
        results
    }

    fn rank_movers(
        &self,
        observations: &[SeriesObservation],
        kind: DimensionKind,
        top_n: TopN,
    ) -> MoverRank {
        let metric = self.config.mover_metric;
        let by_id: HashMap<&str, &SeriesObservation> = observations
            .iter()
            .filter(|o| {
                o.key().hour.is_none() && o.key().metric == metric && o.key().dimension.kind() == kind
            })
            .map(|o| (o.key().dimension.value_id(), o))
            .collect();

        let candidates: Vec<MoverCandidate<'_>> = by_id
            .into_iter()
            .map(|(id, o)| MoverCandidate {
                id: id.to_string(),
                current: o.observed,
                baseline: &o.baseline,
            })
            .collect();

        movers::rank(kind, metric, &candidates, &self.config.mover_options(top_n))
    }
}

/// Date under evaluation and whether its data finished loading
#[derive(Debug, Clone, Copy)]
struct EvaluationDay {
    date: NaiveDate,
    complete: bool,
}

fn evaluate_one(
    snapshot: &Snapshot,
    estimator: &BaselineEstimator,
    key: &SeriesKey,
    day: EvaluationDay,
    k: Sensitivity,
) -> SeriesObservation {
    let baseline = estimator.estimate(snapshot, key, day.date);
    // A known value absent from a complete day had zero volume
    let current = snapshot
        .rollup(day.date, &key.dimension, key.hour)
        .or_else(|| day.complete.then(DerivedMetric::empty));
    let observed = current
        .as_ref()
        .map(|m| key.metric.observe(m))
        .unwrap_or(Rate::Undefined);
    let partial = current.as_ref().is_some_and(|m| m.partial);
    let classification = classify(observed, &baseline, k);

    SeriesObservation {
        baseline,
        observed,
        partial,
        classification,
    }
}
