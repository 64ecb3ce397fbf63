//! End-to-end evaluation cycles over an in-memory record source

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aeps_core::{
    Aggregator, BaselineCache, Classification, Composite, Confidence, DimensionKey, Direction,
    EngineConfig, EngineError, EvaluationRequest, Evaluator, HealthTier, InMemorySource,
    LookbackWindow, MetricName, MetricRecord, Rate, RecordQuery, RecordSource, SeriesKey,
    SourceError, TimeBucket, ValidationError,
};
use chrono::NaiveDate;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
}

/// Two aggregators x two (state, bank) pairs at 10:00, success cycling 94/95/96%.
/// Bihar books 10 Cr per day, Goa 5 Cr.
fn steady_day(d: u32) -> Vec<MetricRecord> {
    let mut out = Vec::new();
    for agg in [Aggregator::Ybl, Aggregator::Nsdl] {
        for (state, bank, value) in [("Bihar", "SBI", 50_000_000.0), ("Goa", "PNB", 25_000_000.0)] {
            let wobble = u64::from(d % 3) * 10;
            out.push(
                MetricRecord::new(TimeBucket::new(day(d), 10), agg, state, bank)
                    .with_transactions(1000, 940 + wobble, value)
                    .with_auth(1200, 1100 + wobble, 900),
            );
        }
    }
    out
}

fn fixture(days: std::ops::RangeInclusive<u32>, eval_tweak: impl Fn(&mut MetricRecord)) -> InMemorySource {
    let last = *days.end();
    let mut records = Vec::new();
    for d in days {
        let mut batch = steady_day(d);
        if d == last {
            batch.iter_mut().for_each(&eval_tweak);
        }
        records.extend(batch);
    }
    InMemorySource::new(records)
}

fn daily(dimension: DimensionKey, metric: MetricName) -> SeriesKey {
    SeriesKey::daily(dimension, metric)
}

struct CountingSource {
    inner: InMemorySource,
    calls: AtomicUsize,
}

impl RecordSource for CountingSource {
    fn fetch(&self, query: &RecordQuery) -> Result<Vec<MetricRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(query)
    }
}

struct DownSource;

impl RecordSource for DownSource {
    fn fetch(&self, _query: &RecordQuery) -> Result<Vec<MetricRecord>, SourceError> {
        Err(SourceError::Unavailable("warehouse offline".to_string()))
    }
}

#[test]
fn test_aggregator_outage_is_flagged_lower() {
    let source = fixture(1..=15, |r| {
        if r.aggregator == Aggregator::Nsdl {
            r.transaction_success_count = 600;
        }
    });
    let evaluator = Evaluator::new(source, EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    let nsdl = report
        .observation(&daily(
            DimensionKey::Aggregator(Aggregator::Nsdl),
            MetricName::TransactionSuccessRate,
        ))
        .unwrap();
    assert_eq!(nsdl.baseline.sample_size, 7);
    assert_eq!(nsdl.baseline.confidence, Confidence::Sufficient);
    let flag = nsdl.classification.flag().unwrap();
    assert_eq!(flag.direction, Direction::Lower);
    assert!(flag.z_score.unwrap() < -2.0);

    let ybl = report
        .observation(&daily(
            DimensionKey::Aggregator(Aggregator::Ybl),
            MetricName::TransactionSuccessRate,
        ))
        .unwrap();
    assert_eq!(ybl.classification.direction(), Some(Direction::Normal));

    // Daily and 10:00 hourly success rate on the Overall dimension
    assert_eq!(report.summary.overall_anomalies, 2);
    assert_eq!(report.summary.alert, HealthTier::Yellow);
    assert!(report.anomalies().all(|o| o.key().metric == MetricName::TransactionSuccessRate));

    // (940 + 600) / 2000
    let totals = report.day_totals.as_ref().unwrap();
    assert_eq!(totals.success_rate, Rate::Defined(0.77));
    assert_eq!(report.health.transaction.tier, Some(HealthTier::Red));
    assert_eq!(report.health.composite.tier(), Some(HealthTier::Yellow));
}

/// Days 1..=14 steady; day 15 carries only YBL traffic from Bihar
fn nsdl_and_goa_silent_on_last_day() -> Vec<MetricRecord> {
    (1..=15)
        .flat_map(steady_day)
        .filter(|r| r.date() != day(15) || (r.aggregator == Aggregator::Ybl && r.state == "Bihar"))
        .collect()
}

#[test]
fn test_silent_dimension_counts_as_zero_volume() {
    let source = InMemorySource::new(nsdl_and_goa_silent_on_last_day());
    let evaluator = Evaluator::new(source, EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    let nsdl = DimensionKey::Aggregator(Aggregator::Nsdl);
    let count = report
        .observation(&daily(nsdl.clone(), MetricName::TransactionCount))
        .unwrap();
    assert_eq!(count.observed, Rate::Defined(0.0));
    assert_eq!(count.classification.direction(), Some(Direction::Lower));

    let rate = report
        .observation(&daily(nsdl, MetricName::TransactionSuccessRate))
        .unwrap();
    assert_eq!(rate.observed, Rate::Undefined);
    assert_eq!(rate.classification, Classification::UndefinedObservation);

    let goa_gtv = report
        .observation(&daily(DimensionKey::State("Goa".into()), MetricName::GtvCrores))
        .unwrap();
    assert_eq!(goa_gtv.observed, Rate::Defined(0.0));

    let states = &report.state_movers;
    assert!(states.excluded.is_empty());
    let decliners: Vec<(&str, f64)> = states
        .decliners
        .iter()
        .map(|e| (e.id.as_str(), e.deviation_pct))
        .collect();
    assert_eq!(decliners, vec![("Goa", -100.0), ("Bihar", -50.0)]);
}

#[test]
fn test_silent_dimension_on_loading_day_stays_undefined() {
    let mut records = nsdl_and_goa_silent_on_last_day();
    for r in records.iter_mut().filter(|r| r.date() == day(15)) {
        r.completeness = aeps_core::Completeness::Partial;
    }
    let evaluator = Evaluator::new(InMemorySource::new(records), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    let count = report
        .observation(&daily(
            DimensionKey::Aggregator(Aggregator::Nsdl),
            MetricName::TransactionCount,
        ))
        .unwrap();
    assert_eq!(count.observed, Rate::Undefined);
    assert_eq!(count.classification, Classification::UndefinedObservation);
    assert!(
        report
            .state_movers
            .excluded
            .iter()
            .any(|e| e.id == "Goa")
    );
}

#[test]
fn test_steady_network_is_green() {
    let evaluator = Evaluator::new(fixture(1..=15, |_| {}), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    assert_eq!(report.summary.anomalies(), 0);
    assert_eq!(report.summary.insufficient_data, 0);
    assert_eq!(report.summary.alert, HealthTier::Green);
    assert_eq!(report.record_count, 15 * 4);
    assert_eq!(report.aggregator_breakdown.len(), 2);
    assert!(report.observations.windows(2).all(|w| w[0].key() < w[1].key()));
}

#[test]
fn test_short_history_is_insufficient_data() {
    let evaluator = Evaluator::new(fixture(12..=15, |_| {}), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    assert!(report.summary.evaluated > 0);
    assert_eq!(report.summary.insufficient_data, report.summary.evaluated);
    assert_eq!(report.summary.alert, HealthTier::Green);
    assert!(report.observations.iter().all(|o| matches!(
        o.classification,
        Classification::InsufficientData { sample_size: 3, required: 5 }
    )));
    assert!(report.state_movers.ranked.is_empty());
    assert_eq!(report.state_movers.excluded.len(), 2);
}

#[test]
fn test_partial_days_leave_baselines() {
    let mut records: Vec<MetricRecord> = (1..=15).flat_map(steady_day).collect();
    for r in records.iter_mut().filter(|r| r.date() == day(12)) {
        r.completeness = aeps_core::Completeness::Partial;
    }
    let evaluator = Evaluator::new(InMemorySource::new(records), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    let overall = report
        .observation(&daily(DimensionKey::Overall, MetricName::TransactionCount))
        .unwrap();
    assert_eq!(overall.baseline.sample_size, 6);
    assert!(!overall.partial);
}

#[test]
fn test_health_score_from_day_totals() {
    let source = InMemorySource::new(vec![
        MetricRecord::new(TimeBucket::new(day(15), 9), Aggregator::Ybl, "Bihar", "SBI")
            .with_transactions(100, 95, 1_000_000.0)
            .with_auth(100, 80, 50),
    ]);
    let evaluator = Evaluator::new(source, EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    match report.health.composite {
        Composite::Defined { score, tier } => {
            assert!((score - 90.5).abs() < 1e-9);
            assert_eq!(tier, HealthTier::Green);
        }
        Composite::Undefined => panic!("composite should be defined"),
    }
}

#[test]
fn test_empty_day_has_undefined_health() {
    let evaluator = Evaluator::new(InMemorySource::default(), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();
    assert_eq!(report.health.composite, Composite::Undefined);
    assert!(report.day_totals.is_none());
    assert!(report.observations.is_empty());
    assert!(report.gtv_share.is_empty());
}

#[test]
fn test_state_and_bank_movers() {
    let source = fixture(1..=15, |r| {
        r.transaction_value *= if r.state == "Bihar" { 2.0 } else { 0.5 };
    });
    let evaluator = Evaluator::new(source, EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();

    let states = &report.state_movers;
    assert_eq!(states.metric, MetricName::GtvCrores);
    assert_eq!(states.gainers.len(), 1);
    assert_eq!(states.gainers[0].id, "Bihar");
    assert_eq!(states.gainers[0].deviation_pct, 100.0);
    assert_eq!(states.decliners.len(), 1);
    assert_eq!(states.decliners[0].id, "Goa");
    assert_eq!(states.decliners[0].deviation_pct, -50.0);

    let banks = &report.bank_movers;
    assert_eq!(banks.gainers[0].id, "SBI");
    assert_eq!(banks.decliners[0].id, "PNB");

    let labels: Vec<&str> = report.gtv_share.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Bihar", "Goa"]);
}

#[test]
fn test_filters_are_applied_to_the_snapshot() {
    let evaluator = Evaluator::new(fixture(1..=15, |_| {}), EngineConfig::default()).unwrap();
    let report = evaluator
        .evaluate(
            &EvaluationRequest::for_date(day(15))
                .aggregators([Aggregator::Nsdl])
                .states(["Goa"]),
        )
        .unwrap();

    assert_eq!(report.record_count, 15);
    assert_eq!(report.aggregator_breakdown.len(), 1);
    assert!(report.observations.iter().all(|o| match &o.key().dimension {
        DimensionKey::Aggregator(a) => *a == Aggregator::Nsdl,
        DimensionKey::State(s) => s == "Goa",
        DimensionKey::Bank(b) => b == "PNB",
        DimensionKey::Overall => true,
    }));
}

#[test]
fn test_validation_fails_before_fetch() {
    let source = Arc::new(CountingSource {
        inner: fixture(1..=15, |_| {}),
        calls: AtomicUsize::new(0),
    });
    let evaluator = Evaluator::new(Arc::clone(&source), EngineConfig::default()).unwrap();

    let cases = [
        EvaluationRequest::for_date(day(15)).sensitivity(4),
        EvaluationRequest::for_date(day(15)).window_days(91),
        EvaluationRequest::for_date(day(15)).top_n(0),
        EvaluationRequest::for_date(day(15)).top_n(26),
        EvaluationRequest::for_date(day(15)).hours(20, 3),
    ];
    for req in &cases {
        assert!(matches!(evaluator.evaluate(req), Err(EngineError::Validation(_))));
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);

    assert!(matches!(
        evaluator.evaluate(&EvaluationRequest::for_date(day(15)).sensitivity(0)),
        Err(EngineError::Validation(ValidationError::SensitivityOutOfRange { sigma: 0 }))
    ));

    evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_source_failure_is_surfaced() {
    let evaluator = Evaluator::new(DownSource, EngineConfig::default()).unwrap();
    let err = evaluator
        .evaluate(&EvaluationRequest::for_date(day(15)))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Source(SourceError::Unavailable("warehouse offline".to_string()))
    );
}

#[test]
fn test_shared_cache_keeps_latest_window() {
    let cache = Arc::new(BaselineCache::default());
    let window = LookbackWindow::new(7).unwrap();
    let key = daily(DimensionKey::Overall, MetricName::TransactionSuccessRate);

    let today = Evaluator::new(fixture(1..=15, |_| {}), EngineConfig::default())
        .unwrap()
        .with_cache(Arc::clone(&cache));
    let report = today.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();
    assert_eq!(cache.len(), report.observations.len());
    assert_eq!(cache.get(&key, window).unwrap().window_end, day(14));

    // Backfilling an older date does not roll the shared baseline back
    today.evaluate(&EvaluationRequest::for_date(day(14))).unwrap();
    assert_eq!(cache.get(&key, window).unwrap().window_end, day(14));

    // A wider window is cached independently
    today
        .evaluate(&EvaluationRequest::for_date(day(15)).window_days(10))
        .unwrap();
    let wide = cache.get(&key, LookbackWindow::new(10).unwrap()).unwrap();
    assert_eq!(wide.window_start, day(5));
}

#[test]
fn test_report_serializes_to_json() {
    let evaluator = Evaluator::new(fixture(1..=15, |_| {}), EngineConfig::default()).unwrap();
    let report = evaluator.evaluate(&EvaluationRequest::for_date(day(15))).unwrap();
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["evaluation_date"], "2025-08-15");
    assert_eq!(value["summary"]["alert"], "green");
    assert_eq!(value["sensitivity_sigma"], 2);
}
