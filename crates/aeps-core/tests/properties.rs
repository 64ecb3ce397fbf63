//! Property tests for rate, detector, health and mover invariants

use aeps_core::anomaly::{Classification, Direction, Sensitivity, classify, detect};
use aeps_core::baseline::{Baseline, SeriesKey};
use aeps_core::health::{Composite, HealthScore};
use aeps_core::movers::{self, MoverCandidate, MoverOptions, TopN};
use aeps_core::rates::{DerivedMetric, MetricName, Rate};
use aeps_core::record::{Aggregator, DimensionKey, DimensionKind, MetricRecord, TimeBucket};
use chrono::NaiveDate;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
}

fn sensitivity() -> impl Strategy<Value = Sensitivity> {
    prop_oneof![
        Just(Sensitivity::One),
        Just(Sensitivity::Two),
        Just(Sensitivity::Three),
    ]
}

fn percent() -> impl Strategy<Value = Rate> {
    prop_oneof![
        4 => (0.0f64..=100.0).prop_map(Rate::Defined),
        1 => Just(Rate::Undefined),
    ]
}

/// (id, current, history) rows for the mover ranker
fn mover_rows() -> impl Strategy<Value = Vec<(String, f64, Vec<f64>)>> {
    prop::collection::vec(
        (
            0.0f64..500.0,
            prop::collection::vec(1.0f64..500.0, 0..10),
        ),
        0..20,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (current, history))| (format!("S{:02}", i), current, history))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    #[test]
    fn success_rate_is_a_fraction_or_undefined(count in 0u64..1_000_000, pick in 0.0f64..=1.0) {
        let success = (count as f64 * pick).floor() as u64;
        let record = MetricRecord::new(TimeBucket::new(date(), 0), Aggregator::Ybl, "Bihar", "SBI")
            .with_transactions(count, success, 0.0);
        let metric = DerivedMetric::from_record(&record);

        match metric.success_rate {
            Rate::Defined(r) => {
                prop_assert!(count > 0);
                prop_assert!((0.0..=1.0).contains(&r));
            }
            Rate::Undefined => prop_assert_eq!(count, 0),
        }
    }

    #[test]
    fn composite_is_bounded_or_undefined(txn in percent(), bio in percent()) {
        let h = HealthScore::from_percentages(txn, bio);
        match h.composite {
            Composite::Defined { score, .. } => {
                prop_assert!(txn.is_defined() && bio.is_defined());
                prop_assert!((0.0..=100.0).contains(&score));
            }
            Composite::Undefined => prop_assert!(!txn.is_defined() || !bio.is_defined()),
        }
    }

    #[test]
    fn detector_is_deterministic(
        observed in -1e6f64..1e6,
        mean in -1e6f64..1e6,
        stddev in 0.0f64..1e4,
        k in sensitivity(),
    ) {
        prop_assert_eq!(detect(observed, mean, stddev, k), detect(observed, mean, stddev, k));
    }

    #[test]
    fn z_exactly_at_threshold_is_normal(
        mean in -1000i32..1000,
        exp in -4i32..=4,
        k in sensitivity(),
        below in any::<bool>(),
    ) {
        let mean = f64::from(mean);
        let stddev = 2f64.powi(exp);
        let offset = k.sigma() * stddev;
        let observed = if below { mean - offset } else { mean + offset };

        let flag = detect(observed, mean, stddev, k);
        prop_assert_eq!(flag.z_score.map(f64::abs), Some(k.sigma()));
        prop_assert_eq!(flag.direction, Direction::Normal);
    }

    #[test]
    fn observed_at_mean_is_normal(mean in -1e6f64..1e6, stddev in 1e-6f64..1e4, k in sensitivity()) {
        let flag = detect(mean, mean, stddev, k);
        prop_assert_eq!(flag.direction, Direction::Normal);
        prop_assert_eq!(flag.z_score, Some(0.0));
    }

    #[test]
    fn low_confidence_is_only_ever_insufficient(
        samples in prop::collection::vec(0.0f64..100.0, 0..5),
        observed in percent(),
        k in sensitivity(),
    ) {
        let key = SeriesKey::daily(DimensionKey::Overall, MetricName::AuthSuccessRate);
        let baseline = Baseline::from_samples(key, date(), date(), &samples, 5);
        prop_assert!(baseline.is_low_confidence());
        let is_insufficient = matches!(
            classify(observed, &baseline, k),
            Classification::InsufficientData { .. }
        );
        prop_assert!(is_insufficient);
    }

    #[test]
    fn movers_are_ordered_and_confident(rows in mover_rows(), top_n in 1usize..=25) {
        let baselines: Vec<Baseline> = rows
            .iter()
            .map(|(id, _, history)| {
                let key = SeriesKey::daily(DimensionKey::State(id.clone()), MetricName::GtvCrores);
                Baseline::from_samples(key, date(), date(), history, 5)
            })
            .collect();
        let candidates: Vec<MoverCandidate<'_>> = rows
            .iter()
            .zip(&baselines)
            .map(|((id, current, _), baseline)| MoverCandidate {
                id: id.clone(),
                current: Rate::Defined(*current),
                baseline,
            })
            .collect();
        let options = MoverOptions {
            top_n: TopN::new(top_n).unwrap(),
            ..MoverOptions::default()
        };
        let rank = movers::rank(DimensionKind::State, MetricName::GtvCrores, &candidates, &options);

        prop_assert!(rank.gainers.len() <= top_n);
        prop_assert!(rank.decliners.len() <= top_n);
        for pair in rank.gainers.windows(2) {
            prop_assert!(pair[0].deviation_pct >= pair[1].deviation_pct);
        }
        for pair in rank.decliners.windows(2) {
            prop_assert!(pair[0].deviation_pct <= pair[1].deviation_pct);
        }
        for entry in rank.gainers.iter().chain(&rank.decliners) {
            prop_assert!(entry.sample_size >= 5);
        }
        prop_assert_eq!(rank.ranked.len() + rank.excluded.len(), rows.len());
    }
}
