//! AEPS metric aggregation and anomaly scoring.
//!
//! Turns pre-aggregated transaction and bio-authentication records into
//! rates, rolling baselines, anomaly verdicts, health scores and mover
//! rankings. Data access sits behind [`RecordSource`]; everything else is
//! synchronous, CPU-bound computation.

pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod metrics;
pub mod movers;
pub mod rates;
pub mod record;
pub mod share;
pub mod snapshot;
pub mod stats;

pub use anomaly::{AnomalyFlag, Classification, Direction, Sensitivity, classify, detect};
pub use baseline::{Baseline, BaselineCache, BaselineEstimator, Confidence, LookbackWindow, SeriesKey};
pub use config::{EngineConfig, EvaluationParams};
pub use engine::{
    ALERT_METRICS, AnomalySummary, EvaluationReport, EvaluationRequest, Evaluator, SeriesObservation,
};
pub use error::{EngineError, SourceError, ValidationError};
pub use health::{Composite, HealthScore, HealthTier};
pub use movers::{MoverOptions, MoverRank, TopN};
pub use rates::{DerivedMetric, MetricName, RUPEES_PER_CRORE, Rate};
pub use record::{
    Aggregator, Completeness, DimensionKey, DimensionKind, HourRange, InMemorySource, MetricRecord,
    RecordQuery, RecordSource, TimeBucket,
};
pub use snapshot::Snapshot;
