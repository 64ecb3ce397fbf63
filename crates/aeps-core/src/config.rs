//! Engine configuration
//!
//! Loaded from JSON; every field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::anomaly::Sensitivity;
use crate::baseline::{DEFAULT_CACHE_CAPACITY, DEFAULT_MIN_SAMPLES, LookbackWindow};
use crate::error::{EngineError, ValidationError};
use crate::movers::{MoverOptions, TopN};
use crate::rates::MetricName;
use crate::share::DEFAULT_OTHERS_THRESHOLD_PCT;

/// Upper bound on evaluation worker threads
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default lookback in days (7..=90)
    pub window_days: u32,
    /// Default sensitivity in sigma (1, 2 or 3)
    pub sensitivity: u8,
    /// Default mover list length (1..=25)
    pub top_n: usize,
    /// Samples needed for a trusted baseline (2..=window_days)
    pub min_samples: usize,
    /// Metric movers are ranked on
    pub mover_metric: MetricName,
    pub significance_band_pct: Option<f64>,
    pub min_current_value: Option<f64>,
    pub share_others_threshold_pct: f64,
    /// 0 = available parallelism, capped at `MAX_WORKERS`
    pub workers: usize,
    pub cache_capacity: usize,
    /// Also evaluate hour-of-day baselines for the Overall dimension
    pub hourly_baselines: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            sensitivity: 2,
            top_n: 5,
            min_samples: DEFAULT_MIN_SAMPLES,
            mover_metric: MetricName::GtvCrores,
            significance_band_pct: None,
            min_current_value: None,
            share_others_threshold_pct: DEFAULT_OTHERS_THRESHOLD_PCT,
            workers: 0,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            hourly_baselines: true,
        }
    }
}

/// Validated per-evaluation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationParams {
    pub window: LookbackWindow,
    pub sensitivity: Sensitivity,
    pub top_n: TopN,
    pub min_samples: usize,
}

impl EvaluationParams {
    pub fn new(
        window_days: u32,
        sensitivity: u8,
        top_n: usize,
        min_samples: usize,
    ) -> Result<Self, ValidationError> {
        let window = LookbackWindow::new(window_days)?;
        let sensitivity = Sensitivity::try_from(sensitivity)?;
        let top_n = TopN::new(top_n)?;
        if min_samples < 2 || min_samples > window.days() as usize {
            return Err(ValidationError::MinSamplesOutOfRange {
                min_samples,
                window_days,
            });
        }
        Ok(Self {
            window,
            sensitivity,
            top_n,
            min_samples,
        })
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Check every bounded field; returns the default evaluation parameters
    pub fn validate(&self) -> Result<EvaluationParams, ValidationError> {
        let params = EvaluationParams::new(
            self.window_days,
            self.sensitivity,
            self.top_n,
            self.min_samples,
        )?;

        if let Some(band) = self.significance_band_pct {
            if !band.is_finite() || band < 0.0 {
                return Err(ValidationError::InvalidField {
                    field: "significance_band_pct",
                    reason: format!("{} is not a non-negative percentage", band),
                });
            }
        }
        if let Some(floor) = self.min_current_value {
            if !floor.is_finite() {
                return Err(ValidationError::InvalidField {
                    field: "min_current_value",
                    reason: "must be finite".to_string(),
                });
            }
        }
        if !(0.0..=100.0).contains(&self.share_others_threshold_pct) {
            return Err(ValidationError::InvalidField {
                field: "share_others_threshold_pct",
                reason: format!("{} is not within 0..=100", self.share_others_threshold_pct),
            });
        }
        if self.workers > MAX_WORKERS {
            return Err(ValidationError::InvalidField {
                field: "workers",
                reason: format!("{} exceeds {}", self.workers, MAX_WORKERS),
            });
        }
        if self.cache_capacity == 0 {
            return Err(ValidationError::InvalidField {
                field: "cache_capacity",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(params)
    }

    pub fn mover_options(&self, top_n: TopN) -> MoverOptions {
        MoverOptions {
            top_n,
            significance_band_pct: self.significance_band_pct,
            min_current_value: self.min_current_value,
        }
    }

    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_WORKERS),
            n => n,
        }
    }

    /// Settings matching the operations dashboard: 10% mover band and a
    /// 1 Crore volume floor.
    pub fn dashboard() -> Self {
        Self {
            significance_band_pct: Some(10.0),
            min_current_value: Some(1.0),
            ..Self::default()
        }
    }
}
