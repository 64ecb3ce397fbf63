//! Engine Error Types
//!
//! Only caller misconfiguration and collaborator failures are errors.
//! Undefined rates and low-confidence baselines are result states
//! (`Rate::Undefined`, `Classification::InsufficientData`), not errors.

/// Caller-supplied parameter outside its documented range.
///
/// Raised before any computation starts. Values are never clamped.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Lookback window not in `[min, max]` days
    WindowOutOfRange { days: u32, min: u32, max: u32 },
    /// Sensitivity not one of 1, 2, 3 sigma
    SensitivityOutOfRange { sigma: u8 },
    /// Mover list length not in `[min, max]`
    TopNOutOfRange { top_n: usize, min: usize, max: usize },
    /// Hour range not within 0..=23 or reversed
    HourRangeInvalid { start: u8, end: u8 },
    /// Minimum baseline sample count not in `[2, window]`
    MinSamplesOutOfRange { min_samples: usize, window_days: u32 },
    /// Any other bounded configuration field
    InvalidField { field: &'static str, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WindowOutOfRange { days, min, max } => write!(
                f,
                "Lookback window {} days out of range (expected {}..={})",
                days, min, max
            ),
            Self::SensitivityOutOfRange { sigma } => write!(
                f,
                "Anomaly sensitivity {}σ out of range (expected 1, 2 or 3)",
                sigma
            ),
            Self::TopNOutOfRange { top_n, min, max } => write!(
                f,
                "Mover top-N {} out of range (expected {}..={})",
                top_n, min, max
            ),
            Self::HourRangeInvalid { start, end } => write!(
                f,
                "Hour range {}..={} invalid (expected 0 <= start <= end <= 23)",
                start, end
            ),
            Self::MinSamplesOutOfRange {
                min_samples,
                window_days,
            } => write!(
                f,
                "Minimum sample count {} out of range (expected 2..={})",
                min_samples, window_days
            ),
            Self::InvalidField { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failure reported by a `RecordSource` collaborator.
///
/// The engine never retries; retry/backoff belongs to the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    Unavailable(String),
    QueryFailed(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "Record source unavailable: {}", e),
            Self::QueryFailed(e) => write!(f, "Record query failed: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors that can occur during an evaluation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Validation(ValidationError),
    Source(SourceError),
    /// Configuration could not be read or parsed
    Config(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "Validation failed: {}", e),
            Self::Source(e) => write!(f, "{}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Source(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}
