//! # aeps-sim
//!
//! Synthetic AEPS traffic for exercising the evaluation engine: a seeded
//! hourly record generator plus named incident scenarios (aggregator
//! outages, bio-auth failures, state GTV shifts, partially loaded days).
//!
//! ```rust,no_run
//! use aeps_sim::{Generator, GeneratorConfig, scenarios};
//!
//! let config = GeneratorConfig::default();
//! let incidents = scenarios::resolve("nsdl_outage", config.end_date).unwrap();
//! let records = Generator::new(config).unwrap().with_incidents(incidents).generate();
//! ```

pub mod generator;
pub mod scenarios;

pub use generator::{Generator, GeneratorConfig, GeneratorError, Incident, StateProfile};
