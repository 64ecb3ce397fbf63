//! Named incident scenarios for the CLI

use aeps_core::Aggregator;
use chrono::NaiveDate;

use crate::generator::Incident;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    build: fn(NaiveDate) -> Vec<Incident>,
}

impl Scenario {
    /// Incidents for a run whose final (evaluated) date is `date`
    pub fn incidents(&self, date: NaiveDate) -> Vec<Incident> {
        (self.build)(date)
    }
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "steady",
        description: "No incidents; only day-to-day noise",
        build: |_| Vec::new(),
    },
    Scenario {
        name: "nsdl_outage",
        description: "NSDL transaction success drops 25 points on the final day",
        build: |date| {
            vec![Incident::AggregatorSuccessDrop {
                aggregator: Aggregator::Nsdl,
                date,
                drop_pct: 25.0,
            }]
        },
    },
    Scenario {
        name: "bioauth_outage",
        description: "Bio-auth success collapses to 40% between 10:00 and 13:00",
        build: |date| {
            vec![Incident::BioAuthOutage {
                date,
                start_hour: 10,
                end_hour: 13,
                success_pct: 40.0,
            }]
        },
    },
    Scenario {
        name: "state_surge",
        description: "Bihar volume and GTV triple on the final day",
        build: |date| {
            vec![Incident::StateGtvShift {
                state: "Bihar".into(),
                date,
                factor: 3.0,
            }]
        },
    },
    Scenario {
        name: "state_slump",
        description: "West Bengal volume and GTV fall to a quarter on the final day",
        build: |date| {
            vec![Incident::StateGtvShift {
                state: "West Bengal".into(),
                date,
                factor: 0.25,
            }]
        },
    },
    Scenario {
        name: "partial_day",
        description: "Final day is still loading; data stops at 14:00",
        build: |_| vec![Incident::PartialFinalDay { cutoff_hour: 14 }],
    },
];

pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

/// Resolve a comma-separated list of scenario names
pub fn resolve(names: &str, date: NaiveDate) -> Result<Vec<Incident>, String> {
    let mut incidents = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let scenario = find(name).ok_or_else(|| format!("unknown scenario '{}'", name))?;
        incidents.extend(scenario.incidents(date));
    }
    Ok(incidents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_combines_scenarios() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let incidents = resolve("nsdl_outage, partial_day", date).unwrap();
        assert_eq!(incidents.len(), 2);
        assert!(resolve("steady", date).unwrap().is_empty());
        assert!(resolve("meteor", date).is_err());
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = SCENARIOS.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SCENARIOS.len());
    }
}
