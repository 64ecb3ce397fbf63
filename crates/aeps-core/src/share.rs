//! GTV share breakdown with small contributors folded into "Others"

use serde::{Deserialize, Serialize};

pub const OTHERS_LABEL: &str = "Others";

/// Default share below which a contributor folds into "Others"
pub const DEFAULT_OTHERS_THRESHOLD_PCT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub label: String,
    pub value: f64,
    pub share_pct: f64,
    /// Number of contributors folded into this entry
    pub members: usize,
}

/// Share of total per contributor.
///
/// Sorted by value descending, ties by label; "Others" (if any) is last.
/// Empty when the total is not positive.
pub fn gtv_share(values: &[(String, f64)], others_threshold_pct: f64) -> Vec<ShareEntry> {
    let total: f64 = values
        .iter()
        .map(|(_, v)| *v)
        .filter(|v| v.is_finite() && *v > 0.0)
        .sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut entries = Vec::with_capacity(values.len());
    let mut others_value = 0.0;
    let mut others_members = 0;

    for (label, value) in values {
        if !value.is_finite() || *value <= 0.0 {
            continue;
        }
        let share_pct = value / total * 100.0;
        if share_pct < others_threshold_pct {
            others_value += value;
            others_members += 1;
        } else {
            entries.push(ShareEntry {
                label: label.clone(),
                value: *value,
                share_pct,
                members: 1,
            });
        }
    }

    entries.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.label.cmp(&b.label)));

    if others_members > 0 {
        entries.push(ShareEntry {
            label: OTHERS_LABEL.to_string(),
            value: others_value,
            share_pct: others_value / total * 100.0,
            members: others_members,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[(&str, f64)]) -> Vec<(String, f64)> {
        data.iter().map(|(l, v)| (l.to_string(), *v)).collect()
    }

    #[test]
    fn test_small_states_fold_into_others() {
        let out = gtv_share(
            &rows(&[("Goa", 1.0), ("Bihar", 60.0), ("Assam", 37.0), ("Sikkim", 1.5), ("Ladakh", 0.5)]),
            DEFAULT_OTHERS_THRESHOLD_PCT,
        );
        let labels: Vec<_> = out.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Bihar", "Assam", "Others"]);
        let others = &out[2];
        assert_eq!(others.members, 3);
        assert!((others.value - 3.0).abs() < 1e-12);
        let total_share: f64 = out.iter().map(|e| e.share_pct).sum();
        assert!((total_share - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_sorted_by_label() {
        let out = gtv_share(&rows(&[("Kerala", 5.0), ("Assam", 5.0)]), 2.0);
        assert_eq!(out[0].label, "Assam");
        assert_eq!(out[1].label, "Kerala");
    }

    #[test]
    fn test_empty_total() {
        assert!(gtv_share(&rows(&[("Goa", 0.0)]), 2.0).is_empty());
        assert!(gtv_share(&[], 2.0).is_empty());
    }
}
