//! Overlap measurement and series-level statistics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Overlap of one instance against every previously accepted instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapReport {
    pub instance_number: u32,
    /// Percentage of the instance's questions seen in earlier instances.
    pub realized_overlap: f64,
    pub total_count: usize,
    pub unique_count: usize,
    pub repeated_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repeated_ids: Vec<String>,
}

/// Measure how much of `ids` already appears in `prior`.
pub fn measure_overlap<'a>(
    instance_number: u32,
    ids: impl IntoIterator<Item = &'a str>,
    prior: &HashSet<String>,
) -> OverlapReport {
    let current: HashSet<&str> = ids.into_iter().collect();
    let mut repeated_ids: Vec<String> = current
        .iter()
        .filter(|id| prior.contains(**id))
        .map(|id| id.to_string())
        .collect();
    repeated_ids.sort();

    let total_count = current.len();
    let repeated_count = repeated_ids.len();
    let realized_overlap = if total_count == 0 {
        0.0
    } else {
        repeated_count as f64 / total_count as f64 * 100.0
    };

    OverlapReport {
        instance_number,
        realized_overlap,
        total_count,
        unique_count: total_count - repeated_count,
        repeated_count,
        repeated_ids,
    }
}

/// Aggregate figures for a generated series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub instances_generated: usize,
    pub questions_per_instance: u32,
    /// Mean realized overlap over every instance after the first.
    pub average_overlap: f64,
    pub min_overlap: f64,
    pub max_overlap: f64,
    pub total_unique_questions: usize,
}

impl SeriesStatistics {
    /// Build from per-instance overlaps in instance order.
    pub fn from_overlaps(
        overlaps: &[f64],
        questions_per_instance: u32,
        total_unique_questions: usize,
    ) -> Self {
        let later: &[f64] = if overlaps.len() > 1 {
            &overlaps[1..]
        } else {
            &[0.0]
        };
        let average = later.iter().sum::<f64>() / later.len() as f64;
        let min = later.iter().copied().fold(f64::INFINITY, f64::min);
        let max = later.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            instances_generated: overlaps.len(),
            questions_per_instance,
            average_overlap: round2(average),
            min_overlap: round2(min),
            max_overlap: round2(max),
            total_unique_questions,
        }
    }
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
