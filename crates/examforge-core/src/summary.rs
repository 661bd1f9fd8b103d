//! Series summary with JSON persistence.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blueprint::Blueprint;
use crate::ledger::UsageLedger;
use crate::model::DifficultyCounts;
use crate::presets::DifficultyPreset;
use crate::series::{HaltReason, InstanceRecord, SeriesConfig, SeriesOutcome};
use crate::statistics::SeriesStatistics;

/// File name the CLI writes next to the instances.
pub const SUMMARY_FILE: &str = "series_summary.json";

/// How many ids the usage report lists.
const MOST_USED_LIMIT: usize = 10;

/// Summary of a generated series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Unique run identifier.
    pub run_id: Uuid,
    pub series_name: String,
    pub generated_at: DateTime<Utc>,
    pub requested: u32,
    pub total_generated: usize,
    pub configuration: SeriesConfiguration,
    pub instances: Vec<InstanceRecord>,
    pub statistics: SeriesStatistics,
    pub usage: UsageReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
}

/// Settings the series was generated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfiguration {
    pub blueprint_id: String,
    pub overlap_percentage: u8,
    pub overlap_tolerance: f64,
    pub difficulty_preset: DifficultyPreset,
    /// Blueprint-level difficulty totals after any preset was applied.
    pub difficulty_distribution: DifficultyCounts,
    pub questions_per_test: u32,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// How often ids were reused across the series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub total_ids_used: usize,
    /// times used -> number of ids used that many times.
    pub usage_frequency: BTreeMap<usize, usize>,
    pub most_used: Vec<UsageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub id: String,
    pub usage_count: usize,
    pub used_in: Vec<u32>,
}

impl UsageReport {
    pub fn from_ledger(ledger: &UsageLedger) -> Self {
        Self {
            total_ids_used: ledger.len(),
            usage_frequency: ledger.frequency_table(),
            most_used: ledger
                .most_used(MOST_USED_LIMIT)
                .into_iter()
                .map(|(id, uses)| UsageEntry {
                    id: id.to_string(),
                    usage_count: uses.len(),
                    used_in: uses.to_vec(),
                })
                .collect(),
        }
    }
}

impl SeriesSummary {
    /// Summarize a finished run.
    pub fn build(
        blueprint: &Blueprint,
        config: &SeriesConfig,
        preset: DifficultyPreset,
        seed: Option<u64>,
        outcome: &SeriesOutcome,
        ledger: &UsageLedger,
    ) -> Self {
        let overlaps: Vec<f64> = outcome.records.iter().map(|r| r.realized_overlap).collect();
        let unique: HashSet<&str> = outcome
            .instances
            .iter()
            .flat_map(|i| i.item_ids())
            .collect();

        let mut distribution = DifficultyCounts::new();
        for block in blueprint.sections.iter().flat_map(|s| s.blocks()) {
            for (d, n) in block.difficulty_distribution {
                *distribution.entry(*d).or_default() += n;
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            series_name: blueprint.series_name().to_string(),
            generated_at: Utc::now(),
            requested: outcome.requested,
            total_generated: outcome.records.len(),
            configuration: SeriesConfiguration {
                blueprint_id: blueprint.test_id.clone(),
                overlap_percentage: config.budget.percent(),
                overlap_tolerance: config.tolerance,
                difficulty_preset: preset,
                difficulty_distribution: distribution,
                questions_per_test: blueprint.total_questions,
                duration_minutes: blueprint.duration_minutes,
                seed,
            },
            instances: outcome.records.clone(),
            statistics: SeriesStatistics::from_overlaps(
                &overlaps,
                blueprint.total_questions,
                unique.len(),
            ),
            usage: UsageReport::from_ledger(ledger),
            halt_reason: outcome.halt_reason.clone(),
        }
    }

    /// Save the summary as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize summary")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        Ok(())
    }

    /// Load a summary from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read summary from {}", path.display()))?;
        let summary: SeriesSummary =
            serde_json::from_str(&content).context("failed to parse summary JSON")?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::GroupingRules;
    use crate::corpus::CorpusIndex;
    use crate::model::Difficulty;
    use crate::selector::OverlapBudget;
    use crate::series::{MemorySink, NoopObserver, SeriesOrchestrator};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn fixture() -> (CorpusIndex, Blueprint) {
        let questions: Vec<_> = (0..30)
            .map(|i| {
                json!({
                    "question_id": format!("Q{i:03}"),
                    "topic": "Algebra",
                    "difficulty": (["Easy", "Medium", "Hard"][i % 3]),
                })
            })
            .collect();
        let mut corpus = CorpusIndex::new(5);
        corpus
            .add_document("maths.json", &json!({ "questions": questions }))
            .unwrap();

        let bp = json!({
            "test_id": "ALG",
            "test_name": "Algebra Drill",
            "test_series": "Spring",
            "total_questions": 6,
            "duration_minutes": 30,
            "sections": [{
                "section_id": "A",
                "section_name": "Algebra",
                "total_questions": 6,
                "source_files": ["maths.json"],
                "difficulty_distribution": {"Easy": 2, "Medium": 2, "Hard": 2},
                "topic_distribution": {"Algebra": 6}
            }]
        });
        let (bp, _) = Blueprint::from_value(bp, &GroupingRules::default()).unwrap();
        (corpus, bp)
    }

    fn run(count: u32) -> SeriesSummary {
        let (corpus, bp) = fixture();
        let config = SeriesConfig {
            count,
            budget: OverlapBudget::new(0).unwrap(),
            ..SeriesConfig::default()
        };
        let mut orchestrator =
            SeriesOrchestrator::new(&corpus, &bp, &GroupingRules::default(), config.clone());
        let mut rng = StdRng::seed_from_u64(99);
        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);
        SeriesSummary::build(
            &bp,
            &config,
            DifficultyPreset::Blueprint,
            Some(99),
            &outcome,
            orchestrator.ledger(),
        )
    }

    #[test]
    fn summary_reflects_outcome() {
        let summary = run(3);
        assert_eq!(summary.series_name, "Spring");
        assert_eq!(summary.total_generated, 3);
        assert_eq!(summary.requested, 3);
        assert_eq!(summary.statistics.total_unique_questions, 18);
        assert_eq!(summary.statistics.max_overlap, 0.0);
        assert_eq!(summary.configuration.questions_per_test, 6);
        assert_eq!(summary.configuration.difficulty_distribution[&Difficulty::Hard], 2);
        assert_eq!(summary.usage.total_ids_used, 18);
        assert_eq!(summary.usage.usage_frequency.get(&1), Some(&18));
        assert!(summary.halt_reason.is_none());
    }

    #[test]
    fn most_used_is_capped() {
        let summary = run(4);
        assert_eq!(summary.usage.most_used.len(), MOST_USED_LIMIT);
        assert!(summary.usage.most_used.iter().all(|e| e.usage_count == 1));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let summary = run(2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(SUMMARY_FILE);
        summary.save_json(&path).unwrap();

        let loaded = SeriesSummary::load_json(&path).unwrap();
        assert_eq!(loaded.run_id, summary.run_id);
        assert_eq!(loaded.instances, summary.instances);
        assert_eq!(loaded.configuration, summary.configuration);
    }

    #[test]
    fn load_missing_file_fails_with_context() {
        let err = SeriesSummary::load_json(Path::new("/nonexistent/summary.json")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read summary"));
    }
}
