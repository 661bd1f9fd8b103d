//! Blueprint types and loading.
//!
//! A blueprint declares, per section (and optionally per subsection), how many
//! questions of each difficulty and topic a test requires. Blueprints are read
//! as raw JSON first so the validator can report type errors, then converted
//! to typed values.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BlueprintError;
use crate::model::DifficultyCounts;
use crate::validator::{validate, ValidationReport};

/// How grouped topics are recognized and how large a group is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingRules {
    /// Items per group (K).
    pub group_size: u32,
    /// Topic names that always denote grouped content.
    pub grouped_topics: Vec<String>,
}

impl Default for GroupingRules {
    fn default() -> Self {
        Self {
            group_size: 5,
            grouped_topics: vec!["Data Interpretation".to_string()],
        }
    }
}

impl GroupingRules {
    /// A topic is grouped if the section marks it explicitly or its name
    /// follows the configured convention.
    pub fn is_grouped(&self, topic: &str, explicit: &[String]) -> bool {
        explicit.iter().any(|t| t == topic) || self.grouped_topics.iter().any(|t| t == topic)
    }
}

/// A complete test blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub test_id: String,
    pub test_name: String,
    /// Series name used in summaries.
    #[serde(default)]
    pub test_series: Option<String>,
    pub total_questions: u32,
    #[serde(default)]
    pub total_marks: Option<u32>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub sections: Vec<SectionSpec>,
}

fn default_duration() -> u32 {
    120
}

impl Blueprint {
    /// Total marks, defaulting to one mark per question.
    pub fn marks(&self) -> u32 {
        self.total_marks.unwrap_or(self.total_questions)
    }

    /// Series name, defaulting to the test name.
    pub fn series_name(&self) -> &str {
        self.test_series.as_deref().unwrap_or(&self.test_name)
    }

    /// Every corpus file referenced by any section, in first-seen order.
    pub fn source_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for section in &self.sections {
            for f in &section.source_files {
                if !files.contains(f) {
                    files.push(f.clone());
                }
            }
        }
        files
    }

    /// Convert validated JSON into a typed blueprint.
    ///
    /// Runs the validator first; any error makes this fail with every
    /// collected message. Warnings are returned alongside the blueprint.
    pub fn from_value(
        value: Value,
        rules: &GroupingRules,
    ) -> Result<(Blueprint, Vec<String>), BlueprintError> {
        let report = validate(&value, rules);
        if !report.is_valid() {
            return Err(BlueprintError::Invalid {
                errors: report.errors,
            });
        }
        let blueprint: Blueprint =
            serde_json::from_value(value).map_err(|e| BlueprintError::Invalid {
                errors: vec![format!("blueprint does not match the expected shape: {e}")],
            })?;
        Ok((blueprint, report.warnings))
    }
}

/// One section of a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub section_id: String,
    pub section_name: String,
    pub total_questions: u32,
    /// Corpus files this section draws from.
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub difficulty_distribution: DifficultyCounts,
    /// Topic -> count; for a grouped topic the count is a number of groups.
    #[serde(default)]
    pub topic_distribution: BTreeMap<String, u32>,
    /// Topics explicitly marked as grouped.
    #[serde(default)]
    pub grouped_topics: Vec<String>,
    /// Optional blend of separately specified parts.
    #[serde(default)]
    pub subsections: Vec<SubsectionSpec>,
}

/// A subsection: same shape as a section, minus id and sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsectionSpec {
    pub subsection_name: String,
    pub total_questions: u32,
    #[serde(default)]
    pub difficulty_distribution: DifficultyCounts,
    #[serde(default)]
    pub topic_distribution: BTreeMap<String, u32>,
    #[serde(default)]
    pub grouped_topics: Vec<String>,
}

/// A unit of selection: either a section without subsections or one
/// subsection of a section.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub name: &'a str,
    pub total_questions: u32,
    pub difficulty_distribution: &'a DifficultyCounts,
    pub topic_distribution: &'a BTreeMap<String, u32>,
    pub grouped_topics: &'a [String],
}

impl SectionSpec {
    /// The selection blocks of this section.
    pub fn blocks(&self) -> Vec<Block<'_>> {
        if self.subsections.is_empty() {
            return vec![Block {
                name: &self.section_name,
                total_questions: self.total_questions,
                difficulty_distribution: &self.difficulty_distribution,
                topic_distribution: &self.topic_distribution,
                grouped_topics: &self.grouped_topics,
            }];
        }
        self.subsections
            .iter()
            .map(|s| Block {
                name: &s.subsection_name,
                total_questions: s.total_questions,
                difficulty_distribution: &s.difficulty_distribution,
                topic_distribution: &s.topic_distribution,
                grouped_topics: &s.grouped_topics,
            })
            .collect()
    }
}

/// Read a blueprint file as raw JSON.
pub fn read_blueprint_value(path: &Path) -> Result<Value, BlueprintError> {
    let content = std::fs::read_to_string(path).map_err(|source| BlueprintError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| BlueprintError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate a blueprint file without converting it.
pub fn validate_file(path: &Path, rules: &GroupingRules) -> Result<ValidationReport, BlueprintError> {
    let value = read_blueprint_value(path)?;
    Ok(validate(&value, rules))
}

/// Read, validate and convert a blueprint file.
pub fn load_blueprint(
    path: &Path,
    rules: &GroupingRules,
) -> Result<(Blueprint, Vec<String>), BlueprintError> {
    let value = read_blueprint_value(path)?;
    Blueprint::from_value(value, rules)
}
