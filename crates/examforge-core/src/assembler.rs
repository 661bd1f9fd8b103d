//! Assembly of one test instance from selected items and groups.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::error::IntegrityError;
use crate::model::{Difficulty, Footprint, Group, Item, Payload};
use crate::selector::{GroupSelectionReport, ItemSelectionReport};

/// Everything selected for one section, before assembly.
#[derive(Debug, Clone)]
pub struct SectionDraw {
    pub section_id: String,
    pub items: Vec<Item>,
    pub groups: Vec<Group>,
    pub report: SectionSelectionReport,
}

/// Selection outcome of one section, carried into instance metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionSelectionReport {
    pub section_id: String,
    pub items: ItemSelectionReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupSelectionReport>,
}

impl SectionSelectionReport {
    /// Questions missing from items and groups together.
    pub fn shortfall(&self, group_size: u32) -> u32 {
        self.items.total_shortfall()
            + self.groups.iter().map(|g| g.shortfall * group_size).sum::<u32>()
    }
}

/// A question at its final position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    /// 1-based position within the section.
    pub position: u32,
    /// The group this question belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(flatten)]
    pub item: Item,
}

/// Shared context of a group placed in a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedGroup {
    pub group_id: String,
    pub topic: String,
    pub footprint: Footprint,
    /// Positions of the first and last member.
    pub positions: [u32; 2],
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: Payload,
}

/// One assembled section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSection {
    pub section_id: String,
    pub section_name: String,
    pub total_questions: u32,
    pub difficulty_counts: BTreeMap<Difficulty, u32>,
    pub questions: Vec<PlacedItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<PlacedGroup>,
}

/// Generation metadata written with each instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub generated_at: DateTime<Utc>,
    pub generator_version: String,
    pub blueprint_id: String,
    pub overlap_percentage: u8,
    pub section_reports: Vec<SectionSelectionReport>,
}

/// One complete, self-contained test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInstance {
    pub instance_id: String,
    pub instance_number: u32,
    pub test_name: String,
    pub test_series: String,
    pub total_questions: u32,
    pub total_marks: u32,
    pub duration_minutes: u32,
    pub sections: Vec<InstanceSection>,
    pub metadata: InstanceMetadata,
}

impl TestInstance {
    /// Every question id in the instance, in section order.
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|s| s.questions.iter())
            .map(|q| q.item.id.as_str())
    }

    /// Every group id in the instance.
    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|s| s.groups.iter())
            .map(|g| g.group_id.as_str())
    }

    pub fn question_count(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }
}

/// `{TEST_ID}_{NN}`.
pub fn instance_id(test_id: &str, instance_number: u32) -> String {
    format!("{test_id}_{instance_number:02}")
}

/// `{test_id lowercased}_{NN}.json`.
pub fn instance_file_name(test_id: &str, instance_number: u32) -> String {
    format!("{}_{instance_number:02}.json", test_id.to_lowercase())
}

/// Unit of shuffling: a lone item or a whole group.
enum Unit {
    Item(Item),
    Group(Group),
}

/// Builds [`TestInstance`]s and checks their structure.
#[derive(Debug, Clone, Copy)]
pub struct InstanceAssembler {
    shuffle: bool,
    overlap_percentage: u8,
}

impl InstanceAssembler {
    pub fn new(shuffle: bool, overlap_percentage: u8) -> Self {
        Self {
            shuffle,
            overlap_percentage,
        }
    }

    /// Assemble one instance. Groups stay contiguous; shuffling moves whole
    /// groups and lone items. Fails if any section's question count differs
    /// from the blueprint or an id repeats within the instance.
    pub fn assemble<R: Rng + ?Sized>(
        &self,
        blueprint: &Blueprint,
        instance_number: u32,
        draws: Vec<SectionDraw>,
        rng: &mut R,
    ) -> Result<TestInstance, IntegrityError> {
        let mut violations = Vec::new();
        if draws.len() != blueprint.sections.len() {
            violations.push(format!(
                "section count mismatch: expected {}, got {}",
                blueprint.sections.len(),
                draws.len()
            ));
        }

        let mut sections = Vec::with_capacity(draws.len());
        let mut section_reports = Vec::with_capacity(draws.len());

        for (spec, draw) in blueprint.sections.iter().zip(draws) {
            let mut units: Vec<Unit> = draw
                .groups
                .into_iter()
                .map(Unit::Group)
                .chain(draw.items.into_iter().map(Unit::Item))
                .collect();
            if self.shuffle {
                units.shuffle(rng);
            }

            let mut questions = Vec::with_capacity(spec.total_questions as usize);
            let mut groups = Vec::new();
            for unit in units {
                match unit {
                    Unit::Item(item) => {
                        let position = questions.len() as u32 + 1;
                        questions.push(PlacedItem {
                            position,
                            group_id: None,
                            item,
                        });
                    }
                    Unit::Group(group) => {
                        let first = questions.len() as u32 + 1;
                        for item in group.members {
                            let position = questions.len() as u32 + 1;
                            questions.push(PlacedItem {
                                position,
                                group_id: Some(group.group_id.clone()),
                                item,
                            });
                        }
                        groups.push(PlacedGroup {
                            positions: [first, questions.len() as u32],
                            group_id: group.group_id,
                            topic: group.topic,
                            footprint: group.footprint,
                            context: group.context,
                        });
                    }
                }
            }

            if questions.len() != spec.total_questions as usize {
                violations.push(format!(
                    "section {} has {} questions, expected {}",
                    spec.section_id,
                    questions.len(),
                    spec.total_questions
                ));
            }

            let mut difficulty_counts: BTreeMap<Difficulty, u32> = BTreeMap::new();
            for q in &questions {
                *difficulty_counts.entry(q.item.difficulty).or_default() += 1;
            }

            section_reports.push(draw.report);
            sections.push(InstanceSection {
                section_id: spec.section_id.clone(),
                section_name: spec.section_name.clone(),
                total_questions: spec.total_questions,
                difficulty_counts,
                questions,
                groups,
            });
        }

        let instance = TestInstance {
            instance_id: instance_id(&blueprint.test_id, instance_number),
            instance_number,
            test_name: format!("{} #{instance_number}", blueprint.test_name),
            test_series: blueprint.series_name().to_string(),
            total_questions: blueprint.total_questions,
            total_marks: blueprint.marks(),
            duration_minutes: blueprint.duration_minutes,
            sections,
            metadata: InstanceMetadata {
                generated_at: Utc::now(),
                generator_version: env!("CARGO_PKG_VERSION").to_string(),
                blueprint_id: blueprint.test_id.clone(),
                overlap_percentage: self.overlap_percentage,
                section_reports,
            },
        };

        violations.extend(check_integrity(&instance));
        if violations.is_empty() {
            Ok(instance)
        } else {
            Err(IntegrityError {
                instance_number,
                violations,
            })
        }
    }
}

/// Structural checks on an assembled instance: unique ids, contiguous
/// groups, and positions numbered 1..=n in each section.
pub fn check_integrity(instance: &TestInstance) -> Vec<String> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for id in instance.item_ids() {
        if !seen.insert(id) {
            duplicates.push(id.to_string());
        }
    }
    if !duplicates.is_empty() {
        violations.push(format!("duplicate question ids: {}", duplicates.join(", ")));
    }

    for section in &instance.sections {
        for (idx, q) in section.questions.iter().enumerate() {
            if q.position != idx as u32 + 1 {
                violations.push(format!(
                    "section {}: question {} has position {}",
                    section.section_id, q.item.id, q.position
                ));
                break;
            }
        }
        for group in &section.groups {
            let [first, last] = group.positions;
            let contiguous = first > 0
                && (first..=last).all(|p| {
                    section
                        .questions
                        .get(p as usize - 1)
                        .is_some_and(|q| q.group_id.as_deref() == Some(group.group_id.as_str()))
                });
            if !contiguous {
                violations.push(format!(
                    "section {}: group {} is not contiguous",
                    section.section_id, group.group_id
                ));
            }
        }
    }
    violations
}
