//! Audit of instance files already written to an output directory.
//!
//! Re-reads each `{test_id}_{NN}.json`, repeats the assembler's integrity
//! checks on the stored data and, when a blueprint is supplied, compares the
//! realized sections against it. Topic and group counts must match exactly;
//! difficulty drift is only a warning because backfill and presets change
//! the realized mix.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::assembler::{check_integrity, InstanceSection, TestInstance};
use crate::blueprint::{Blueprint, GroupingRules};
use crate::model::{Difficulty, DifficultyCounts};

/// Findings for one instance file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceAudit {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub total_questions: usize,
    /// Realized difficulty mix over all sections.
    pub difficulty: DifficultyCounts,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl InstanceAudit {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Findings for a whole output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub audits: Vec<InstanceAudit>,
}

impl AuditReport {
    pub fn passed(&self) -> usize {
        self.audits.iter().filter(|a| a.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.audits.len() - self.passed()
    }
}

/// Whether a path looks like an instance file (`*_NN.json`).
pub fn is_instance_file(path: &Path) -> bool {
    if !path.extension().is_some_and(|ext| ext == "json") {
        return false;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('_'))
        .is_some_and(|(prefix, number)| {
            !prefix.is_empty() && !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
        })
}

/// Audit every instance file directly inside `dir`, in file-name order.
pub fn audit_directory(
    dir: &Path,
    blueprint: Option<&Blueprint>,
    rules: &GroupingRules,
) -> Result<AuditReport> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_instance_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let audits = paths
        .iter()
        .map(|p| audit_file(p, blueprint, rules))
        .collect();
    Ok(AuditReport { audits })
}

/// Audit one file. Unreadable or malformed files become a failed audit
/// rather than an error, so a directory run reports every file.
pub fn audit_file(path: &Path, blueprint: Option<&Blueprint>, rules: &GroupingRules) -> InstanceAudit {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let parsed = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read instance from {}", path.display()))
        .and_then(|content| {
            serde_json::from_str::<TestInstance>(&content).context("failed to parse instance JSON")
        });

    match parsed {
        Ok(instance) => InstanceAudit {
            file,
            ..audit_instance(&instance, blueprint, rules)
        },
        Err(e) => InstanceAudit {
            file,
            errors: vec![format!("{e:#}")],
            ..InstanceAudit::default()
        },
    }
}

/// Audit an instance already in memory.
pub fn audit_instance(
    instance: &TestInstance,
    blueprint: Option<&Blueprint>,
    rules: &GroupingRules,
) -> InstanceAudit {
    let mut audit = InstanceAudit {
        instance_id: Some(instance.instance_id.clone()),
        total_questions: instance.question_count(),
        ..InstanceAudit::default()
    };
    audit.errors.extend(check_integrity(instance));

    if instance.sections.is_empty() {
        audit.errors.push("instance has no sections".to_string());
    }
    if audit.total_questions != instance.total_questions as usize {
        audit.errors.push(format!(
            "question count mismatch: expected {}, got {}",
            instance.total_questions, audit.total_questions
        ));
    }

    let mut section_ids = HashSet::new();
    for section in &instance.sections {
        if !section_ids.insert(section.section_id.as_str()) {
            audit
                .errors
                .push(format!("duplicate section id: {}", section.section_id));
        }
        if section.questions.len() != section.total_questions as usize {
            audit.errors.push(format!(
                "section {}: expected {} questions, got {}",
                section.section_id,
                section.total_questions,
                section.questions.len()
            ));
        }

        let realized = realized_difficulty(section);
        let recorded: DifficultyCounts = section
            .difficulty_counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(d, n)| (*d, *n))
            .collect();
        if realized != recorded {
            audit.errors.push(format!(
                "section {}: recorded difficulty counts do not match its questions",
                section.section_id
            ));
        }
        for (d, n) in realized {
            *audit.difficulty.entry(d).or_default() += n;
        }
    }

    if let Some(bp) = blueprint {
        compare_with_blueprint(instance, bp, rules, &mut audit);
    }
    audit
}

fn compare_with_blueprint(
    instance: &TestInstance,
    blueprint: &Blueprint,
    rules: &GroupingRules,
    audit: &mut InstanceAudit,
) {
    if instance.metadata.blueprint_id != blueprint.test_id {
        audit.warnings.push(format!(
            "generated from blueprint {}, audited against {}",
            instance.metadata.blueprint_id, blueprint.test_id
        ));
    }
    if instance.total_questions != blueprint.total_questions {
        audit.errors.push(format!(
            "blueprint expects {} questions, instance declares {}",
            blueprint.total_questions, instance.total_questions
        ));
    }

    for expected in &blueprint.sections {
        let Some(section) = instance
            .sections
            .iter()
            .find(|s| s.section_id == expected.section_id)
        else {
            audit
                .errors
                .push(format!("section {} is missing", expected.section_id));
            continue;
        };
        let sid = &expected.section_id;

        if section.questions.len() != expected.total_questions as usize {
            audit.errors.push(format!(
                "section {sid}: blueprint expects {} questions, got {}",
                expected.total_questions,
                section.questions.len()
            ));
        }

        let mut declared_difficulty = DifficultyCounts::new();
        let mut declared_topics: BTreeMap<&str, u32> = BTreeMap::new();
        let mut declared_groups = 0u32;
        for block in expected.blocks() {
            for (d, n) in block.difficulty_distribution {
                *declared_difficulty.entry(*d).or_default() += n;
            }
            for (topic, n) in block.topic_distribution {
                if rules.is_grouped(topic, block.grouped_topics) {
                    declared_groups += n;
                } else {
                    *declared_topics.entry(topic.as_str()).or_default() += n;
                }
            }
        }

        let realized = realized_difficulty(section);
        for d in Difficulty::ALL {
            let want = declared_difficulty.get(&d).copied().unwrap_or(0);
            let got = realized.get(&d).copied().unwrap_or(0);
            if want != got {
                audit.warnings.push(format!(
                    "section {sid}: {got} {d} questions, blueprint asks for {want}"
                ));
            }
        }

        // Group members are counted as groups below, not per topic.
        let mut realized_topics: BTreeMap<&str, u32> = BTreeMap::new();
        for q in section.questions.iter().filter(|q| q.group_id.is_none()) {
            *realized_topics.entry(q.item.topic.as_str()).or_default() += 1;
        }
        let topics: BTreeSet<&str> = declared_topics
            .keys()
            .chain(realized_topics.keys())
            .copied()
            .collect();
        for topic in topics {
            let want = declared_topics.get(topic).copied().unwrap_or(0);
            let got = realized_topics.get(topic).copied().unwrap_or(0);
            if want != got {
                audit.errors.push(format!(
                    "section {sid}: topic '{topic}' has {got} questions, blueprint asks for {want}"
                ));
            }
        }

        if section.groups.len() != declared_groups as usize {
            audit.errors.push(format!(
                "section {sid}: {} groups, blueprint asks for {declared_groups}",
                section.groups.len()
            ));
        }
    }

    for section in &instance.sections {
        if !blueprint
            .sections
            .iter()
            .any(|s| s.section_id == section.section_id)
        {
            audit.errors.push(format!(
                "section {} is not in blueprint {}",
                section.section_id, blueprint.test_id
            ));
        }
    }
}

fn realized_difficulty(section: &InstanceSection) -> DifficultyCounts {
    let mut counts = DifficultyCounts::new();
    for q in &section.questions {
        *counts.entry(q.item.difficulty).or_default() += 1;
    }
    counts
}
