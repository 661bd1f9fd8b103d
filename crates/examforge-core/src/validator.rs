//! Static blueprint validation.
//!
//! Works on raw JSON so type errors can be reported alongside arithmetic
//! errors. Every check appends its own message and validation continues, so a
//! blueprint author sees all problems in one pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::blueprint::GroupingRules;
use crate::model::Difficulty;

const REQUIRED_BLUEPRINT_KEYS: [&str; 4] = ["test_id", "test_name", "total_questions", "sections"];
const REQUIRED_SECTION_KEYS: [&str; 4] =
    ["section_id", "section_name", "total_questions", "source_files"];
const DISTRIBUTION_KEYS: [&str; 2] = ["difficulty_distribution", "topic_distribution"];

/// Outcome of validating a blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Problems that block generation.
    pub errors: Vec<String>,
    /// Observations that do not block generation.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// `true` iff no errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate a blueprint document.
pub fn validate(blueprint: &Value, rules: &GroupingRules) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(root) = blueprint.as_object() else {
        report.error("blueprint must be a JSON object");
        return report;
    };

    validate_top_level(root, &mut report);

    let Some(sections) = root.get("sections").and_then(Value::as_array) else {
        return report;
    };

    let mut seen_ids = HashSet::new();
    // None once any section total is unusable or the sum overflows.
    let mut sections_total = Some(0u64);

    for (idx, section) in sections.iter().enumerate() {
        let label = format!("section {}", idx + 1);
        let Some(section) = section.as_object() else {
            report.error(format!("{label}: must be an object"));
            sections_total = None;
            continue;
        };

        let total = validate_section(section, &label, rules, &mut report);
        sections_total = sections_total.zip(total).and_then(|(sum, t)| sum.checked_add(t));

        if let Some(sid) = section.get("section_id") {
            let key = sid.to_string();
            if !seen_ids.insert(key) {
                report.error(format!("duplicate section_id found: {sid}"));
            }
        }
    }

    let declared = root.get("total_questions").and_then(positive_count);
    let sections_total = sections_total.filter(|_| !sections.is_empty());
    if let (Some(declared), Some(sections_total)) = (declared, sections_total) {
        if declared != sections_total {
            report.error(format!(
                "total questions mismatch: blueprint says {declared}, but sections sum to {sections_total}"
            ));
        }
    }

    report
}

fn validate_top_level(root: &Map<String, Value>, report: &mut ValidationReport) {
    for key in REQUIRED_BLUEPRINT_KEYS {
        if !root.contains_key(key) {
            report.error(format!("missing required key in blueprint: '{key}'"));
        }
    }

    if let Some(test_id) = root.get("test_id") {
        if !test_id.as_str().is_some_and(|s| !s.trim().is_empty()) {
            report.error("invalid test_id: must be a non-empty string");
        }
    }

    if let Some(name) = root.get("test_name") {
        if !name.is_string() {
            report.error("invalid test_name: must be a string");
        }
    }

    if let Some(total) = root.get("total_questions") {
        match read_count(total) {
            Count::Valid(n) if n > 0 => {}
            Count::TooLarge => report.error(format!(
                "invalid total_questions: must be at most {}",
                u32::MAX
            )),
            _ => report.error("invalid total_questions: must be a positive integer"),
        }
    }

    for key in ["total_marks", "duration_minutes"] {
        if let Some(v) = root.get(key) {
            match read_count(v) {
                Count::Valid(_) => {}
                Count::TooLarge => {
                    report.error(format!("invalid {key}: must be at most {}", u32::MAX))
                }
                Count::Invalid => {
                    report.error(format!("invalid {key}: must be a non-negative integer"))
                }
            }
        }
    }

    if let Some(sections) = root.get("sections") {
        match sections.as_array() {
            None => report.error("'sections' must be a list"),
            Some(list) if list.is_empty() => report.error("'sections' cannot be empty"),
            Some(_) => {}
        }
    }
}

/// Validate one section; returns its total when it is usable for the
/// blueprint-level sum.
fn validate_section(
    section: &Map<String, Value>,
    label: &str,
    rules: &GroupingRules,
    report: &mut ValidationReport,
) -> Option<u64> {
    let mut structurally_complete = true;
    for key in REQUIRED_SECTION_KEYS {
        if !section.contains_key(key) {
            report.error(format!("{label}: missing required key '{key}'"));
            structurally_complete = false;
        }
    }

    let has_subsections = section.contains_key("subsections");
    if !has_subsections {
        for key in DISTRIBUTION_KEYS {
            if !section.contains_key(key) {
                report.error(format!("{label}: missing required key '{key}'"));
                structurally_complete = false;
            }
        }
    }

    let section_id = section
        .get("section_id")
        .and_then(Value::as_str)
        .unwrap_or(label)
        .to_string();

    let total = section
        .get("total_questions")
        .and_then(|v| block_total(v, &section_id, report));

    if let Some(sources) = section.get("source_files") {
        validate_source_files(sources, &section_id, report);
    }

    let total = total?;
    if !structurally_complete {
        return Some(total);
    }

    if has_subsections {
        validate_subsections(section, &section_id, total, rules, report);
    } else {
        let explicit = grouped_marker(section, &section_id, report);
        validate_distributions(section, &section_id, total, &explicit, rules, report);
    }

    Some(total)
}

fn validate_source_files(sources: &Value, section_id: &str, report: &mut ValidationReport) {
    let Some(list) = sources.as_array() else {
        report.error(format!("{section_id}: source_files must be a list"));
        return;
    };
    if list.is_empty() {
        report.error(format!("{section_id}: source_files cannot be empty"));
        return;
    }
    if list
        .iter()
        .any(|sf| !sf.as_str().is_some_and(|s| !s.trim().is_empty()))
    {
        report.error(format!(
            "{section_id}: invalid source file name in source_files"
        ));
    }
}

fn validate_subsections(
    section: &Map<String, Value>,
    section_id: &str,
    section_total: u64,
    rules: &GroupingRules,
    report: &mut ValidationReport,
) {
    let Some(subsections) = section.get("subsections").and_then(Value::as_array) else {
        report.error(format!("{section_id}: subsections must be a list"));
        return;
    };
    if subsections.is_empty() {
        report.error(format!("{section_id}: subsections cannot be empty"));
        return;
    }

    let mut subsection_sum = 0u64;
    let mut all_usable = true;

    for (idx, sub) in subsections.iter().enumerate() {
        let Some(sub) = sub.as_object() else {
            report.error(format!("{section_id}: subsection {} must be an object", idx + 1));
            all_usable = false;
            continue;
        };

        let name = sub
            .get("subsection_name")
            .and_then(Value::as_str)
            .map(|n| format!("{section_id}/{n}"))
            .unwrap_or_else(|| format!("{section_id}/subsection {}", idx + 1));

        let mut complete = true;
        for key in ["subsection_name", "total_questions"]
            .into_iter()
            .chain(DISTRIBUTION_KEYS)
        {
            if !sub.contains_key(key) {
                report.error(format!("{name}: missing required key '{key}'"));
                complete = false;
            }
        }

        let Some(total) = sub
            .get("total_questions")
            .and_then(|v| block_total(v, &name, report))
        else {
            all_usable = false;
            continue;
        };
        subsection_sum += total;

        if complete {
            let explicit = grouped_marker(sub, &name, report);
            validate_distributions(sub, &name, total, &explicit, rules, report);
        }
    }

    if all_usable && subsection_sum != section_total {
        report.error(format!(
            "{section_id}: subsection totals sum to {subsection_sum}, but total_questions is {section_total}"
        ));
    }
}

fn grouped_marker(
    block: &Map<String, Value>,
    name: &str,
    report: &mut ValidationReport,
) -> Vec<String> {
    match block.get("grouped_topics") {
        None => Vec::new(),
        Some(Value::Array(list)) => {
            let names: Vec<String> = list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if names.len() != list.len() {
                report.error(format!("{name}: grouped_topics must contain only strings"));
            }
            names
        }
        Some(_) => {
            report.error(format!("{name}: grouped_topics must be a list"));
            Vec::new()
        }
    }
}

fn validate_distributions(
    block: &Map<String, Value>,
    name: &str,
    total: u64,
    explicit_grouped: &[String],
    rules: &GroupingRules,
    report: &mut ValidationReport,
) {
    if let Some(dist) = block.get("difficulty_distribution") {
        validate_difficulty_distribution(dist, name, total, report);
    }
    if let Some(dist) = block.get("topic_distribution") {
        validate_topic_distribution(dist, name, total, explicit_grouped, rules, report);
    }
}

fn validate_difficulty_distribution(
    dist: &Value,
    name: &str,
    total: u64,
    report: &mut ValidationReport,
) {
    let Some(dist) = dist.as_object() else {
        report.error(format!("{name}: difficulty_distribution must be a dictionary"));
        return;
    };

    let mut sum = Some(0u64);
    for (key, count) in dist {
        if !Difficulty::ALL.iter().any(|d| d.as_str() == key) {
            report.error(format!(
                "{name}: invalid difficulty level '{key}'. Must be one of: Easy, Medium, Hard"
            ));
        }
        match read_count(count) {
            Count::Valid(n) => sum = sum.and_then(|s| s.checked_add(n)),
            Count::TooLarge => {
                report.error(format!(
                    "{name}: difficulty_distribution['{key}'] is too large (at most {})",
                    u32::MAX
                ));
                sum = None;
            }
            Count::Invalid => report.error(format!(
                "{name}: difficulty_distribution['{key}'] must be a non-negative integer"
            )),
        }
    }

    if let Some(sum) = sum.filter(|s| *s != total) {
        report.error(format!(
            "{name}: difficulty_distribution sum ({sum}) doesn't match total_questions ({total})"
        ));
    }

    for difficulty in Difficulty::ALL {
        if !dist.contains_key(difficulty.as_str()) {
            report.warn(format!(
                "{name}: missing difficulty level '{difficulty}' in difficulty_distribution (assuming 0)"
            ));
        }
    }
}

fn validate_topic_distribution(
    dist: &Value,
    name: &str,
    total: u64,
    explicit_grouped: &[String],
    rules: &GroupingRules,
    report: &mut ValidationReport,
) {
    let Some(dist) = dist.as_object() else {
        report.error(format!("{name}: topic_distribution must be a dictionary"));
        return;
    };
    if dist.is_empty() {
        report.error(format!("{name}: topic_distribution cannot be empty"));
        return;
    }

    let k = u64::from(rules.group_size);
    let mut expanded_sum = Some(0u64);
    let mut grouped_parts = Vec::new();

    for (topic, count) in dist {
        if topic.trim().is_empty() {
            report.error(format!("{name}: invalid topic name in topic_distribution"));
        }
        let n = match read_count(count) {
            Count::Valid(n) if n > 0 => n,
            Count::TooLarge => {
                report.error(format!(
                    "{name}: topic_distribution['{topic}'] is too large (at most {})",
                    u32::MAX
                ));
                expanded_sum = None;
                continue;
            }
            _ => {
                report.error(format!(
                    "{name}: topic_distribution['{topic}'] must be a positive integer"
                ));
                continue;
            }
        };
        let questions = if rules.is_grouped(topic, explicit_grouped) {
            let questions = n.checked_mul(k);
            if let Some(q) = questions {
                grouped_parts.push(format!("{topic}: {n} groups x {k} = {q}"));
            }
            questions
        } else {
            Some(n)
        };
        expanded_sum = expanded_sum
            .zip(questions)
            .and_then(|(sum, q)| sum.checked_add(q));
    }

    for marked in explicit_grouped {
        if !dist.contains_key(marked) {
            report.warn(format!(
                "{name}: grouped topic '{marked}' does not appear in topic_distribution"
            ));
        }
    }

    let Some(expanded_sum) = expanded_sum else {
        return;
    };
    if expanded_sum != total {
        if grouped_parts.is_empty() {
            report.error(format!(
                "{name}: topic_distribution sum ({expanded_sum}) doesn't match total_questions ({total})"
            ));
        } else {
            report.error(format!(
                "{name}: topic_distribution sum ({expanded_sum}, with {}) doesn't match total_questions ({total})",
                grouped_parts.join(", ")
            ));
        }
    }
}

/// A count field as read from raw JSON. Counts are stored as `u32` once the
/// blueprint is typed, so larger values are rejected here.
enum Count {
    Valid(u64),
    TooLarge,
    Invalid,
}

fn read_count(v: &Value) -> Count {
    match v.as_u64() {
        Some(n) if n <= u64::from(u32::MAX) => Count::Valid(n),
        Some(_) => Count::TooLarge,
        None => Count::Invalid,
    }
}

fn positive_count(v: &Value) -> Option<u64> {
    match read_count(v) {
        Count::Valid(n) if n > 0 => Some(n),
        _ => None,
    }
}

/// `total_questions` of a section or subsection, reporting why it is unusable.
fn block_total(v: &Value, name: &str, report: &mut ValidationReport) -> Option<u64> {
    match read_count(v) {
        Count::Valid(n) if n > 0 => Some(n),
        Count::TooLarge => {
            report.error(format!("{name}: total_questions must be at most {}", u32::MAX));
            None
        }
        _ => {
            report.error(format!("{name}: total_questions must be a positive integer"));
            None
        }
    }
}
