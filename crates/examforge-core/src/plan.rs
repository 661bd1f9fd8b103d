//! Turning blueprint sections into concrete selection requests.
//!
//! Each block (a section, or one of its subsections) is split into ungrouped
//! `(topic, difficulty, count)` cells and grouped-topic requests carrying a
//! per-group target footprint. Difficulty counts are apportioned by share,
//! rounding each level and settling the remainder on Medium first, so every
//! split adds up exactly.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::blueprint::{Block, Blueprint, GroupingRules, SectionSpec};
use crate::model::{total, Difficulty, DifficultyCounts, Footprint};

/// One ungrouped selection cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub topic: String,
    pub difficulty: Difficulty,
    pub count: u32,
}

/// A request for whole groups of one grouped topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRequest {
    pub topic: String,
    pub count: u32,
    pub target: Footprint,
}

/// Selection requests for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockPlan {
    pub name: String,
    pub total_questions: u32,
    pub cells: Vec<Cell>,
    pub group_requests: Vec<GroupRequest>,
}

/// Selection requests for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionPlan {
    pub section_id: String,
    pub section_name: String,
    pub total_questions: u32,
    pub source_files: Vec<String>,
    pub blocks: Vec<BlockPlan>,
}

impl SectionPlan {
    /// Plan a section against the grouping rules.
    pub fn new(section: &SectionSpec, rules: &GroupingRules) -> Self {
        Self {
            section_id: section.section_id.clone(),
            section_name: section.section_name.clone(),
            total_questions: section.total_questions,
            source_files: section.source_files.clone(),
            blocks: section
                .blocks()
                .into_iter()
                .map(|b| plan_block(b, rules))
                .collect(),
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.blocks.iter().flat_map(|b| b.cells.iter())
    }

    pub fn group_requests(&self) -> impl Iterator<Item = &GroupRequest> {
        self.blocks.iter().flat_map(|b| b.group_requests.iter())
    }
}

/// Plan every section of a blueprint.
pub fn plan_blueprint(blueprint: &Blueprint, rules: &GroupingRules) -> Vec<SectionPlan> {
    blueprint
        .sections
        .iter()
        .map(|s| SectionPlan::new(s, rules))
        .collect()
}

fn plan_block(block: Block<'_>, rules: &GroupingRules) -> BlockPlan {
    let k = rules.group_size;

    let mut grouped: BTreeMap<String, u32> = BTreeMap::new();
    let mut ungrouped: BTreeMap<String, u32> = BTreeMap::new();
    for (topic, &count) in block.topic_distribution {
        if rules.is_grouped(topic, block.grouped_topics) {
            grouped.insert(topic.clone(), count);
        } else {
            ungrouped.insert(topic.clone(), count);
        }
    }

    let grouped_questions: u32 = grouped.values().map(|n| n * k).sum();
    let grouped_dist = apportion(block.difficulty_distribution, grouped_questions);
    let ungrouped_dist = subtract(block.difficulty_distribution, &grouped_dist);

    let mut group_requests = Vec::new();
    let mut remaining = grouped_dist;
    for (topic, &count) in &grouped {
        let topic_dist = apportion(&remaining, count * k);
        remaining = subtract(&remaining, &topic_dist);
        group_requests.push(GroupRequest {
            topic: topic.clone(),
            count,
            target: group_target(&topic_dist, count, k),
        });
    }

    BlockPlan {
        name: block.name.to_string(),
        total_questions: block.total_questions,
        cells: apportion_topics(&ungrouped, &ungrouped_dist),
        group_requests,
    }
}

/// Split `dist` into a part of size `part` proportional to each level's
/// share. Each level is rounded and capped at its own count; the remainder
/// is settled on Medium, then Easy, then Hard.
pub fn apportion(dist: &DifficultyCounts, part: u32) -> DifficultyCounts {
    let whole = total(dist);
    if whole == 0 || part == 0 {
        return Difficulty::ALL.iter().map(|&d| (d, 0)).collect();
    }
    if part >= whole {
        return Difficulty::ALL
            .iter()
            .map(|&d| (d, dist.get(&d).copied().unwrap_or(0)))
            .collect();
    }

    let cap = |d: Difficulty| dist.get(&d).copied().unwrap_or(0);
    let mut share: DifficultyCounts = Difficulty::ALL
        .iter()
        .map(|&d| {
            let n = u64::from(cap(d)) * u64::from(part);
            let rounded = (2 * n + u64::from(whole)) / (2 * u64::from(whole));
            (d, (rounded as u32).min(cap(d)))
        })
        .collect();

    let mut sum = total(&share);
    for d in Difficulty::BACKFILL_ORDER {
        let slot = share.entry(d).or_default();
        if sum < part {
            let add = (part - sum).min(cap(d) - *slot);
            *slot += add;
            sum += add;
        } else if sum > part {
            let take = (sum - part).min(*slot);
            *slot -= take;
            sum -= take;
        }
    }
    share
}

/// Split `dist` across topics in proportion to their counts. Column sums
/// of the result equal `dist` when the topic counts add up to its total.
pub fn apportion_topics(topics: &BTreeMap<String, u32>, dist: &DifficultyCounts) -> Vec<Cell> {
    let mut remaining = dist.clone();
    let mut cells = Vec::new();
    for (topic, &count) in topics {
        let share = apportion(&remaining, count);
        remaining = subtract(&remaining, &share);
        for (&difficulty, &n) in &share {
            if n > 0 {
                cells.push(Cell {
                    topic: topic.clone(),
                    difficulty,
                    count: n,
                });
            }
        }
    }
    cells
}

/// Per-group target footprint: each level's count divided by the number of
/// groups, rounded, with Medium absorbing the difference so it sums to `k`.
pub fn group_target(grouped_dist: &DifficultyCounts, num_groups: u32, k: u32) -> Footprint {
    if num_groups == 0 {
        return Footprint::new(0, k, 0);
    }
    let per_group = |d: Difficulty| {
        let n = grouped_dist.get(&d).copied().unwrap_or(0);
        (2 * n + num_groups) / (2 * num_groups)
    };
    let mut easy = per_group(Difficulty::Easy);
    let mut hard = per_group(Difficulty::Hard);
    while easy + hard > k {
        if hard >= easy {
            hard -= 1;
        } else {
            easy -= 1;
        }
    }
    Footprint::new(easy, k - easy - hard, hard)
}

fn subtract(a: &DifficultyCounts, b: &DifficultyCounts) -> DifficultyCounts {
    Difficulty::ALL
        .iter()
        .map(|&d| {
            let x = a.get(&d).copied().unwrap_or(0);
            let y = b.get(&d).copied().unwrap_or(0);
            (d, x.saturating_sub(y))
        })
        .collect()
}
