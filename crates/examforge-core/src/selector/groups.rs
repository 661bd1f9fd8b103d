//! Selection of atomic groups by footprint.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{rank_with_random_ties, source_allowed, SelectionContext};
use crate::corpus::CorpusIndex;
use crate::model::{Footprint, Group};

/// What a group selection asked for and what it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSelectionReport {
    pub topic: String,
    pub target: Footprint,
    pub requested: u32,
    pub selected: u32,
    /// Ids of the selected groups, in selection order.
    pub group_ids: Vec<String>,
    /// Selected groups that were already used by an earlier instance.
    pub reused: u32,
    /// Footprint distance of each selected group from the target.
    pub distances: Vec<u32>,
    pub shortfall: u32,
}

/// Draws whole groups for a section from the files it may use.
#[derive(Debug, Clone, Copy)]
pub struct GroupSelector<'c> {
    corpus: &'c CorpusIndex,
    sources: &'c [String],
}

impl<'c> GroupSelector<'c> {
    /// Selector restricted to `sources` (all files when empty).
    pub fn new(corpus: &'c CorpusIndex, sources: &'c [String]) -> Self {
        Self { corpus, sources }
    }

    /// Select `num_groups` groups closest to `target`.
    ///
    /// Groups never used before are always preferred, nearest footprint
    /// first. Used groups fill any remainder, least used first with
    /// footprint distance as the tiebreak. A group that is already placed,
    /// or shares a member with something placed, is never returned. Fewer
    /// groups than requested is reported as a shortfall.
    pub fn select<R: Rng + ?Sized>(
        &self,
        num_groups: u32,
        target: &Footprint,
        topic: &str,
        ctx: &mut SelectionContext<'_>,
        rng: &mut R,
    ) -> (Vec<Group>, GroupSelectionReport) {
        let want = num_groups as usize;
        let same_topic = self.has_topic(topic);
        let ledger = ctx.ledger();

        // Buckets come nearest first; stop once enough fresh groups are found.
        let mut fresh: Vec<&'c Group> = Vec::new();
        let mut used: Vec<(&'c Group, u32)> = Vec::new();
        for (distance, bucket) in self.corpus.groups_by_distance(target) {
            if fresh.len() >= want {
                break;
            }
            let mut bucket_fresh = Vec::new();
            for group in bucket {
                if !self.eligible(group, topic, same_topic, ctx) {
                    continue;
                }
                if ctx.usage_count(&group.group_id) == 0 {
                    bucket_fresh.push(group);
                } else {
                    used.push((group, distance));
                }
            }
            bucket_fresh.shuffle(rng);
            fresh.extend(bucket_fresh);
        }
        rank_with_random_ties(&mut used, rng, |&(g, distance)| {
            (ledger.usage_count(&g.group_id), distance)
        });

        let chosen: Vec<&Group> = fresh
            .into_iter()
            .chain(used.into_iter().map(|(g, _)| g))
            .take(want)
            .collect();

        let mut report = GroupSelectionReport {
            topic: topic.to_string(),
            target: *target,
            requested: num_groups,
            selected: chosen.len() as u32,
            group_ids: Vec::with_capacity(chosen.len()),
            reused: 0,
            distances: Vec::with_capacity(chosen.len()),
            shortfall: num_groups.saturating_sub(chosen.len() as u32),
        };

        for group in &chosen {
            ctx.place(&group.group_id);
            for member in &group.members {
                ctx.place(&member.id);
            }
            if ledger.is_used(&group.group_id) {
                report.reused += 1;
            }
            report.group_ids.push(group.group_id.clone());
            report.distances.push(group.footprint.distance(target));
        }

        debug!(
            topic,
            footprint = %target,
            selected = ?report.group_ids,
            reused = report.reused,
            "selected groups"
        );
        if report.shortfall > 0 {
            warn!(
                topic,
                requested = num_groups,
                selected = report.selected,
                "group supply shortfall"
            );
        }

        (chosen.into_iter().cloned().collect(), report)
    }

    /// Whether any allowed group carries `topic`. When none does, groups of
    /// every topic are eligible.
    fn has_topic(&self, topic: &str) -> bool {
        self.corpus
            .groups()
            .iter()
            .any(|g| g.topic == topic && source_allowed(self.sources, &g.source))
    }

    /// From an allowed source, of the requested topic when `same_topic`, and
    /// not clashing with anything already placed.
    fn eligible(
        &self,
        group: &Group,
        topic: &str,
        same_topic: bool,
        ctx: &SelectionContext<'_>,
    ) -> bool {
        source_allowed(self.sources, &group.source)
            && (!same_topic || group.topic == topic)
            && !ctx.is_placed(&group.group_id)
            && !group.members.iter().any(|m| ctx.is_placed(&m.id))
    }
}
