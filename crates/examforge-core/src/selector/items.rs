//! Selection of individual (ungrouped) items.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{rank_with_random_ties, source_allowed, SelectionContext};
use crate::corpus::CorpusIndex;
use crate::model::{Difficulty, DifficultyCounts, Item};
use crate::plan::{apportion_topics, Cell};

/// What an item selection asked for and what it got.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSelectionReport {
    /// topic -> questions requested.
    pub requested: BTreeMap<String, u32>,
    /// topic -> questions selected.
    pub selected: BTreeMap<String, u32>,
    /// topic -> questions missing. Only topics that came up short.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shortfall: BTreeMap<String, u32>,
    /// Items taken from a difficulty other than the requested one.
    pub backfilled: u32,
    /// Items that were already used by an earlier instance.
    pub reused: u32,
    /// Reused items beyond the overlap budget.
    pub over_budget: u32,
}

impl ItemSelectionReport {
    pub fn total_requested(&self) -> u32 {
        self.requested.values().sum()
    }

    pub fn total_selected(&self) -> u32 {
        self.selected.values().sum()
    }

    pub fn total_shortfall(&self) -> u32 {
        self.shortfall.values().sum()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ItemSelectionReport) {
        for (topic, n) in other.requested {
            *self.requested.entry(topic).or_default() += n;
        }
        for (topic, n) in other.selected {
            *self.selected.entry(topic).or_default() += n;
        }
        for (topic, n) in other.shortfall {
            *self.shortfall.entry(topic).or_default() += n;
        }
        self.backfilled += other.backfilled;
        self.reused += other.reused;
        self.over_budget += other.over_budget;
    }
}

/// Draws ungrouped items for a section from the files it may use.
#[derive(Debug, Clone, Copy)]
pub struct ItemSelector<'c> {
    corpus: &'c CorpusIndex,
    sources: &'c [String],
}

impl<'c> ItemSelector<'c> {
    /// Selector restricted to `sources` (all files when empty).
    pub fn new(corpus: &'c CorpusIndex, sources: &'c [String]) -> Self {
        Self { corpus, sources }
    }

    /// Select items for per-topic counts, apportioning the difficulty
    /// requirements across topics first.
    pub fn select<R: Rng + ?Sized>(
        &self,
        topic_requirements: &BTreeMap<String, u32>,
        difficulty_requirements: &DifficultyCounts,
        ctx: &mut SelectionContext<'_>,
        rng: &mut R,
    ) -> (Vec<Item>, ItemSelectionReport) {
        let cells = apportion_topics(topic_requirements, difficulty_requirements);
        self.select_cells(&cells, ctx, rng)
    }

    /// Select items for explicit cells. Never returns more than requested.
    pub fn select_cells<R: Rng + ?Sized>(
        &self,
        cells: &[Cell],
        ctx: &mut SelectionContext<'_>,
        rng: &mut R,
    ) -> (Vec<Item>, ItemSelectionReport) {
        let mut report = ItemSelectionReport::default();
        let mut selected = Vec::new();

        for cell in cells.iter().filter(|c| c.count > 0) {
            let (picked, over_budget) = self.fill_cell(cell, ctx, rng);
            let got = picked.len() as u32;

            *report.requested.entry(cell.topic.clone()).or_default() += cell.count;
            *report.selected.entry(cell.topic.clone()).or_default() += got;
            if got < cell.count {
                let missing = cell.count - got;
                warn!(
                    topic = %cell.topic,
                    difficulty = %cell.difficulty,
                    requested = cell.count,
                    missing,
                    "item supply shortfall"
                );
                *report.shortfall.entry(cell.topic.clone()).or_default() += missing;
            }

            report.backfilled += picked
                .iter()
                .filter(|i| i.difficulty != cell.difficulty)
                .count() as u32;
            report.reused += picked
                .iter()
                .filter(|i| ctx.usage_count(&i.id) > 0)
                .count() as u32;
            report.over_budget += over_budget;

            selected.extend(picked.into_iter().cloned());
        }

        (selected, report)
    }

    /// Fill one cell. Draw order: fresh items of the exact difficulty, then
    /// reused ones within the budget, then the other difficulties in backfill
    /// order, then reused items past the budget. Returns the items and how
    /// many of them went past the budget.
    fn fill_cell<R: Rng + ?Sized>(
        &self,
        cell: &Cell,
        ctx: &mut SelectionContext<'_>,
        rng: &mut R,
    ) -> (Vec<&'c Item>, u32) {
        let want = cell.count as usize;
        let mut reuse_left = ctx.budget().reuse_allowed(cell.count) as usize;
        let mut out = Vec::with_capacity(want);

        self.draw(&cell.topic, cell.difficulty, want, &mut reuse_left, ctx, rng, &mut out);

        let others = Difficulty::BACKFILL_ORDER
            .into_iter()
            .filter(|d| *d != cell.difficulty);
        for other in others.clone() {
            if out.len() == want {
                break;
            }
            let before = out.len();
            self.draw(&cell.topic, other, want, &mut reuse_left, ctx, rng, &mut out);
            if out.len() > before {
                debug!(
                    topic = %cell.topic,
                    from = %other,
                    to = %cell.difficulty,
                    count = out.len() - before,
                    "backfilled items"
                );
            }
        }

        let mut over_budget = 0;
        for difficulty in std::iter::once(cell.difficulty).chain(others) {
            if out.len() == want {
                break;
            }
            let mut unlimited = usize::MAX;
            let before = out.len();
            self.draw(&cell.topic, difficulty, want, &mut unlimited, ctx, rng, &mut out);
            over_budget += (out.len() - before) as u32;
        }
        if over_budget > 0 {
            debug!(topic = %cell.topic, over_budget, "reused items beyond overlap budget");
        }

        (out, over_budget)
    }

    /// Append up to `want - out.len()` items of one difficulty: fresh ones in
    /// random order, then least-used reused ones while `reuse_left` allows.
    #[allow(clippy::too_many_arguments)]
    fn draw<R: Rng + ?Sized>(
        &self,
        topic: &str,
        difficulty: Difficulty,
        want: usize,
        reuse_left: &mut usize,
        ctx: &mut SelectionContext<'_>,
        rng: &mut R,
        out: &mut Vec<&'c Item>,
    ) {
        let (mut fresh, mut reused) = self.candidates(topic, difficulty, ctx);

        fresh.shuffle(rng);
        for item in fresh.into_iter().take(want.saturating_sub(out.len())) {
            ctx.place(&item.id);
            out.push(item);
        }

        let room = want.saturating_sub(out.len()).min(*reuse_left);
        if room == 0 || reused.is_empty() {
            return;
        }
        let ledger = ctx.ledger();
        rank_with_random_ties(&mut reused, rng, |i| ledger.usage_count(&i.id));
        let take = room.min(reused.len());
        for item in reused.into_iter().take(take) {
            ctx.place(&item.id);
            out.push(item);
        }
        *reuse_left -= take;
    }

    /// Eligible candidates split into (never used, used before). Items already
    /// placed in the instance are excluded.
    fn candidates(
        &self,
        topic: &str,
        difficulty: Difficulty,
        ctx: &SelectionContext<'_>,
    ) -> (Vec<&'c Item>, Vec<&'c Item>) {
        self.corpus
            .by_topic_difficulty(topic, difficulty)
            .into_iter()
            .filter(|i| source_allowed(self.sources, &i.source) && !ctx.is_placed(&i.id))
            .partition(|i| ctx.usage_count(&i.id) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UsageLedger;
    use crate::selector::OverlapBudget;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use std::collections::HashSet;

    fn bank(topic: &str, prefix: &str, easy: usize, medium: usize, hard: usize) -> Value {
        let mut questions = Vec::new();
        for (difficulty, n) in [("Easy", easy), ("Medium", medium), ("Hard", hard)] {
            for i in 0..n {
                questions.push(json!({
                    "question_id": format!("{prefix}_{}_{i:02}", &difficulty[..1]),
                    "topic": topic,
                    "difficulty": difficulty,
                }));
            }
        }
        json!({ "questions": questions })
    }

    fn corpus(docs: &[(&str, Value)]) -> CorpusIndex {
        let mut index = CorpusIndex::new(5);
        for (name, doc) in docs {
            index.add_document(name, doc).unwrap();
        }
        index
    }

    fn counts(e: u32, m: u32, h: u32) -> DifficultyCounts {
        [(Difficulty::Easy, e), (Difficulty::Medium, m), (Difficulty::Hard, h)]
            .into_iter()
            .collect()
    }

    fn topics(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(t, n)| (t.to_string(), *n)).collect()
    }

    fn cell(topic: &str, difficulty: Difficulty, count: u32) -> Cell {
        Cell {
            topic: topic.into(),
            difficulty,
            count,
        }
    }

    #[test]
    fn exact_distribution_when_supply_suffices() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 3, 8, 3))]);
        let ledger = UsageLedger::new();
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
        let mut rng = StdRng::seed_from_u64(42);

        let selector = ItemSelector::new(&index, &[]);
        let (items, report) =
            selector.select(&topics(&[("Banking", 10)]), &counts(2, 6, 2), &mut ctx, &mut rng);

        assert_eq!(items.len(), 10);
        let ids: HashSet<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
        assert!(items.iter().all(|i| i.topic == "Banking"));
        for (d, want) in [(Difficulty::Easy, 2), (Difficulty::Medium, 6), (Difficulty::Hard, 2)] {
            assert_eq!(items.iter().filter(|i| i.difficulty == d).count(), want);
        }
        assert_eq!(report.total_shortfall(), 0);
        assert_eq!(report.backfilled, 0);
        assert_eq!(report.reused, 0);
    }

    #[test]
    fn short_cell_backfills_medium_first() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 1, 10, 5))]);
        let ledger = UsageLedger::new();
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
        let mut rng = StdRng::seed_from_u64(1);

        let (items, report) = ItemSelector::new(&index, &[]).select_cells(
            &[cell("Banking", Difficulty::Easy, 3)],
            &mut ctx,
            &mut rng,
        );

        assert_eq!(items.len(), 3);
        assert_eq!(report.backfilled, 2);
        assert_eq!(items.iter().filter(|i| i.difficulty == Difficulty::Medium).count(), 2);
    }

    #[test]
    fn missing_topic_is_a_shortfall_not_an_error() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 2, 2, 2))]);
        let ledger = UsageLedger::new();
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
        let mut rng = StdRng::seed_from_u64(1);

        let (items, report) = ItemSelector::new(&index, &[]).select(
            &topics(&[("Economy", 4)]),
            &counts(1, 2, 1),
            &mut ctx,
            &mut rng,
        );

        assert!(items.is_empty());
        assert_eq!(report.requested["Economy"], 4);
        assert_eq!(report.shortfall["Economy"], 4);
    }

    #[test]
    fn prefers_fresh_items_over_used_ones() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 0, 10, 0))]);
        let mut ledger = UsageLedger::new();
        ledger.commit(1, ["GA_M_00", "GA_M_01", "GA_M_02", "GA_M_03", "GA_M_04"]);
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::new(50).unwrap());
        let mut rng = StdRng::seed_from_u64(3);

        let (items, report) = ItemSelector::new(&index, &[]).select_cells(
            &[cell("Banking", Difficulty::Medium, 5)],
            &mut ctx,
            &mut rng,
        );

        assert_eq!(items.len(), 5);
        assert_eq!(report.reused, 0);
        assert!(items.iter().all(|i| !ledger.is_used(&i.id)));
    }

    #[test]
    fn reuses_least_used_first_and_flags_over_budget() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 0, 3, 0))]);
        let mut ledger = UsageLedger::new();
        ledger.commit(1, ["GA_M_00", "GA_M_01", "GA_M_02"]);
        ledger.commit(2, ["GA_M_00", "GA_M_02"]);
        ledger.commit(3, ["GA_M_00"]);
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::new(50).unwrap());
        let mut rng = StdRng::seed_from_u64(9);

        let (items, report) = ItemSelector::new(&index, &[]).select_cells(
            &[cell("Banking", Difficulty::Medium, 2)],
            &mut ctx,
            &mut rng,
        );

        // One reuse fits the 50% budget; the least used item goes first.
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "GA_M_01");
        assert_eq!(ids[1], "GA_M_02");
        assert_eq!(report.reused, 2);
        assert_eq!(report.over_budget, 1);
        assert_eq!(report.total_shortfall(), 0);
    }

    #[test]
    fn never_exceeds_the_request_or_repeats_within_instance() {
        let index = corpus(&[("ga.json", bank("Banking", "GA", 4, 4, 4))]);
        let ledger = UsageLedger::new();
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
        let mut rng = StdRng::seed_from_u64(5);
        let selector = ItemSelector::new(&index, &[]);

        let (first, _) = selector.select_cells(&[cell("Banking", Difficulty::Easy, 6)], &mut ctx, &mut rng);
        let (second, report) =
            selector.select_cells(&[cell("Banking", Difficulty::Easy, 10)], &mut ctx, &mut rng);

        assert_eq!(first.len(), 6);
        assert_eq!(second.len(), 6);
        assert_eq!(report.shortfall["Banking"], 4);
        let all: HashSet<_> = first.iter().chain(&second).map(|i| i.id.clone()).collect();
        assert_eq!(all.len(), 12);
    }

    #[test]
    fn respects_section_source_files() {
        let index = corpus(&[
            ("a.json", bank("Banking", "A", 0, 3, 0)),
            ("b.json", bank("Banking", "B", 0, 3, 0)),
        ]);
        let ledger = UsageLedger::new();
        let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
        let mut rng = StdRng::seed_from_u64(5);
        let sources = vec!["b.json".to_string()];

        let (items, report) = ItemSelector::new(&index, &sources).select_cells(
            &[cell("Banking", Difficulty::Medium, 5)],
            &mut ctx,
            &mut rng,
        );

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.source == "b.json"));
        assert_eq!(report.shortfall["Banking"], 2);
    }

    #[test]
    fn merge_accumulates_reports() {
        let mut a = ItemSelectionReport::default();
        a.requested.insert("X".into(), 2);
        a.selected.insert("X".into(), 2);
        let mut b = ItemSelectionReport::default();
        b.requested.insert("X".into(), 3);
        b.selected.insert("X".into(), 1);
        b.shortfall.insert("X".into(), 2);
        b.backfilled = 1;
        a.merge(b);
        assert_eq!(a.total_requested(), 5);
        assert_eq!(a.total_selected(), 3);
        assert_eq!(a.total_shortfall(), 2);
        assert_eq!(a.backfilled, 1);
    }
}
