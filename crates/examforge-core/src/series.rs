//! Series orchestration: generating N instances from one blueprint under an
//! overlap budget.
//!
//! The orchestrator owns the [`UsageLedger`]. Each instance is drawn against
//! a read-only view of it, assembled, measured against the union of earlier
//! instances, and only then committed. Instances are generated strictly in
//! order; instance `k + 1` depends on the ledger after instance `k`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::assembler::{
    instance_file_name, InstanceAssembler, SectionDraw, SectionSelectionReport, TestInstance,
};
use crate::blueprint::{Blueprint, GroupingRules};
use crate::corpus::CorpusIndex;
use crate::error::IntegrityError;
use crate::ledger::UsageLedger;
use crate::model::Difficulty;
use crate::plan::{plan_blueprint, SectionPlan};
use crate::selector::{
    source_allowed, GroupSelector, ItemSelectionReport, ItemSelector, OverlapBudget,
    SelectionContext,
};
use crate::statistics::{measure_overlap, round2, OverlapReport};

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Knobs for one series run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Number of instances to generate.
    pub count: u32,
    pub budget: OverlapBudget,
    /// Percentage points the realized overlap may exceed the budget by.
    pub tolerance: f64,
    /// Instances numbered at or below this are accepted even when over budget.
    pub grace_instances: u32,
    pub shuffle: bool,
    /// Attempts per instance number before an integrity failure halts.
    pub max_attempts: u32,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            count: 1,
            budget: OverlapBudget::default(),
            tolerance: 30.0,
            grace_instances: 0,
            shuffle: true,
            max_attempts: 2,
        }
    }
}

impl SeriesConfig {
    /// Realized overlap above this halts the series.
    pub fn overlap_limit(&self) -> f64 {
        f64::from(self.budget.percent()) + self.tolerance
    }
}

/// Where a series run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "instance")]
pub enum SeriesState {
    Initialized,
    /// Working on the given instance number.
    Generating(u32),
    Completed,
    HaltedEarly,
}

/// Why a series stopped before producing every requested instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// Realized overlap went past budget + tolerance.
    OverlapExceeded {
        instance_number: u32,
        realized: f64,
        limit: f64,
    },
    /// Every attempt at an instance failed integrity checks.
    Integrity {
        instance_number: u32,
        attempts: u32,
        violations: Vec<String>,
    },
    /// The accepted instance could not be written.
    Output {
        instance_number: u32,
        message: String,
    },
}

impl HaltReason {
    pub fn instance_number(&self) -> u32 {
        match self {
            HaltReason::OverlapExceeded { instance_number, .. }
            | HaltReason::Integrity { instance_number, .. }
            | HaltReason::Output { instance_number, .. } => *instance_number,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::OverlapExceeded {
                instance_number,
                realized,
                limit,
            } => write!(
                f,
                "instance {instance_number} overlap {realized:.1}% exceeds limit {limit:.1}%"
            ),
            HaltReason::Integrity {
                instance_number,
                attempts,
                violations,
            } => write!(
                f,
                "instance {instance_number} failed integrity checks after {attempts} attempt(s): {}",
                violations.join("; ")
            ),
            HaltReason::Output {
                instance_number,
                message,
            } => write!(f, "instance {instance_number} could not be written: {message}"),
        }
    }
}

/// Per-instance line of the series summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_number: u32,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub total_questions: usize,
    pub realized_overlap: f64,
    pub unique_questions: usize,
    pub repeated_questions: usize,
    /// Questions missing against the blueprint across all sections.
    pub shortfall: u32,
    /// Reused items beyond the overlap budget.
    pub over_budget: u32,
}

// ---------------------------------------------------------------------------
// Observers and sinks
// ---------------------------------------------------------------------------

/// Progress reporting for a series run.
pub trait SeriesObserver {
    fn on_instance_start(&self, instance_number: u32, total: u32);
    fn on_instance_accepted(&self, record: &InstanceRecord);
    fn on_instance_retry(&self, instance_number: u32, error: &IntegrityError);
    fn on_series_complete(&self, generated: usize, requested: u32, halt: Option<&HaltReason>);
}

/// No-op observer.
pub struct NoopObserver;

impl SeriesObserver for NoopObserver {
    fn on_instance_start(&self, _: u32, _: u32) {}
    fn on_instance_accepted(&self, _: &InstanceRecord) {}
    fn on_instance_retry(&self, _: u32, _: &IntegrityError) {}
    fn on_series_complete(&self, _: usize, _: u32, _: Option<&HaltReason>) {}
}

/// Destination for accepted instances.
pub trait InstanceSink {
    /// Persist an accepted instance; returns where it went, if anywhere.
    fn write(&mut self, instance: &TestInstance) -> Result<Option<String>>;
}

/// Keeps instances in memory only.
pub struct MemorySink;

impl InstanceSink for MemorySink {
    fn write(&mut self, _: &TestInstance) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Writes each instance as pretty JSON into a directory.
pub struct DirectorySink {
    dir: PathBuf,
    test_id: String,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, test_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            test_id: test_id.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl InstanceSink for DirectorySink {
    fn write(&mut self, instance: &TestInstance) -> Result<Option<String>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let name = instance_file_name(&self.test_id, instance.instance_number);
        let path = self.dir.join(&name);
        let json = serde_json::to_string_pretty(instance).context("failed to serialize instance")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write instance to {}", path.display()))?;
        Ok(Some(name))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Result of a series run.
#[derive(Debug, Clone)]
pub struct SeriesOutcome {
    pub requested: u32,
    pub instances: Vec<TestInstance>,
    pub records: Vec<InstanceRecord>,
    pub halt_reason: Option<HaltReason>,
}

impl SeriesOutcome {
    pub fn halted(&self) -> bool {
        self.halt_reason.is_some()
    }
}

/// Generates a series of instances from one blueprint and corpus.
pub struct SeriesOrchestrator<'c> {
    corpus: &'c CorpusIndex,
    blueprint: &'c Blueprint,
    config: SeriesConfig,
    plans: Vec<SectionPlan>,
    ledger: UsageLedger,
    prior_ids: HashSet<String>,
    state: SeriesState,
}

impl<'c> SeriesOrchestrator<'c> {
    pub fn new(
        corpus: &'c CorpusIndex,
        blueprint: &'c Blueprint,
        rules: &GroupingRules,
        config: SeriesConfig,
    ) -> Self {
        Self {
            corpus,
            blueprint,
            plans: plan_blueprint(blueprint, rules),
            config,
            ledger: UsageLedger::new(),
            prior_ids: HashSet::new(),
            state: SeriesState::Initialized,
        }
    }

    pub fn state(&self) -> SeriesState {
        self.state
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Ids of every question in every accepted instance.
    pub fn used_question_ids(&self) -> &HashSet<String> {
        &self.prior_ids
    }

    /// Forget all usage and return to [`SeriesState::Initialized`].
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.prior_ids.clear();
        self.state = SeriesState::Initialized;
    }

    /// Generate the configured number of instances, stopping early on an
    /// overlap breach, repeated integrity failure, or output error.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        sink: &mut dyn InstanceSink,
        observer: &dyn SeriesObserver,
    ) -> SeriesOutcome {
        let requested = self.config.count;
        let mut outcome = SeriesOutcome {
            requested,
            instances: Vec::new(),
            records: Vec::new(),
            halt_reason: None,
        };

        info!(
            test_id = %self.blueprint.test_id,
            requested,
            overlap = %self.config.budget,
            "generating series"
        );

        let first = self.prior_instance_count() + 1;
        for number in first..first + requested {
            self.state = SeriesState::Generating(number);
            observer.on_instance_start(number, first + requested - 1);

            match self.step(number, rng, sink, observer) {
                Ok((instance, record)) => {
                    observer.on_instance_accepted(&record);
                    outcome.instances.push(instance);
                    outcome.records.push(record);
                }
                Err(reason) => {
                    warn!(%reason, generated = outcome.records.len(), "series halted early");
                    outcome.halt_reason = Some(reason);
                    break;
                }
            }
        }

        self.state = if outcome.halted() {
            SeriesState::HaltedEarly
        } else {
            SeriesState::Completed
        };
        observer.on_series_complete(
            outcome.records.len(),
            requested,
            outcome.halt_reason.as_ref(),
        );
        info!(generated = outcome.records.len(), requested, "series finished");
        outcome
    }

    /// Generate, check, write and commit one instance.
    fn step<R: Rng + ?Sized>(
        &mut self,
        number: u32,
        rng: &mut R,
        sink: &mut dyn InstanceSink,
        observer: &dyn SeriesObserver,
    ) -> std::result::Result<(TestInstance, InstanceRecord), HaltReason> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        let instance = loop {
            match self.generate_instance(number, rng) {
                Ok(instance) => break instance,
                Err(err) if attempt < max_attempts => {
                    warn!(instance = number, attempt, error = %err, "integrity check failed, retrying");
                    observer.on_instance_retry(number, &err);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(HaltReason::Integrity {
                        instance_number: number,
                        attempts: attempt,
                        violations: err.violations,
                    });
                }
            }
        };

        let overlap = measure_overlap(number, instance.item_ids(), &self.prior_ids);
        let limit = self.config.overlap_limit();
        if overlap.realized_overlap > limit {
            if number > self.config.grace_instances {
                return Err(HaltReason::OverlapExceeded {
                    instance_number: number,
                    realized: round2(overlap.realized_overlap),
                    limit,
                });
            }
            warn!(
                instance = number,
                realized = overlap.realized_overlap,
                limit,
                "overlap over limit, accepted within grace instances"
            );
        }

        let file = sink.write(&instance).map_err(|e| {
            error!(instance = number, error = %format!("{e:#}"), "failed to write instance");
            HaltReason::Output {
                instance_number: number,
                message: format!("{e:#}"),
            }
        })?;

        self.commit(&instance);
        let record = self.record(&instance, &overlap, file);
        info!(
            instance = %record.instance_id,
            overlap = record.realized_overlap,
            unique = record.unique_questions,
            "instance accepted"
        );
        Ok((instance, record))
    }

    /// Draw and assemble one instance without touching the ledger.
    pub fn generate_instance<R: Rng + ?Sized>(
        &self,
        number: u32,
        rng: &mut R,
    ) -> std::result::Result<TestInstance, IntegrityError> {
        let mut ctx = SelectionContext::new(&self.ledger, self.config.budget);
        let mut draws = Vec::with_capacity(self.plans.len());

        for plan in &self.plans {
            let items = ItemSelector::new(self.corpus, &plan.source_files);
            let groups = GroupSelector::new(self.corpus, &plan.source_files);

            let mut draw = SectionDraw {
                section_id: plan.section_id.clone(),
                items: Vec::new(),
                groups: Vec::new(),
                report: SectionSelectionReport {
                    section_id: plan.section_id.clone(),
                    items: ItemSelectionReport::default(),
                    groups: Vec::new(),
                },
            };

            for block in &plan.blocks {
                for request in &block.group_requests {
                    let (selected, report) =
                        groups.select(request.count, &request.target, &request.topic, &mut ctx, rng);
                    draw.groups.extend(selected);
                    draw.report.groups.push(report);
                }
                let (selected, report) = items.select_cells(&block.cells, &mut ctx, rng);
                draw.items.extend(selected);
                draw.report.items.merge(report);
            }
            draws.push(draw);
        }

        InstanceAssembler::new(self.config.shuffle, self.config.budget.percent()).assemble(
            self.blueprint,
            number,
            draws,
            rng,
        )
    }

    /// Record an accepted instance: every group id and every question id
    /// gets the instance number appended once.
    pub fn commit(&mut self, instance: &TestInstance) {
        let number = instance.instance_number;
        self.ledger
            .commit(number, instance.group_ids().chain(instance.item_ids()));
        self.prior_ids
            .extend(instance.item_ids().map(str::to_string));
    }

    fn record(&self, instance: &TestInstance, overlap: &OverlapReport, file: Option<String>) -> InstanceRecord {
        let k = self.corpus.group_size();
        let reports = &instance.metadata.section_reports;
        InstanceRecord {
            instance_number: instance.instance_number,
            instance_id: instance.instance_id.clone(),
            file,
            total_questions: instance.question_count(),
            realized_overlap: round2(overlap.realized_overlap),
            unique_questions: overlap.unique_count,
            repeated_questions: overlap.repeated_count,
            shortfall: reports.iter().map(|r| r.shortfall(k)).sum(),
            over_budget: reports.iter().map(|r| r.items.over_budget).sum(),
        }
    }

    fn prior_instance_count(&self) -> u32 {
        self.ledger
            .iter()
            .flat_map(|(_, uses)| uses.iter().copied())
            .max()
            .unwrap_or(0)
    }

    /// Advisory ceiling on how many instances the corpus supports. Does not
    /// touch the ledger.
    pub fn estimate_max_instances(&self) -> CapacityEstimate {
        estimate_max_instances(self.corpus, &self.plans, self.config.budget)
    }
}

// ---------------------------------------------------------------------------
// Capacity estimate
// ---------------------------------------------------------------------------

/// Capacity of one requirement cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRow {
    /// `"topic / difficulty"` for items, `"topic (groups)"` for groups.
    pub cell: String,
    pub available: usize,
    pub required_per_instance: u32,
    /// Fresh units each instance must consume under the budget.
    pub fresh_per_instance: u32,
    /// `None` when the budget lets every unit be reused.
    pub ceiling: Option<u32>,
}

/// Corpus-imposed limit on series length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    pub overlap_percentage: u8,
    pub rows: Vec<CapacityRow>,
    /// Minimum ceiling across cells; `None` when unbounded.
    pub max_instances: Option<u32>,
    /// Cell with the lowest ceiling.
    pub bottleneck: Option<String>,
}

/// Divide each cell's supply by its per-instance requirement. The first
/// instance needs the whole requirement; each later one needs the fresh
/// share. Advisory only: it ignores backfill and cross-cell interactions.
pub fn estimate_max_instances(
    corpus: &CorpusIndex,
    plans: &[SectionPlan],
    budget: OverlapBudget,
) -> CapacityEstimate {
    // (topic, difficulty) -> (required, allowed sources)
    let mut item_cells: BTreeMap<(String, Difficulty), (u32, Vec<String>)> = BTreeMap::new();
    let mut group_cells: BTreeMap<String, (u32, Vec<String>)> = BTreeMap::new();

    for plan in plans {
        for cell in plan.cells() {
            let entry = item_cells
                .entry((cell.topic.clone(), cell.difficulty))
                .or_default();
            entry.0 += cell.count;
            merge_sources(&mut entry.1, &plan.source_files);
        }
        for request in plan.group_requests() {
            let entry = group_cells.entry(request.topic.clone()).or_default();
            entry.0 += request.count;
            merge_sources(&mut entry.1, &plan.source_files);
        }
    }

    let mut rows = Vec::new();
    for ((topic, difficulty), (required, sources)) in &item_cells {
        let available = corpus
            .by_topic_difficulty(topic, *difficulty)
            .into_iter()
            .filter(|i| source_allowed(sources, &i.source))
            .count();
        rows.push(capacity_row(format!("{topic} / {difficulty}"), available, *required, budget));
    }
    for (topic, (required, sources)) in &group_cells {
        let allowed: Vec<_> = corpus
            .groups()
            .iter()
            .filter(|g| source_allowed(sources, &g.source))
            .collect();
        let same_topic = allowed.iter().filter(|g| &g.topic == topic).count();
        let available = if same_topic > 0 { same_topic } else { allowed.len() };
        rows.push(capacity_row(format!("{topic} (groups)"), available, *required, budget));
    }

    let bottleneck_row = rows
        .iter()
        .filter_map(|r| r.ceiling.map(|c| (c, r)))
        .min_by_key(|(c, _)| *c);

    CapacityEstimate {
        overlap_percentage: budget.percent(),
        max_instances: bottleneck_row.map(|(c, _)| c),
        bottleneck: bottleneck_row.map(|(_, r)| r.cell.clone()),
        rows,
    }
}

fn capacity_row(cell: String, available: usize, required: u32, budget: OverlapBudget) -> CapacityRow {
    let fresh = budget.unique_required(required);
    let ceiling = if (available as u64) < u64::from(required) {
        Some(0)
    } else if fresh == 0 {
        None
    } else {
        let spare = available as u64 - u64::from(required);
        Some((1 + spare / u64::from(fresh)).min(u64::from(u32::MAX)) as u32)
    };
    CapacityRow {
        cell,
        available,
        required_per_instance: required,
        fresh_per_instance: fresh,
        ceiling,
    }
}

fn merge_sources(into: &mut Vec<String>, sources: &[String]) {
    for s in sources {
        if !into.contains(s) {
            into.push(s.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use std::cell::RefCell;

    fn bank(topic: &str, prefix: &str, easy: usize, medium: usize, hard: usize) -> Value {
        let mut questions = Vec::new();
        for (difficulty, n) in [("Easy", easy), ("Medium", medium), ("Hard", hard)] {
            for i in 0..n {
                questions.push(json!({
                    "question_id": format!("{prefix}_{}_{i:03}", &difficulty[..1]),
                    "topic": topic,
                    "difficulty": difficulty,
                }));
            }
        }
        json!({ "questions": questions })
    }

    fn blueprint(total: u32, dist: Value, topics: Value) -> Blueprint {
        let value = json!({
            "test_id": "MOCK",
            "test_name": "Mock",
            "total_questions": total,
            "sections": [{
                "section_id": "GA",
                "section_name": "General Awareness",
                "total_questions": total,
                "source_files": ["ga.json"],
                "difficulty_distribution": dist,
                "topic_distribution": topics
            }]
        });
        Blueprint::from_value(value, &GroupingRules::default()).unwrap().0
    }

    fn corpus(doc: Value) -> CorpusIndex {
        let mut index = CorpusIndex::new(5);
        index.add_document("ga.json", &doc).unwrap();
        index
    }

    fn config(count: u32, overlap: u8) -> SeriesConfig {
        SeriesConfig {
            count,
            budget: OverlapBudget::new(overlap).unwrap(),
            ..SeriesConfig::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl SeriesObserver for Recorder {
        fn on_instance_start(&self, n: u32, total: u32) {
            self.events.borrow_mut().push(format!("start {n}/{total}"));
        }
        fn on_instance_accepted(&self, record: &InstanceRecord) {
            self.events.borrow_mut().push(format!("accept {}", record.instance_id));
        }
        fn on_instance_retry(&self, n: u32, _: &IntegrityError) {
            self.events.borrow_mut().push(format!("retry {n}"));
        }
        fn on_series_complete(&self, generated: usize, requested: u32, halt: Option<&HaltReason>) {
            self.events
                .borrow_mut()
                .push(format!("done {generated}/{requested} halted={}", halt.is_some()));
        }
    }

    #[test]
    fn generates_disjoint_instances_when_supply_allows() {
        let index = corpus(bank("Banking", "GA", 6, 18, 6));
        let bp = blueprint(10, json!({"Easy": 2, "Medium": 6, "Hard": 2}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(3, 0));
        let mut rng = StdRng::seed_from_u64(21);

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);

        assert!(!outcome.halted());
        assert_eq!(orchestrator.state(), SeriesState::Completed);
        assert_eq!(outcome.instances.len(), 3);
        let mut all = HashSet::new();
        for instance in &outcome.instances {
            assert_eq!(instance.question_count(), 10);
            for id in instance.item_ids() {
                assert!(all.insert(id.to_string()), "{id} repeated across instances");
            }
        }
        assert!(outcome.records.iter().all(|r| r.realized_overlap == 0.0));
    }

    #[test]
    fn ledger_records_each_instance_once() {
        let index = corpus(bank("Banking", "GA", 4, 12, 4));
        let bp = blueprint(10, json!({"Easy": 2, "Medium": 6, "Hard": 2}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(2, 0));
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);
        for instance in &outcome.instances {
            for id in instance.item_ids() {
                let uses = orchestrator.ledger().instances_of(id);
                assert_eq!(
                    uses.iter().filter(|&&n| n == instance.instance_number).count(),
                    1
                );
            }
        }
    }

    #[test]
    fn halts_when_overlap_exceeds_budget_plus_tolerance() {
        // 12 items for 10 per instance: the second instance must reuse 8.
        let index = corpus(bank("Banking", "GA", 0, 12, 0));
        let bp = blueprint(10, json!({"Medium": 10}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(3, 10));
        let mut rng = StdRng::seed_from_u64(8);
        let observer = Recorder::default();

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &observer);

        assert_eq!(outcome.instances.len(), 1);
        assert_eq!(orchestrator.state(), SeriesState::HaltedEarly);
        match outcome.halt_reason.unwrap() {
            HaltReason::OverlapExceeded { instance_number, realized, limit } => {
                assert_eq!(instance_number, 2);
                assert_eq!(realized, 80.0);
                assert_eq!(limit, 40.0);
            }
            other => panic!("unexpected halt: {other}"),
        }
        // The rejected instance is not committed.
        assert!(orchestrator.ledger().iter().all(|(_, uses)| uses == [1]));
        let events = observer.events.borrow();
        assert_eq!(events.last().unwrap(), "done 1/3 halted=true");
    }

    #[test]
    fn grace_instances_accept_high_overlap() {
        let index = corpus(bank("Banking", "GA", 0, 12, 0));
        let bp = blueprint(10, json!({"Medium": 10}), json!({"Banking": 10}));
        let cfg = SeriesConfig {
            grace_instances: 2,
            ..config(3, 10)
        };
        let mut orchestrator = SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), cfg);
        let mut rng = StdRng::seed_from_u64(8);

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);
        assert_eq!(outcome.instances.len(), 2);
        assert_eq!(outcome.halt_reason.unwrap().instance_number(), 3);
    }

    #[test]
    fn shortfall_halts_after_retry() {
        let index = corpus(bank("Banking", "GA", 0, 4, 0));
        let bp = blueprint(10, json!({"Medium": 10}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(2, 20));
        let mut rng = StdRng::seed_from_u64(8);
        let observer = Recorder::default();

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &observer);

        assert!(outcome.instances.is_empty());
        match outcome.halt_reason.unwrap() {
            HaltReason::Integrity { instance_number, attempts, violations } => {
                assert_eq!(instance_number, 1);
                assert_eq!(attempts, 2);
                assert!(violations[0].contains("has 4 questions, expected 10"));
            }
            other => panic!("unexpected halt: {other}"),
        }
        assert!(observer.events.borrow().contains(&"retry 1".to_string()));
        assert!(orchestrator.ledger().is_empty());
    }

    #[test]
    fn directory_sink_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = corpus(bank("Banking", "GA", 4, 12, 4));
        let bp = blueprint(10, json!({"Easy": 2, "Medium": 6, "Hard": 2}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(2, 20));
        let mut rng = StdRng::seed_from_u64(5);
        let mut sink = DirectorySink::new(dir.path(), &bp.test_id);

        let outcome = orchestrator.run(&mut rng, &mut sink, &NoopObserver);

        assert_eq!(outcome.records[1].file.as_deref(), Some("mock_02.json"));
        let written = std::fs::read_to_string(dir.path().join("mock_01.json")).unwrap();
        let instance: TestInstance = serde_json::from_str(&written).unwrap();
        assert_eq!(instance.instance_id, "MOCK_01");
    }

    #[test]
    fn reset_clears_usage_and_state() {
        let index = corpus(bank("Banking", "GA", 4, 12, 4));
        let bp = blueprint(10, json!({"Easy": 2, "Medium": 6, "Hard": 2}), json!({"Banking": 10}));
        let mut orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(1, 20));
        let mut rng = StdRng::seed_from_u64(5);

        orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);
        assert!(!orchestrator.ledger().is_empty());
        orchestrator.reset();
        assert!(orchestrator.ledger().is_empty());
        assert!(orchestrator.used_question_ids().is_empty());
        assert_eq!(orchestrator.state(), SeriesState::Initialized);

        let outcome = orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver);
        assert_eq!(outcome.instances[0].instance_id, "MOCK_01");
    }

    #[test]
    fn estimate_for_scarce_hard_cell() {
        let index = corpus(bank("Banking", "GA", 20, 40, 10));
        let bp = blueprint(20, json!({"Easy": 4, "Medium": 12, "Hard": 4}), json!({"Banking": 20}));
        let orchestrator =
            SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(5, 0));

        let estimate = orchestrator.estimate_max_instances();
        let hard = estimate
            .rows
            .iter()
            .find(|r| r.cell == "Banking / Hard")
            .unwrap();
        assert_eq!(hard.available, 10);
        assert_eq!(hard.required_per_instance, 4);
        assert_eq!(hard.ceiling, Some(2));
        assert_eq!(estimate.max_instances, Some(2));
        assert_eq!(estimate.bottleneck.as_deref(), Some("Banking / Hard"));
        assert!(orchestrator.ledger().is_empty());
    }

    #[test]
    fn estimate_grows_with_overlap_and_is_unbounded_at_full_reuse() {
        let index = corpus(bank("Banking", "GA", 0, 10, 0));
        let bp = blueprint(5, json!({"Medium": 5}), json!({"Banking": 5}));

        let half = SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(1, 40))
            .estimate_max_instances();
        // fresh = ceil(5 * 0.6) = 3; 1 + (10 - 5) / 3 = 2
        assert_eq!(half.max_instances, Some(2));

        let all = SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(1, 100))
            .estimate_max_instances();
        assert_eq!(all.max_instances, None);
        assert!(all.bottleneck.is_none());
    }

    #[test]
    fn estimate_reports_zero_when_first_instance_cannot_be_filled() {
        let index = corpus(bank("Banking", "GA", 0, 3, 0));
        let bp = blueprint(5, json!({"Medium": 5}), json!({"Banking": 5}));
        let estimate = SeriesOrchestrator::new(&index, &bp, &GroupingRules::default(), config(1, 20))
            .estimate_max_instances();
        assert_eq!(estimate.max_instances, Some(0));
    }
}
