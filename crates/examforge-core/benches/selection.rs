use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use examforge_core::blueprint::{Blueprint, GroupingRules};
use examforge_core::corpus::CorpusIndex;
use examforge_core::ledger::UsageLedger;
use examforge_core::model::{Difficulty, DifficultyCounts, Footprint};
use examforge_core::selector::{GroupSelector, ItemSelector, OverlapBudget, SelectionContext};
use examforge_core::series::{MemorySink, NoopObserver, SeriesConfig, SeriesOrchestrator};

const TOPICS: [&str; 5] = ["Banking", "Economy", "Polity", "Geography", "History"];

fn item_bank(per_cell: usize) -> Value {
    let mut questions = Vec::new();
    for topic in TOPICS {
        for d in Difficulty::ALL {
            for i in 0..per_cell {
                questions.push(json!({
                    "question_id": format!("{topic}_{d}_{i:04}"),
                    "topic": topic,
                    "difficulty": d.as_str(),
                }));
            }
        }
    }
    json!({ "questions": questions })
}

fn group_bank(sets: usize) -> Value {
    let records: Vec<Value> = (0..sets)
        .map(|s| {
            let questions: Vec<Value> = (0..5)
                .map(|q| {
                    json!({
                        "question_id": format!("DI_{s:04}_{q}"),
                        "difficulty": ["Easy", "Medium", "Medium", "Medium", "Hard"][(s + q) % 5],
                    })
                })
                .collect();
            json!({ "di_set_id": format!("DI_{s:04}"), "topic": "Table", "questions": questions })
        })
        .collect();
    json!({ "questions": records })
}

fn corpus() -> CorpusIndex {
    let mut index = CorpusIndex::new(5);
    index.add_document("ga.json", &item_bank(200)).unwrap();
    index.add_document("di.json", &group_bank(200)).unwrap();
    index
}

fn bench_item_selection(c: &mut Criterion) {
    let index = corpus();
    let mut ledger = UsageLedger::new();
    let used: Vec<String> = index.items().iter().step_by(3).map(|i| i.id.clone()).collect();
    ledger.commit(1, used.iter().map(String::as_str));

    let topics: BTreeMap<String, u32> = TOPICS.iter().map(|t| (t.to_string(), 20)).collect();
    let dist: DifficultyCounts = [
        (Difficulty::Easy, 30),
        (Difficulty::Medium, 50),
        (Difficulty::Hard, 20),
    ]
    .into_iter()
    .collect();
    let sources = vec!["ga.json".to_string()];
    let selector = ItemSelector::new(&index, &sources);

    c.bench_function("select_items_100", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| {
            let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
            selector.select(black_box(&topics), black_box(&dist), &mut ctx, &mut rng)
        })
    });
}

fn bench_group_selection(c: &mut Criterion) {
    let index = corpus();
    let ledger = UsageLedger::new();
    let sources = vec!["di.json".to_string()];
    let selector = GroupSelector::new(&index, &sources);
    let target: Footprint = "1-3-1".parse().unwrap();

    c.bench_function("select_groups_4", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| {
            let mut ctx = SelectionContext::new(&ledger, OverlapBudget::default());
            selector.select(4, black_box(&target), "Data Interpretation", &mut ctx, &mut rng)
        })
    });
}

fn bench_series(c: &mut Criterion) {
    let index = corpus();
    let bp = json!({
        "test_id": "BENCH",
        "test_name": "Bench",
        "total_questions": 120,
        "sections": [
            {
                "section_id": "GA", "section_name": "GA", "total_questions": 100,
                "source_files": ["ga.json"],
                "difficulty_distribution": {"Easy": 30, "Medium": 50, "Hard": 20},
                "topic_distribution": {"Banking": 20, "Economy": 20, "Polity": 20, "Geography": 20, "History": 20}
            },
            {
                "section_id": "DI", "section_name": "DI", "total_questions": 20,
                "source_files": ["di.json"],
                "difficulty_distribution": {"Easy": 4, "Medium": 12, "Hard": 4},
                "topic_distribution": {"Data Interpretation": 4}
            }
        ]
    });
    let rules = GroupingRules::default();
    let (bp, _) = Blueprint::from_value(bp, &rules).unwrap();

    c.bench_function("series_5_instances", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| {
            let config = SeriesConfig {
                count: 5,
                ..SeriesConfig::default()
            };
            let mut orchestrator = SeriesOrchestrator::new(&index, &bp, &rules, config);
            orchestrator.run(&mut rng, &mut MemorySink, &NoopObserver)
        })
    });
}

criterion_group!(
    benches,
    bench_item_selection,
    bench_group_selection,
    bench_series
);
criterion_main!(benches);
