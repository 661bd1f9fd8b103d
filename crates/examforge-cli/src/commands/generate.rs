//! The `examforge generate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use examforge_core::config::load_config_from;
use examforge_core::corpus::CorpusIndex;
use examforge_core::error::IntegrityError;
use examforge_core::presets::DifficultyPreset;
use examforge_core::selector::OverlapBudget;
use examforge_core::series::{
    DirectorySink, HaltReason, InstanceRecord, SeriesObserver, SeriesOrchestrator,
};
use examforge_core::summary::{SeriesSummary, SUMMARY_FILE};

use super::load_valid_blueprint;

pub struct GenerateArgs {
    pub blueprint: PathBuf,
    pub count: u32,
    pub output: Option<PathBuf>,
    pub overlap: Option<u8>,
    pub preset: DifficultyPreset,
    pub seed: Option<u64>,
    pub no_shuffle: bool,
    pub corpus_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleObserver;

impl SeriesObserver for ConsoleObserver {
    fn on_instance_start(&self, instance_number: u32, total: u32) {
        eprintln!("  Generating instance {instance_number}/{total}");
    }

    fn on_instance_accepted(&self, record: &InstanceRecord) {
        let file = record.file.as_deref().unwrap_or("-");
        eprintln!(
            "  Done: {} -> {} ({} questions, {:.1}% overlap)",
            record.instance_id, file, record.total_questions, record.realized_overlap
        );
    }

    fn on_instance_retry(&self, instance_number: u32, error: &IntegrityError) {
        eprintln!("  RETRY: instance {instance_number}: {error}");
    }

    fn on_series_complete(&self, generated: usize, requested: u32, halt: Option<&HaltReason>) {
        match halt {
            Some(reason) => eprintln!(
                "\nSeries halted early: {reason}\nGenerated {generated} of {requested} instance(s)."
            ),
            None => eprintln!("\nComplete: {generated}/{requested} instance(s) generated"),
        }
    }
}

pub fn execute(args: GenerateArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(dir) = args.corpus_dir {
        config.corpus_dir = dir;
    }
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    if let Some(p) = args.overlap {
        config.overlap_percentage = OverlapBudget::new(p).map_err(anyhow::Error::msg)?;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.no_shuffle {
        config.shuffle = false;
    }

    tracing::debug!(
        corpus_dir = %config.corpus_dir.display(),
        output_dir = %config.output_dir.display(),
        seed = ?config.seed,
        shuffle = config.shuffle,
        "resolved configuration"
    );

    let rules = config.grouping_rules();
    let mut blueprint = load_valid_blueprint(&args.blueprint, &rules)?;
    if args.preset.apply(&mut blueprint) {
        eprintln!("Applied difficulty preset: {}", args.preset);
    }

    let corpus = CorpusIndex::load(&config.corpus_dir, &blueprint.source_files(), config.group_size)
        .context("failed to load corpus")?;

    let series_config = config.series_config(args.count);
    let mut orchestrator = SeriesOrchestrator::new(&corpus, &blueprint, &rules, series_config.clone());
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut sink = DirectorySink::new(&config.output_dir, &blueprint.test_id);

    eprintln!(
        "Generating {} instance(s) of {} (overlap {})",
        args.count, blueprint.test_id, series_config.budget
    );
    let outcome = orchestrator.run(&mut rng, &mut sink, &ConsoleObserver);

    if outcome.records.is_empty() {
        if let Some(reason) = &outcome.halt_reason {
            anyhow::bail!("no instances could be generated: {reason}");
        }
    }

    let summary = SeriesSummary::build(
        &blueprint,
        &series_config,
        args.preset,
        config.seed,
        &outcome,
        orchestrator.ledger(),
    );
    let summary_path = config.output_dir.join(SUMMARY_FILE);
    summary.save_json(&summary_path)?;

    print_summary(&summary);
    eprintln!("Summary saved to: {}", summary_path.display());
    Ok(())
}

fn print_summary(summary: &SeriesSummary) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Instance",
        "File",
        "Questions",
        "Overlap",
        "Unique",
        "Repeated",
        "Shortfall",
    ]);

    for r in &summary.instances {
        table.add_row(vec![
            Cell::new(&r.instance_id),
            Cell::new(r.file.as_deref().unwrap_or("-")),
            Cell::new(r.total_questions),
            Cell::new(format!("{:.1}%", r.realized_overlap)),
            Cell::new(r.unique_questions),
            Cell::new(r.repeated_questions),
            Cell::new(r.shortfall),
        ]);
    }

    let stats = &summary.statistics;
    println!("{table}");
    println!(
        "Series: {} | {} of {} generated | avg overlap {:.1}% (min {:.1}%, max {:.1}%) | {} unique questions",
        summary.series_name,
        summary.total_generated,
        summary.requested,
        stats.average_overlap,
        stats.min_overlap,
        stats.max_overlap,
        stats.total_unique_questions
    );
}
