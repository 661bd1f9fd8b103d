//! The `examforge estimate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::config::load_config_from;
use examforge_core::corpus::CorpusIndex;
use examforge_core::selector::OverlapBudget;
use examforge_core::series::SeriesOrchestrator;

use super::load_valid_blueprint;

pub fn execute(
    blueprint_path: PathBuf,
    overlap: Option<u8>,
    corpus_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(dir) = corpus_dir {
        config.corpus_dir = dir;
    }
    if let Some(p) = overlap {
        config.overlap_percentage = OverlapBudget::new(p).map_err(anyhow::Error::msg)?;
    }

    let rules = config.grouping_rules();
    let blueprint = load_valid_blueprint(&blueprint_path, &rules)?;
    let corpus = CorpusIndex::load(&config.corpus_dir, &blueprint.source_files(), config.group_size)
        .context("failed to load corpus")?;

    let orchestrator = SeriesOrchestrator::new(&corpus, &blueprint, &rules, config.series_config(1));
    let estimate = orchestrator.estimate_max_instances();

    let mut table = Table::new();
    table.set_header(vec!["Cell", "Available", "Per instance", "Fresh", "Ceiling"]);
    for row in &estimate.rows {
        table.add_row(vec![
            Cell::new(&row.cell),
            Cell::new(row.available),
            Cell::new(row.required_per_instance),
            Cell::new(row.fresh_per_instance),
            Cell::new(
                row.ceiling
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unbounded".to_string()),
            ),
        ]);
    }

    println!("Capacity at {}% overlap for {}", estimate.overlap_percentage, blueprint.test_id);
    println!("{table}");
    match (estimate.max_instances, &estimate.bottleneck) {
        (Some(max), Some(cell)) => {
            println!("Estimated maximum instances: {max} (bottleneck: {cell})")
        }
        _ => println!("Estimated maximum instances: unbounded"),
    }
    Ok(())
}
