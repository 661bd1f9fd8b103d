//! The `examforge stats` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::config::load_config_from;
use examforge_core::corpus::{CorpusIndex, FileKind, FileStats};

pub fn execute(
    files: Vec<String>,
    corpus_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(dir) = corpus_dir {
        config.corpus_dir = dir;
    }

    let corpus = CorpusIndex::load(&config.corpus_dir, &files, config.group_size)
        .context("failed to load corpus")?;

    for file in &files {
        let Some(stats) = corpus.stats(file) else {
            continue;
        };
        print_stats(&stats);
    }
    Ok(())
}

fn print_stats(stats: &FileStats) {
    match stats.kind {
        FileKind::Items => println!("{}: {} questions", stats.file, stats.total_questions),
        FileKind::Groups => println!(
            "{}: {} groups, {} questions",
            stats.file, stats.total_groups, stats.total_questions
        ),
    }

    let mut difficulty = Table::new();
    difficulty.set_header(vec!["Difficulty", "Questions"]);
    for (d, n) in &stats.by_difficulty {
        difficulty.add_row(vec![Cell::new(d), Cell::new(n)]);
    }
    println!("{difficulty}");

    let mut topics = Table::new();
    let unit = match stats.kind {
        FileKind::Items => "Questions",
        FileKind::Groups => "Groups",
    };
    topics.set_header(vec!["Topic", unit]);
    for (topic, n) in &stats.by_topic {
        topics.add_row(vec![Cell::new(topic), Cell::new(n)]);
    }
    println!("{topics}");

    if !stats.by_footprint.is_empty() {
        let mut footprints = Table::new();
        footprints.set_header(vec!["Footprint (E-M-H)", "Groups"]);
        for (fp, n) in &stats.by_footprint {
            footprints.add_row(vec![Cell::new(fp), Cell::new(n)]);
        }
        println!("{footprints}");
    }
    println!();
}
