//! examforge CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use examforge_core::presets::DifficultyPreset;

mod commands;

#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Blueprint-driven mock test series generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a blueprint for structural and arithmetic errors
    Validate {
        /// Blueprint JSON file
        #[arg(long)]
        blueprint: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate a series of test instances from a blueprint
    Generate {
        /// Blueprint JSON file
        #[arg(long)]
        blueprint: PathBuf,

        /// Number of instances to generate
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,

        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Share of each cell that may repeat earlier instances, 0-100
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        overlap: Option<u8>,

        /// Difficulty preset: blueprint, balanced, easy-heavy, hard-heavy, medium-focus
        #[arg(long, default_value = "blueprint")]
        difficulty_preset: DifficultyPreset,

        /// Seed for a reproducible series
        #[arg(long)]
        seed: Option<u64>,

        /// Keep selection order instead of shuffling questions
        #[arg(long)]
        no_shuffle: bool,

        /// Directory holding the corpus files (default: from config)
        #[arg(long)]
        corpus_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Estimate how many instances the corpus can support
    Estimate {
        /// Blueprint JSON file
        #[arg(long)]
        blueprint: PathBuf,

        /// Share of each cell that may repeat earlier instances, 0-100
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        overlap: Option<u8>,

        /// Directory holding the corpus files (default: from config)
        #[arg(long)]
        corpus_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Audit generated instance files, optionally against their blueprint
    Check {
        /// Directory holding the instance files (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Blueprint JSON file to compare section contents with
        #[arg(long)]
        blueprint: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show statistics for corpus files
    Stats {
        /// Corpus files, relative to the corpus directory
        #[arg(required = true)]
        files: Vec<String>,

        /// Directory holding the corpus files (default: from config)
        #[arg(long)]
        corpus_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example blueprint
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examforge=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { blueprint, config } => commands::validate::execute(blueprint, config),
        Commands::Generate {
            blueprint,
            count,
            output,
            overlap,
            difficulty_preset,
            seed,
            no_shuffle,
            corpus_dir,
            config,
        } => commands::generate::execute(commands::generate::GenerateArgs {
            blueprint,
            count,
            output,
            overlap,
            preset: difficulty_preset,
            seed,
            no_shuffle,
            corpus_dir,
            config,
        }),
        Commands::Estimate {
            blueprint,
            overlap,
            corpus_dir,
            config,
        } => commands::estimate::execute(blueprint, overlap, corpus_dir, config),
        Commands::Check {
            output,
            blueprint,
            config,
        } => commands::check::execute(output, blueprint, config),
        Commands::Stats {
            files,
            corpus_dir,
            config,
        } => commands::stats::execute(files, corpus_dir, config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
