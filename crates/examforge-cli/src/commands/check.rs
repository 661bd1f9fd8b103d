//! The `examforge check` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::audit::{audit_directory, AuditReport};
use examforge_core::config::load_config_from;
use examforge_core::model::Difficulty;

use super::load_valid_blueprint;

pub fn execute(
    output: Option<PathBuf>,
    blueprint: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(dir) = output {
        config.output_dir = dir;
    }

    let rules = config.grouping_rules();
    let blueprint = blueprint
        .map(|path| load_valid_blueprint(&path, &rules))
        .transpose()?;

    let report = audit_directory(&config.output_dir, blueprint.as_ref(), &rules)?;
    if report.audits.is_empty() {
        anyhow::bail!("no instance files found in {}", config.output_dir.display());
    }

    for audit in &report.audits {
        let verdict = if audit.passed() { "PASSED" } else { "FAILED" };
        println!("{}: {verdict}", audit.file);
        for w in &audit.warnings {
            println!("  WARNING: {w}");
        }
        for e in &audit.errors {
            println!("  ERROR: {e}");
        }
    }

    print_summary(&report);

    if report.failed() > 0 {
        anyhow::bail!(
            "{} of {} instance file(s) failed the check",
            report.failed(),
            report.audits.len()
        );
    }
    Ok(())
}

fn print_summary(report: &AuditReport) {
    let mut table = Table::new();
    table.set_header(vec![
        "File", "Questions", "Easy", "Medium", "Hard", "Warnings", "Errors",
    ]);
    for audit in &report.audits {
        let mut row = vec![Cell::new(&audit.file), Cell::new(audit.total_questions)];
        for d in Difficulty::ALL {
            row.push(Cell::new(audit.difficulty.get(&d).copied().unwrap_or(0)));
        }
        row.push(Cell::new(audit.warnings.len()));
        row.push(Cell::new(audit.errors.len()));
        table.add_row(row);
    }

    println!("\n{table}");
    println!(
        "Checked {} instance file(s): {} passed, {} failed",
        report.audits.len(),
        report.passed(),
        report.failed()
    );
}
