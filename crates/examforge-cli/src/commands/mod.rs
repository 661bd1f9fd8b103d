pub mod check;
pub mod estimate;
pub mod generate;
pub mod init;
pub mod stats;
pub mod validate;

use std::path::Path;

use anyhow::Result;

use examforge_core::blueprint::{self, Blueprint, GroupingRules};
use examforge_core::validator::ValidationReport;

/// Print warnings then errors.
pub(crate) fn print_validation(report: &ValidationReport) {
    for w in &report.warnings {
        println!("  WARNING: {w}");
    }
    for e in &report.errors {
        println!("  ERROR: {e}");
    }
}

/// Validate and parse a blueprint, failing with every error printed.
pub(crate) fn load_valid_blueprint(path: &Path, rules: &GroupingRules) -> Result<Blueprint> {
    let report = blueprint::validate_file(path, rules)?;
    if !report.is_valid() {
        print_validation(&report);
        anyhow::bail!(
            "blueprint {} has {} error(s)",
            path.display(),
            report.errors.len()
        );
    }
    for w in &report.warnings {
        eprintln!("  WARNING: {w}");
    }
    let (bp, _) = blueprint::load_blueprint(path, rules)?;
    Ok(bp)
}
