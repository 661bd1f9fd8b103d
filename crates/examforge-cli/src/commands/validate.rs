//! The `examforge validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_core::blueprint::validate_file;
use examforge_core::config::load_config_from;

use super::print_validation;

pub fn execute(blueprint_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let report = validate_file(&blueprint_path, &config.grouping_rules())?;

    println!("Blueprint: {}", blueprint_path.display());
    print_validation(&report);

    if !report.is_valid() {
        anyhow::bail!("{} error(s) found", report.errors.len());
    }

    if report.warnings.is_empty() {
        println!("Blueprint is valid.");
    } else {
        println!(
            "Blueprint is valid ({} warning(s)).",
            report.warnings.len()
        );
    }
    Ok(())
}
