//! examforge configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::blueprint::GroupingRules;
use crate::selector::OverlapBudget;
use crate::series::SeriesConfig;

/// Top-level examforge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    /// Directory holding the question bank files.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    /// Where generated instances and the series summary go.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Questions per atomic group.
    #[serde(default = "default_group_size")]
    pub group_size: u32,
    /// Topics always drawn as groups.
    #[serde(default = "default_grouped_topics")]
    pub grouped_topics: Vec<String>,
    #[serde(default = "default_overlap")]
    pub overlap_percentage: OverlapBudget,
    /// Percentage points of realized overlap tolerated above the budget.
    #[serde(default = "default_tolerance")]
    pub overlap_tolerance: f64,
    #[serde(default)]
    pub grace_instances: u32,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_instance: u32,
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./corpus")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./examforge-output")
}
fn default_group_size() -> u32 {
    5
}
fn default_grouped_topics() -> Vec<String> {
    vec!["Data Interpretation".to_string()]
}
fn default_overlap() -> OverlapBudget {
    OverlapBudget::default()
}
fn default_tolerance() -> f64 {
    30.0
}
fn default_shuffle() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    2
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            output_dir: default_output_dir(),
            group_size: default_group_size(),
            grouped_topics: default_grouped_topics(),
            overlap_percentage: default_overlap(),
            overlap_tolerance: default_tolerance(),
            grace_instances: 0,
            shuffle: default_shuffle(),
            seed: None,
            max_attempts_per_instance: default_max_attempts(),
        }
    }
}

impl ExamforgeConfig {
    pub fn grouping_rules(&self) -> GroupingRules {
        GroupingRules {
            group_size: self.group_size,
            grouped_topics: self.grouped_topics.clone(),
        }
    }

    /// Series settings for a run of `count` instances.
    pub fn series_config(&self, count: u32) -> SeriesConfig {
        SeriesConfig {
            count,
            budget: self.overlap_percentage,
            tolerance: self.overlap_tolerance,
            grace_instances: self.grace_instances,
            shuffle: self.shuffle,
            max_attempts: self.max_attempts_per_instance,
        }
    }

    /// Apply `EXAMFORGE_CORPUS_DIR` / `EXAMFORGE_SEED` from `lookup`, then
    /// resolve `${VAR}` references in the path fields.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("EXAMFORGE_CORPUS_DIR") {
            self.corpus_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup("EXAMFORGE_SEED") {
            let seed = seed
                .trim()
                .parse::<u64>()
                .with_context(|| format!("EXAMFORGE_SEED is not a valid seed: {seed}"))?;
            self.seed = Some(seed);
        }

        self.corpus_dir = resolve_path(&self.corpus_dir, &lookup);
        self.output_dir = resolve_path(&self.output_dir, &lookup);
        Ok(())
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables resolve to the empty string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = lookup(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path, lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy(), lookup))
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_CORPUS_DIR`, `EXAMFORGE_SEED`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => ExamforgeConfig::default(),
    };
    config.apply_env(env_lookup)?;
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<ExamforgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<ExamforgeConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Starter config written by `examforge init`.
pub const STARTER_CONFIG: &str = r#"# examforge configuration

corpus_dir = "./corpus"
output_dir = "./examforge-output"

# Questions per atomic group, and topics always drawn as groups.
group_size = 5
grouped_topics = ["Data Interpretation"]

# Share of each cell that may repeat earlier instances, and how far the
# realized overlap may exceed it before the series halts.
overlap_percentage = 20
overlap_tolerance = 30.0
grace_instances = 0

shuffle = true
max_attempts_per_instance = 2
# seed = 42
"#;
