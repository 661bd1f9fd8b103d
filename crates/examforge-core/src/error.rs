//! Engine error types.
//!
//! Structural failures (unreadable or malformed corpus and blueprint files)
//! and post-assembly integrity failures. Supply shortfalls and overlap-budget
//! breaches are not errors: they are reported alongside the result.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and indexing corpus files.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// A referenced corpus file does not exist or cannot be read.
    #[error("failed to read corpus file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("invalid JSON in corpus file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document parsed but does not have the `{"questions": [...]}` shape.
    #[error("corpus file {} has no top-level \"questions\" array", path.display())]
    MissingQuestions { path: PathBuf },

    /// A single record is unusable (missing id, bad difficulty, ...).
    #[error("corpus file {}, record {index}: {message}", path.display())]
    Record {
        path: PathBuf,
        index: usize,
        message: String,
    },

    /// A group does not contain exactly K members.
    #[error("group '{group_id}' in {} has {actual} questions (expected {expected})", path.display())]
    GroupSize {
        path: PathBuf,
        group_id: String,
        expected: usize,
        actual: usize,
    },

    /// The same item or group id appears more than once across the corpus.
    #[error("duplicate id '{id}' in {} (first seen in {first_seen})", path.display())]
    DuplicateId {
        path: PathBuf,
        id: String,
        first_seen: String,
    },
}

/// Errors raised when a blueprint cannot be turned into a typed value.
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// The blueprint file cannot be read.
    #[error("failed to read blueprint {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blueprint is not valid JSON.
    #[error("invalid JSON in blueprint {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Consistency checks failed; every problem is listed.
    #[error("blueprint is invalid ({} error(s)):\n  {}", errors.len(), errors.join("\n  "))]
    Invalid { errors: Vec<String> },
}

/// An assembled instance violated a structural invariant.
#[derive(Debug, Error)]
#[error("instance {instance_number} failed integrity checks: {}", violations.join("; "))]
pub struct IntegrityError {
    /// The instance number that failed.
    pub instance_number: u32,
    /// Every violation found (count mismatches, duplicate ids).
    pub violations: Vec<String>,
}
