//! Core data model types for examforge.
//!
//! Items are single questions; groups are atomic bundles of K items that
//! share one context (a chart, a caselet) and are selected as a unit.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque question content (prompt, options, answer, explanation, ...).
///
/// Carried verbatim from the corpus into emitted instances; never inspected.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Per-difficulty question counts, as used by blueprint distributions.
pub type DifficultyCounts = BTreeMap<Difficulty, u32>;

/// Question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// All difficulties in canonical order.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Order in which other difficulties are tried when a cell is short.
    pub const BACKFILL_ORDER: [Difficulty; 3] =
        [Difficulty::Medium, Difficulty::Easy, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Sum of all counts in a distribution.
pub fn total(counts: &DifficultyCounts) -> u32 {
    counts.values().sum()
}

/// A single exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique question id, preserved verbatim for traceability.
    #[serde(rename = "question_id")]
    pub id: String,
    /// Topic the question is classified under.
    pub topic: String,
    /// Optional finer classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Corpus file the item was loaded from.
    #[serde(skip)]
    pub source: String,
    /// Everything else in the record.
    #[serde(flatten)]
    pub payload: Payload,
}

/// An atomic bundle of K items sharing one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group id (`di_set_id` in the corpus).
    pub group_id: String,
    /// Topic of the group as a whole.
    pub topic: String,
    /// Exactly K members, ordered by question id.
    pub members: Vec<Item>,
    /// Per-difficulty composition of the members.
    pub footprint: Footprint,
    /// Corpus file the group was loaded from.
    #[serde(skip)]
    pub source: String,
    /// Group-level fields other than the members (the shared data context).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: Payload,
}

impl Group {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Easy/Medium/Hard counts of a group, written `"E-M-H"` (e.g. `"1-3-1"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Footprint {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl Footprint {
    pub fn new(easy: u32, medium: u32, hard: u32) -> Self {
        Self { easy, medium, hard }
    }

    /// Tally the difficulties of a set of items.
    pub fn of<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        let mut fp = Footprint::default();
        for item in items {
            *fp.count_mut(item.difficulty) += 1;
        }
        fp
    }

    pub fn count(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    fn count_mut(&mut self, difficulty: Difficulty) -> &mut u32 {
        match difficulty {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Medium => &mut self.medium,
            Difficulty::Hard => &mut self.hard,
        }
    }

    pub fn total(&self) -> u32 {
        self.easy + self.medium + self.hard
    }

    /// Manhattan distance between two count vectors.
    pub fn distance(&self, other: &Footprint) -> u32 {
        self.easy.abs_diff(other.easy)
            + self.medium.abs_diff(other.medium)
            + self.hard.abs_diff(other.hard)
    }

    /// The footprint as a difficulty distribution.
    pub fn to_counts(&self) -> DifficultyCounts {
        Difficulty::ALL.iter().map(|&d| (d, self.count(d))).collect()
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.easy, self.medium, self.hard)
    }
}

impl FromStr for Footprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 3 {
            return Err(format!("invalid footprint '{s}': expected E-M-H"));
        }
        let parse = |p: &str| {
            p.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid footprint '{s}': '{p}' is not a count"))
        };
        Ok(Footprint::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl From<Footprint> for String {
    fn from(fp: Footprint) -> Self {
        fp.to_string()
    }
}

impl TryFrom<String> for Footprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
