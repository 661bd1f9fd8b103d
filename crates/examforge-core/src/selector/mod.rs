//! Selection of items and groups for one test instance.
//!
//! Both selectors read the [`UsageLedger`] through a [`SelectionContext`],
//! which also tracks what has already been placed in the instance being
//! built. Selectors never write to the ledger.

pub mod groups;
pub mod items;

use std::collections::HashSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ledger::UsageLedger;

pub use groups::{GroupSelectionReport, GroupSelector};
pub use items::{ItemSelectionReport, ItemSelector};

/// Percentage of a cell that may be drawn from previously used content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct OverlapBudget(u8);

impl OverlapBudget {
    /// Budget of `percent`; values above 100 are rejected.
    pub fn new(percent: u8) -> Result<Self, String> {
        if percent > 100 {
            return Err(format!("overlap percentage must be between 0 and 100, got {percent}"));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// `ceil(n * (1 - p/100))`: how many of `n` must be fresh.
    pub fn unique_required(&self, n: u32) -> u32 {
        let fresh_share = 100 - u32::from(self.0);
        (n * fresh_share).div_ceil(100)
    }

    /// How many of `n` may be reused.
    pub fn reuse_allowed(&self, n: u32) -> u32 {
        n - self.unique_required(n)
    }
}

impl Default for OverlapBudget {
    fn default() -> Self {
        Self(20)
    }
}

impl TryFrom<u8> for OverlapBudget {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OverlapBudget> for u8 {
    fn from(b: OverlapBudget) -> Self {
        b.0
    }
}

impl fmt::Display for OverlapBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Read-only view of the ledger plus the ids placed so far in the instance.
#[derive(Debug)]
pub struct SelectionContext<'a> {
    ledger: &'a UsageLedger,
    budget: OverlapBudget,
    placed: HashSet<String>,
}

impl<'a> SelectionContext<'a> {
    pub fn new(ledger: &'a UsageLedger, budget: OverlapBudget) -> Self {
        Self {
            ledger,
            budget,
            placed: HashSet::new(),
        }
    }

    pub fn ledger(&self) -> &'a UsageLedger {
        self.ledger
    }

    pub fn budget(&self) -> OverlapBudget {
        self.budget
    }

    pub fn usage_count(&self, id: &str) -> usize {
        self.ledger.usage_count(id)
    }

    pub fn is_placed(&self, id: &str) -> bool {
        self.placed.contains(id)
    }

    /// Mark an item or group id as placed in the current instance.
    pub fn place(&mut self, id: &str) {
        self.placed.insert(id.to_string());
    }

    /// Number of ids placed so far.
    pub fn placed_len(&self) -> usize {
        self.placed.len()
    }
}

/// Shuffle, then stable-sort by `key`: equal keys end up in random order.
pub(crate) fn rank_with_random_ties<T, K, R>(candidates: &mut [T], rng: &mut R, key: impl FnMut(&T) -> K)
where
    K: Ord,
    R: Rng + ?Sized,
{
    candidates.shuffle(rng);
    candidates.sort_by_key(key);
}

/// Whether `source` is allowed by a section's source list. An empty list
/// allows everything.
pub(crate) fn source_allowed(sources: &[String], source: &str) -> bool {
    sources.is_empty() || sources.iter().any(|s| s == source)
}
