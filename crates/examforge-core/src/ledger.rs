//! Cross-instance usage ledger.
//!
//! Records, for every item and group id, the instance numbers it was used in.
//! Selectors only read it; the series orchestrator commits to it after an
//! instance is accepted.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// id -> instance numbers, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLedger {
    entries: BTreeMap<String, Vec<u32>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `instance` to the entry of every id. An id already recorded
    /// for this instance is not recorded twice.
    pub fn commit<'a>(&mut self, instance: u32, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            let entry = self.entries.entry(id.to_string()).or_default();
            if !entry.contains(&instance) {
                entry.push(instance);
            }
        }
    }

    /// Number of accepted instances that used `id`.
    pub fn usage_count(&self, id: &str) -> usize {
        self.entries.get(id).map_or(0, Vec::len)
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.usage_count(id) > 0
    }

    /// Instance numbers that used `id`.
    pub fn instances_of(&self, id: &str) -> &[u32] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every id that has been used at least once.
    pub fn used_ids(&self) -> HashSet<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all usage. Call between unrelated series.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// times used -> number of ids used that many times.
    pub fn frequency_table(&self) -> BTreeMap<usize, usize> {
        let mut table = BTreeMap::new();
        for uses in self.entries.values() {
            *table.entry(uses.len()).or_default() += 1;
        }
        table
    }

    /// The `n` most used ids, most used first, ties by id.
    pub fn most_used(&self, n: usize) -> Vec<(&str, &[u32])> {
        let mut all: Vec<(&str, &[u32])> = self
            .entries
            .iter()
            .map(|(id, uses)| (id.as_str(), uses.as_slice()))
            .collect();
        all.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
        all.truncate(n);
        all
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.entries
            .iter()
            .map(|(id, uses)| (id.as_str(), uses.as_slice()))
    }
}
