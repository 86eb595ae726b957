//! Per-structure, per-field access counters.

use std::collections::BTreeMap;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::access::{AccessSink, FieldAccess};

/// Maps a structure name to its field counters.
///
/// Buckets are created on first access and never removed; counts only grow
/// and saturate at `u64::MAX`. Field counters are kept in ascending index
/// order. Two types sharing a name share a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    structs: AHashMap<String, BTreeMap<u64, u64>>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, structure: &str, field: u64) {
        self.add(structure, field, 1);
    }

    fn add(&mut self, structure: &str, field: u64, amount: u64) {
        let count = self
            .structs
            .entry(structure.to_owned())
            .or_default()
            .entry(field)
            .or_insert(0);
        *count = count.saturating_add(amount);
    }

    pub fn count(&self, structure: &str, field: u64) -> u64 {
        self.structs
            .get(structure)
            .and_then(|fields| fields.get(&field))
            .copied()
            .unwrap_or(0)
    }

    pub fn fields(&self, structure: &str) -> Option<&BTreeMap<u64, u64>> {
        self.structs.get(structure)
    }

    /// Structure names in ascending order.
    pub fn structures(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.structs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn total_accesses(&self) -> u64 {
        self.structs
            .values()
            .flat_map(|fields| fields.values())
            .fold(0u64, |acc, count| acc.saturating_add(*count))
    }

    /// Adds every counter of `other` into `self`.
    pub fn merge(&mut self, other: &FrequencyTable) {
        for (structure, fields) in &other.structs {
            for (field, count) in fields {
                self.add(structure, *field, *count);
            }
        }
    }

    pub fn merged(mut self, other: FrequencyTable) -> Self {
        if self.is_empty() {
            return other;
        }
        self.merge(&other);
        self
    }
}

impl AccessSink for FrequencyTable {
    fn record(&mut self, access: &FieldAccess) {
        self.increment(&access.structure, access.field);
    }
}

/// Lock-guarded table for hosts that process functions concurrently.
#[derive(Debug, Default)]
pub struct SharedFrequencyTable {
    inner: Mutex<FrequencyTable>,
}

impl SharedFrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, structure: &str, field: u64) {
        self.inner.lock().increment(structure, field);
    }

    /// Folds a worker's partial table in under a single lock acquisition.
    pub fn absorb(&self, partial: &FrequencyTable) {
        self.inner.lock().merge(partial);
    }

    pub fn into_inner(self) -> FrequencyTable {
        self.inner.into_inner()
    }
}

impl AccessSink for &SharedFrequencyTable {
    fn record(&mut self, access: &FieldAccess) {
        self.increment(&access.structure, access.field);
    }
}
