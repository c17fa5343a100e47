//! Point-in-time key-set captures and their diff algebra.
//!
//! The daemon assigns opaque, non-deterministic identifiers to the derived
//! objects it creates, so identity is established by diffing a before/after
//! pair, never by hardcoding expected keys. A [`TableSnapshot`] is the
//! "before" half of that pair: captured immediately before an intent write
//! and consumed by exactly one diff once convergence has been observed.
//!
//! The consuming calls on [`Table`](crate::table::Table) take the snapshot
//! by value, so a stale capture cannot leak into a later test step and turn
//! step-local deltas into accumulated ones. A snapshot is never a cache:
//! every diff re-reads the live key set and uses the capture only as the
//! baseline.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable key set captured from one table at one instant.
#[derive(Debug, Serialize)]
pub struct TableSnapshot {
    table: String,
    keys: BTreeSet<String>,
    taken_at: DateTime<Utc>,
}

impl TableSnapshot {
    pub(crate) fn capture(table: &str, keys: BTreeSet<String>) -> Self {
        Self {
            table: table.to_string(),
            keys,
            taken_at: Utc::now(),
        }
    }

    /// Table this snapshot was captured from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The captured key set.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Number of captured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table was empty at capture time.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `key` was present at capture time.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// When the capture was taken.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Keys present in `live` but not in this capture, lexicographically
    /// ordered.
    pub fn created_since(&self, live: &BTreeSet<String>) -> Vec<String> {
        live.difference(&self.keys).cloned().collect()
    }

    /// Keys in this capture that are gone from `live`, lexicographically
    /// ordered.
    pub fn deleted_since(&self, live: &BTreeSet<String>) -> Vec<String> {
        self.keys.difference(live).cloned().collect()
    }
}
