//! Read-only accessor over the derived-state store.
//!
//! The engine observes the daemon under test through one narrow contract:
//! list a table's keys, read an entry, read a field. Every call hits the
//! live store; nothing here caches, and nothing here retries. A
//! backing-store failure is fatal at this layer and surfaces immediately;
//! the poller above never interprets it as "not yet converged".
//!
//! [`MemoryStore`] is the in-process implementation used by this crate's
//! own tests and by scenario drivers that stand up fixtures without a real
//! store behind them. Its mutating methods model the intent producer, which
//! lives entirely outside the verification core.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Field/value rows of one table entry. All values are stored as strings.
pub type FieldValues = BTreeMap<String, String>;

/// Failure reported by a backing-store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the backing store.
    #[error("backing store connection failed: {reason}")]
    Connection {
        /// Driver-reported reason.
        reason: String,
    },

    /// Any other backend-reported failure.
    #[error("backing store error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Read-only view over key/value tables in the derived-state store.
///
/// Implementations must not cache: the diff and wait layers depend on every
/// call observing live state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// List every key currently present in `table`.
    async fn get_keys(&self, table: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Read one entry, `None` if the key is absent.
    async fn get_entry(&self, table: &str, key: &str) -> Result<Option<FieldValues>, StoreError>;

    /// Read a single field, `None` if the key or the field is absent.
    async fn get_field(
        &self,
        table: &str,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .get_entry(table, key)
            .await?
            .and_then(|mut fields| fields.remove(field)))
    }
}

/// In-process table store.
///
/// Read side implements [`StateStore`]; the write side is the producer
/// surface scenario drivers use to play the role of the daemon and its
/// intent sources in tests. The verification core itself only ever reads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, BTreeMap<String, FieldValues>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an entry.
    pub fn set_entry<I, F, V>(&self, table: &str, key: &str, fields: I)
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let fields: FieldValues = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), fields);
    }

    /// Set one field, creating the entry if needed.
    pub fn set_field(&self, table: &str, key: &str, field: &str, value: &str) {
        let mut entries = self.tables.entry(table.to_string()).or_default();
        entries
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    /// Remove an entry. Removing an absent entry is a no-op.
    pub fn del_entry(&self, table: &str, key: &str) {
        if let Some(mut entries) = self.tables.get_mut(table) {
            entries.remove(key);
        }
    }

    /// Remove one field from an entry. Absent key or field is a no-op.
    pub fn del_field(&self, table: &str, key: &str, field: &str) {
        if let Some(mut entries) = self.tables.get_mut(table) {
            if let Some(fields) = entries.get_mut(key) {
                fields.remove(field);
            }
        }
    }

    /// Drop every table.
    pub fn clear(&self) {
        self.tables.clear();
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_keys(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_entry(&self, table: &str, key: &str) -> Result<Option<FieldValues>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .and_then(|entries| entries.get(key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let store = MemoryStore::new();
        assert!(store.get_keys("HAL_NEXTHOP").await.unwrap().is_empty());
        assert!(store.get_entry("HAL_NEXTHOP", "oid:0x1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_read_entry() {
        let store = MemoryStore::new();
        store.set_entry("HAL_NEXTHOP", "oid:0x1", [("ip", "10.0.0.1"), ("ifname", "Ethernet0")]);

        let keys = store.get_keys("HAL_NEXTHOP").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("oid:0x1"));

        let entry = store.get_entry("HAL_NEXTHOP", "oid:0x1").await.unwrap().unwrap();
        assert_eq!(entry.get("ip").map(String::as_str), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_get_field_absent_key_and_field() {
        let store = MemoryStore::new();
        store.set_entry("T", "k", [("state", "active")]);

        assert_eq!(
            store.get_field("T", "k", "state").await.unwrap().as_deref(),
            Some("active")
        );
        assert!(store.get_field("T", "k", "missing").await.unwrap().is_none());
        assert!(store.get_field("T", "missing", "state").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_del_entry_and_field() {
        let store = MemoryStore::new();
        store.set_entry("T", "k", [("a", "1"), ("b", "2")]);

        store.del_field("T", "k", "a");
        let entry = store.get_entry("T", "k").await.unwrap().unwrap();
        assert!(!entry.contains_key("a"));
        assert!(entry.contains_key("b"));

        store.del_entry("T", "k");
        assert!(store.get_entry("T", "k").await.unwrap().is_none());

        // No-ops on absent state.
        store.del_entry("T", "k");
        store.del_field("T", "k", "b");
    }

    #[tokio::test]
    async fn test_set_field_creates_entry() {
        let store = MemoryStore::new();
        store.set_field("T", "k", "state", "active");
        let keys = store.get_keys("T").await.unwrap();
        assert!(keys.contains("k"));
    }
}
