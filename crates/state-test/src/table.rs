//! Table-bound convergence waiters.
//!
//! A [`Table`] binds a read-only accessor to one table name, so scenario
//! code names the table once and then speaks in terms of what it expects
//! the daemon to converge to: a key count, a field value, a deletion.
//! Every waiter is a thin predicate handed to
//! [`wait_for_result`](crate::polling::wait_for_result); none of them
//! sleeps or retries on its own.
//!
//! Key-count waits come in two deliberately distinct operations:
//! [`Table::wait_for_exact_n_keys`] and [`Table::wait_for_at_least_n_keys`].
//! Overloading one signature with a comparison flag is how call sites end
//! up disagreeing about what "wait for N" means.

use std::collections::BTreeSet;

use crate::error::VerifyError;
use crate::polling::{PollResult, PollingConfig, wait_for_result};
use crate::snapshot::TableSnapshot;
use crate::store::{FieldValues, StateStore};

/// Read-side handle over one derived-state table.
///
/// Carries the polling default for its test scope; every waiter accepts an
/// optional per-call override for slower-converging expectations.
pub struct Table<'a, S> {
    store: &'a S,
    name: String,
    config: PollingConfig,
}

impl<'a, S: StateStore> Table<'a, S> {
    /// Bind `store` to table `name` with the default polling config.
    pub fn new(store: &'a S, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            config: PollingConfig::default(),
        }
    }

    /// Replace the scope-wide polling default for this handle.
    #[must_use]
    pub fn with_config(mut self, config: PollingConfig) -> Self {
        self.config = config;
        self
    }

    /// Table name this handle is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn effective_config<'c>(&'c self, overrides: Option<&'c PollingConfig>) -> &'c PollingConfig {
        overrides.unwrap_or(&self.config)
    }

    /// List the table's live keys.
    pub async fn get_keys(&self) -> Result<BTreeSet<String>, VerifyError> {
        Ok(self.store.get_keys(&self.name).await?)
    }

    /// Read one live entry, `None` if absent.
    pub async fn get_entry(&self, key: &str) -> Result<Option<FieldValues>, VerifyError> {
        Ok(self.store.get_entry(&self.name, key).await?)
    }

    /// Read one live field, `None` if the key or field is absent.
    pub async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, VerifyError> {
        Ok(self.store.get_field(&self.name, key, field).await?)
    }

    /// Wait until the table holds exactly `n` keys. Returns the key set
    /// observed on the final evaluation.
    pub async fn wait_for_exact_n_keys(
        &self,
        n: usize,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<BTreeSet<String>>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        wait_for_result(
            || async move {
                let keys = store.get_keys(name).await?;
                Ok((keys.len() == n, Some(keys)))
            },
            self.effective_config(config),
            &format!("exactly {n} keys in {name}"),
        )
        .await
    }

    /// Wait until the table holds at least `n` keys.
    pub async fn wait_for_at_least_n_keys(
        &self,
        n: usize,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<BTreeSet<String>>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        wait_for_result(
            || async move {
                let keys = store.get_keys(name).await?;
                Ok((keys.len() >= n, Some(keys)))
            },
            self.effective_config(config),
            &format!("at least {n} keys in {name}"),
        )
        .await
    }

    /// Wait until `key` exists, returning its fields.
    pub async fn wait_for_entry(
        &self,
        key: &str,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<FieldValues>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        wait_for_result(
            || async move {
                Ok(match store.get_entry(name, key).await? {
                    Some(fields) => (true, Some(fields)),
                    None => (false, None),
                })
            },
            self.effective_config(config),
            &format!("entry {key} in {name}"),
        )
        .await
    }

    /// Wait until every field in `expected_fields` equals the live value.
    /// A missing key or missing field is a non-match, not an error.
    pub async fn wait_for_field_match(
        &self,
        key: &str,
        expected_fields: &FieldValues,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<FieldValues>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        let expected = expected_fields;
        wait_for_result(
            || async move {
                Ok(match store.get_entry(name, key).await? {
                    Some(fields) => {
                        let matched = expected
                            .iter()
                            .all(|(field, value)| fields.get(field) == Some(value));
                        (matched, Some(fields))
                    }
                    None => (false, None),
                })
            },
            self.effective_config(config),
            &format!("{name}:{key} to match {expected:?}"),
        )
        .await
    }

    /// Wait until the entry at `key` equals `expected_entry` exactly,
    /// with no extra fields and no missing fields.
    pub async fn wait_for_exact_match(
        &self,
        key: &str,
        expected_entry: &FieldValues,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<FieldValues>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        let expected = expected_entry;
        wait_for_result(
            || async move {
                Ok(match store.get_entry(name, key).await? {
                    Some(fields) => {
                        let matched = fields == *expected;
                        (matched, Some(fields))
                    }
                    None => (false, None),
                })
            },
            self.effective_config(config),
            &format!("{name}:{key} to equal {expected:?}"),
        )
        .await
    }

    /// Wait until at least one field in `unexpected_fields` differs from
    /// the given value. An absent key or field counts as differing.
    pub async fn wait_for_field_negative_match(
        &self,
        key: &str,
        unexpected_fields: &FieldValues,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<FieldValues>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        let unexpected = unexpected_fields;
        wait_for_result(
            || async move {
                let fields = store.get_entry(name, key).await?;
                let differs = match &fields {
                    Some(live) => unexpected
                        .iter()
                        .any(|(field, value)| live.get(field) != Some(value)),
                    None => true,
                };
                Ok((differs, fields))
            },
            self.effective_config(config),
            &format!("{name}:{key} to diverge from {unexpected:?}"),
        )
        .await
    }

    /// Wait until `key` is absent from the live key set.
    pub async fn wait_for_deleted_entry(
        &self,
        key: &str,
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<BTreeSet<String>>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        wait_for_result(
            || async move {
                let keys = store.get_keys(name).await?;
                Ok((!keys.contains(key), Some(keys)))
            },
            self.effective_config(config),
            &format!("deletion of {key} from {name}"),
        )
        .await
    }

    /// Wait until every key in `keys` is absent from the live key set.
    pub async fn wait_for_deleted_keys(
        &self,
        keys: &[String],
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<BTreeSet<String>>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        let expected_gone = keys;
        wait_for_result(
            || async move {
                let live = store.get_keys(name).await?;
                let all_gone = expected_gone.iter().all(|key| !live.contains(key));
                Ok((all_gone, Some(live)))
            },
            self.effective_config(config),
            &format!("deletion of {expected_gone:?} from {name}"),
        )
        .await
    }

    /// Wait until every key in `keys` is present in the live key set.
    pub async fn wait_for_matching_keys(
        &self,
        keys: &[String],
        config: Option<&PollingConfig>,
    ) -> Result<PollResult<BTreeSet<String>>, VerifyError> {
        let store = self.store;
        let name = self.name.as_str();
        let expected_present = keys;
        wait_for_result(
            || async move {
                let live = store.get_keys(name).await?;
                let all_present = expected_present.iter().all(|key| live.contains(key));
                Ok((all_present, Some(live)))
            },
            self.effective_config(config),
            &format!("presence of {expected_present:?} in {name}"),
        )
        .await
    }

    /// Capture the table's current key set. Taken immediately before an
    /// intent write; consumed by exactly one diff after convergence.
    pub async fn snapshot(&self) -> Result<TableSnapshot, VerifyError> {
        let keys = self.store.get_keys(&self.name).await?;
        Ok(TableSnapshot::capture(&self.name, keys))
    }

    /// Resolve the single key created since `prior`. Fails if zero or more
    /// than one new key is found.
    pub async fn created_entry(&self, prior: TableSnapshot) -> Result<String, VerifyError> {
        let mut created = self.created_entries(prior, 1).await?;
        match created.pop() {
            Some(key) => Ok(key),
            None => Err(VerifyError::WrongCreatedCount {
                table: self.name.clone(),
                expected: 1,
                found: 0,
                keys: Vec::new(),
            }),
        }
    }

    /// Resolve exactly `count` keys created since `prior`, in lexicographic
    /// order. Any other count is an immediate failure, since re-reading
    /// cannot change a count mismatch on stable state.
    pub async fn created_entries(
        &self,
        prior: TableSnapshot,
        count: usize,
    ) -> Result<Vec<String>, VerifyError> {
        self.check_snapshot(&prior)?;
        let live = self.store.get_keys(&self.name).await?;
        let created = prior.created_since(&live);
        if created.len() != count {
            return Err(VerifyError::WrongCreatedCount {
                table: self.name.clone(),
                expected: count,
                found: created.len(),
                keys: created,
            });
        }
        Ok(created)
    }

    /// Resolve exactly `count` keys deleted since `prior`, in lexicographic
    /// order.
    pub async fn deleted_entries(
        &self,
        prior: TableSnapshot,
        count: usize,
    ) -> Result<Vec<String>, VerifyError> {
        self.check_snapshot(&prior)?;
        let live = self.store.get_keys(&self.name).await?;
        let deleted = prior.deleted_since(&live);
        if deleted.len() != count {
            return Err(VerifyError::WrongDeletedCount {
                table: self.name.clone(),
                expected: count,
                found: deleted.len(),
                keys: deleted,
            });
        }
        Ok(deleted)
    }

    fn check_snapshot(&self, prior: &TableSnapshot) -> Result<(), VerifyError> {
        if prior.table() != self.name {
            return Err(VerifyError::SnapshotMismatch {
                expected: self.name.clone(),
                found: prior.table().to_string(),
            });
        }
        Ok(())
    }
}
