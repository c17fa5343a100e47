//! Failure taxonomy for the verification oracle.
//!
//! Every failure a test can hit maps onto exactly one variant here:
//!
//! - transient non-convergence is *not* an error: it is a `(false, _)`
//!   predicate result and gets retried by the poller
//! - a strict timeout is [`VerifyError::ConvergenceTimeout`]
//! - a snapshot-diff count deviation is a cardinality variant and is never
//!   retried, since repeating the read cannot change a count mismatch on
//!   stable state
//! - a backing-store failure propagates as [`VerifyError::Store`] and is
//!   never misread as "not yet converged"

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Everything the convergence engine can report to a test.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The polling configuration itself is unusable. A configuration error,
    /// never a convergence failure.
    #[error("invalid polling config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A strict wait ran out its window without the predicate holding.
    #[error("timed out after {timeout:?} waiting for {expectation}; last observed: {last_observed}")]
    ConvergenceTimeout {
        /// What the wait was for, e.g. `exactly 3 keys in HAL_NEXTHOP_GROUP`.
        expectation: String,
        /// Value seen on the final predicate evaluation.
        last_observed: String,
        /// The window that elapsed.
        timeout: Duration,
    },

    /// The live table gained a different number of keys than the diff
    /// call site declared.
    #[error("wrong number of created entries in {table}: expected {expected}, found {found} {keys:?}")]
    WrongCreatedCount {
        /// Table the snapshot was diffed against.
        table: String,
        /// Declared creation count.
        expected: usize,
        /// Keys actually created since the snapshot.
        found: usize,
        /// The created keys, lexicographically ordered.
        keys: Vec<String>,
    },

    /// The live table lost a different number of keys than the diff
    /// call site declared.
    #[error("wrong number of deleted entries in {table}: expected {expected}, found {found} {keys:?}")]
    WrongDeletedCount {
        /// Table the snapshot was diffed against.
        table: String,
        /// Declared deletion count.
        expected: usize,
        /// Keys actually deleted since the snapshot.
        found: usize,
        /// The deleted keys, lexicographically ordered.
        keys: Vec<String>,
    },

    /// A snapshot captured from one table was diffed against another.
    #[error("snapshot of table {found} diffed against table {expected}")]
    SnapshotMismatch {
        /// Table the diff ran on.
        expected: String,
        /// Table the snapshot was captured from.
        found: String,
    },

    /// An entry expected to exist was absent from the live store: a
    /// dangling reference, or a member row that vanished after the caller
    /// believed the group stable.
    #[error("entry {key} missing from {table}")]
    MissingEntry {
        /// Table read.
        table: String,
        /// Absent key.
        key: String,
    },

    /// A structurally required field was absent from an entry.
    #[error("field {field} missing from {table}:{key}")]
    MissingField {
        /// Table read.
        table: String,
        /// Entry key.
        key: String,
        /// Absent field.
        field: String,
    },

    /// The observed endpoint set of a group does not equal the expected one.
    #[error("group {group} endpoint set mismatch: expected {expected:?}, observed {observed:?}")]
    EndpointSetMismatch {
        /// Group object key.
        group: String,
        /// Expected endpoints, sorted.
        expected: Vec<String>,
        /// Observed endpoints, sorted.
        observed: Vec<String>,
    },

    /// An ordered group member's declared rank differs from its expected
    /// position.
    #[error("group {group} member {endpoint} rank mismatch: expected {expected}, observed {observed:?}")]
    RankMismatch {
        /// Group object key.
        group: String,
        /// Endpoint whose member carried the wrong rank.
        endpoint: String,
        /// Position the endpoint holds in the expected sequence.
        expected: usize,
        /// Raw rank value read from the member record.
        observed: String,
    },

    /// An unordered group member carries a rank attribute, meaning the
    /// daemon programmed an ordered group where none was asked for.
    #[error("group {group} member {endpoint} carries rank {rank:?} but the group is unordered")]
    UnexpectedRank {
        /// Group object key.
        group: String,
        /// Endpoint whose member carried the rank.
        endpoint: String,
        /// Raw rank value read from the member record.
        rank: String,
    },

    /// An ordered group member is missing its rank attribute.
    #[error("group {group} member {endpoint} is missing its rank")]
    MissingRank {
        /// Group object key.
        group: String,
        /// Endpoint whose member lacked a rank.
        endpoint: String,
    },

    /// A declared attribute on a derived object does not hold its expected
    /// value.
    #[error("wrong value for {field} on {table}:{key}: expected {expected:?}, observed {observed:?}")]
    AttributeMismatch {
        /// Table holding the object.
        table: String,
        /// Object key.
        key: String,
        /// Attribute name.
        field: String,
        /// Expected value.
        expected: String,
        /// Live value, `None` when the attribute is absent.
        observed: Option<String>,
    },

    /// The backing store failed. Propagated immediately, aborting the test.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}
