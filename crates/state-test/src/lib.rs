//! Convergence verification oracle for the switchd control-plane test
//! network.
//!
//! The daemon under test consumes intent written to one set of tables and
//! asynchronously produces derived hardware-abstraction state in another.
//! Nothing bounds the propagation latency, so a test can never assume an
//! intent write and the appearance of its derived state are causally
//! synchronous; every check has to be phrased as "this becomes true
//! within a window". This crate is the oracle the whole test corpus
//! shares:
//!
//! - **Accessor** ([`StateStore`]): read-only, uncached view over one
//!   key/value table
//! - **Poller** ([`wait_for_result`]): bounded retry of a boolean
//!   predicate, the engine's single retry point
//! - **Convergence waiters** ([`Table`]): table-bound predicate builders
//!   for key counts, field values and deletions
//! - **Snapshot differ** ([`TableSnapshot`]): exact-cardinality resolution
//!   of which system-assigned keys appeared or vanished
//! - **Membership matcher** ([`MembershipVerifier`]): group/membership
//!   relations through one level of indirection, optionally rank-ordered
//!
//! # Flow
//!
//! A scenario driver captures a snapshot, issues an intent write through
//! its producer interface, waits for the derived table to converge,
//! resolves the new object's identity by diffing, then validates
//! relational structure:
//!
//! ```rust,ignore
//! let groups = Table::new(&store, "HAL_NEXTHOP_GROUP");
//! let prior = groups.snapshot().await?;
//! intent.create_route(&route)?;            // producer side, not this crate
//! groups.wait_for_exact_n_keys(prior.len() + 1, None).await?;
//! let group_key = groups.created_entry(prior).await?;
//! MembershipVerifier::new(&store, schema)
//!     .check_group_membership(&group_key, &endpoints, false, &attrs)
//!     .await?;
//! ```
//!
//! The daemon assigns opaque object identifiers, so identity is always
//! established by diffing a before/after pair. Hardcoding expected keys
//! is never correct.

pub mod error;
pub mod logging;
pub mod membership;
pub mod polling;
pub mod snapshot;
pub mod store;
pub mod table;

pub use error::VerifyError;
pub use membership::{MemberRecord, MembershipReport, MembershipSchema, MembershipVerifier};
pub use polling::{PollResult, PollingConfig, wait_for_result};
pub use snapshot::TableSnapshot;
pub use store::{FieldValues, MemoryStore, StateStore, StoreError};
pub use table::Table;
