//! Group-membership verification over derived-state tables.
//!
//! Multi-path groups come out of the daemon as three related object
//! families: a group object, one member record per path referencing the
//! group, and a referenced endpoint object carrying the logical endpoint
//! value (an IP, typically). The member records and endpoint objects all
//! carry system-assigned keys, so membership can only be checked
//! relationally: enumerate the members pointing at the group, follow each
//! reference to its endpoint, and compare the resulting endpoint set
//! against expectation.
//!
//! Ordered groups additionally declare a rank on every member; unordered
//! groups must not carry the rank attribute at all, since its presence
//! means the daemon programmed an ordered group nobody asked for.
//!
//! The matcher performs no retries. Callers poll the member table to
//! stability first, then invoke [`MembershipVerifier::check_group_membership`]
//! once against what is believed to be converged state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::store::{FieldValues, StateStore};

/// Where member records live and how they point at their group and
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSchema {
    /// Table holding one record per group member.
    pub member_table: String,
    /// Member field referencing the owning group object.
    pub group_ref_field: String,
    /// Member field referencing the endpoint object.
    pub endpoint_ref_field: String,
    /// Table holding the referenced endpoint objects.
    pub endpoint_table: String,
    /// Endpoint-object field carrying the logical endpoint value.
    pub endpoint_field: String,
    /// Member field carrying the declared rank of ordered groups.
    pub rank_field: String,
}

/// One resolved group member.
#[derive(Debug, Clone, Serialize)]
pub struct MemberRecord {
    /// System-assigned key of the member record.
    pub member_key: String,
    /// Logical endpoint reached through the member's reference.
    pub endpoint: String,
    /// Declared rank, present only on ordered groups.
    pub rank: Option<u32>,
}

/// What a successful membership check observed.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipReport {
    /// Group object key the members reference.
    pub group_key: String,
    /// Whether the group declared an ordering.
    pub ordered: bool,
    /// Resolved members, in member-key order.
    pub members: Vec<MemberRecord>,
    /// When the check ran.
    pub verified_at: DateTime<Utc>,
}

impl fmt::Display for MembershipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Group membership: {}", self.group_key)?;
        writeln!(
            f,
            "  Ordering: {}",
            if self.ordered { "declared" } else { "unordered" }
        )?;
        writeln!(f, "  Members: {}", self.members.len())?;
        for member in &self.members {
            match member.rank {
                Some(rank) => {
                    writeln!(f, "    [{}] {} via {}", rank, member.endpoint, member.member_key)?;
                }
                None => writeln!(f, "    {} via {}", member.endpoint, member.member_key)?,
            }
        }
        Ok(())
    }
}

struct ResolvedMember {
    member_key: String,
    endpoint_key: String,
    endpoint: String,
    endpoint_fields: FieldValues,
    raw_rank: Option<String>,
}

/// Verifies group/membership relations with one level of indirection.
pub struct MembershipVerifier<'a, S> {
    store: &'a S,
    schema: MembershipSchema,
}

impl<'a, S: StateStore> MembershipVerifier<'a, S> {
    /// Bind a verifier to `store` with the given relation schema.
    pub fn new(store: &'a S, schema: MembershipSchema) -> Self {
        Self { store, schema }
    }

    /// The relation schema this verifier resolves through.
    pub fn schema(&self) -> &MembershipSchema {
        &self.schema
    }

    /// Check the membership of `group_key` against `expected_endpoints`.
    ///
    /// The observed endpoint set must equal the expected one exactly
    /// (duplicates count, discovery order does not). With `ordered` set,
    /// every member's declared rank must equal its endpoint's position in
    /// `expected_endpoints`; without it, no member may carry the rank
    /// attribute at all. `expected_attrs` maps an endpoint to attributes
    /// that must hold on its endpoint object; endpoints without an entry
    /// have no declared attributes.
    pub async fn check_group_membership(
        &self,
        group_key: &str,
        expected_endpoints: &[String],
        ordered: bool,
        expected_attrs: &HashMap<String, FieldValues>,
    ) -> Result<MembershipReport, VerifyError> {
        let members = self.resolve_members(group_key).await?;

        // Set equality first: it gives the broadest diagnostic when the
        // daemon programmed the wrong paths.
        let mut observed: Vec<String> = members.iter().map(|m| m.endpoint.clone()).collect();
        observed.sort();
        let mut expected: Vec<String> = expected_endpoints.to_vec();
        expected.sort();
        if observed != expected {
            return Err(VerifyError::EndpointSetMismatch {
                group: group_key.to_string(),
                expected,
                observed,
            });
        }

        let mut ranks: HashMap<String, u32> = HashMap::new();
        if ordered {
            for member in &members {
                let raw = member.raw_rank.as_ref().ok_or_else(|| {
                    VerifyError::MissingRank {
                        group: group_key.to_string(),
                        endpoint: member.endpoint.clone(),
                    }
                })?;
                let position = expected_endpoints
                    .iter()
                    .position(|endpoint| *endpoint == member.endpoint)
                    .ok_or_else(|| VerifyError::EndpointSetMismatch {
                        group: group_key.to_string(),
                        expected: expected_endpoints.to_vec(),
                        observed: members.iter().map(|m| m.endpoint.clone()).collect(),
                    })?;
                if raw.parse::<usize>() != Ok(position) {
                    return Err(VerifyError::RankMismatch {
                        group: group_key.to_string(),
                        endpoint: member.endpoint.clone(),
                        expected: position,
                        observed: raw.clone(),
                    });
                }
                ranks.insert(member.endpoint.clone(), position as u32);
            }
        } else if let Some(member) = members.iter().find(|m| m.raw_rank.is_some()) {
            return Err(VerifyError::UnexpectedRank {
                group: group_key.to_string(),
                endpoint: member.endpoint.clone(),
                rank: member.raw_rank.clone().unwrap_or_default(),
            });
        }

        for member in &members {
            let Some(attrs) = expected_attrs.get(&member.endpoint) else {
                continue;
            };
            for (field, expected_value) in attrs {
                let observed_value = member.endpoint_fields.get(field);
                if observed_value != Some(expected_value) {
                    return Err(VerifyError::AttributeMismatch {
                        table: self.schema.endpoint_table.clone(),
                        key: member.endpoint_key.clone(),
                        field: field.clone(),
                        expected: expected_value.clone(),
                        observed: observed_value.cloned(),
                    });
                }
            }
        }

        Ok(MembershipReport {
            group_key: group_key.to_string(),
            ordered,
            members: members
                .into_iter()
                .map(|member| {
                    let rank = ranks.get(&member.endpoint).copied();
                    MemberRecord {
                        member_key: member.member_key,
                        endpoint: member.endpoint,
                        rank,
                    }
                })
                .collect(),
            verified_at: Utc::now(),
        })
    }

    /// Enumerate the member records referencing `group_key` and follow each
    /// endpoint reference. A member that vanished between key listing and
    /// read, or a dangling endpoint reference, is a hard failure: the
    /// caller's contract says this state was already polled to stability.
    async fn resolve_members(&self, group_key: &str) -> Result<Vec<ResolvedMember>, VerifyError> {
        let schema = &self.schema;
        let member_keys = self.store.get_keys(&schema.member_table).await?;

        let mut members = Vec::new();
        for member_key in member_keys {
            let entry = self
                .store
                .get_entry(&schema.member_table, &member_key)
                .await?
                .ok_or_else(|| VerifyError::MissingEntry {
                    table: schema.member_table.clone(),
                    key: member_key.clone(),
                })?;

            if entry.get(&schema.group_ref_field).map(String::as_str) != Some(group_key) {
                continue;
            }

            let endpoint_key = entry.get(&schema.endpoint_ref_field).ok_or_else(|| {
                VerifyError::MissingField {
                    table: schema.member_table.clone(),
                    key: member_key.clone(),
                    field: schema.endpoint_ref_field.clone(),
                }
            })?;

            let endpoint_fields = self
                .store
                .get_entry(&schema.endpoint_table, endpoint_key)
                .await?
                .ok_or_else(|| VerifyError::MissingEntry {
                    table: schema.endpoint_table.clone(),
                    key: endpoint_key.clone(),
                })?;

            let endpoint = endpoint_fields
                .get(&schema.endpoint_field)
                .ok_or_else(|| VerifyError::MissingField {
                    table: schema.endpoint_table.clone(),
                    key: endpoint_key.clone(),
                    field: schema.endpoint_field.clone(),
                })?
                .clone();

            members.push(ResolvedMember {
                member_key,
                endpoint_key: endpoint_key.clone(),
                endpoint,
                endpoint_fields,
                raw_rank: entry.get(&schema.rank_field).cloned(),
            });
        }

        Ok(members)
    }
}
