//! # Membership Diff
//!
//! Computes the minimal change set between the records stored for one
//! anchor and the desired set of subject values.
//!
//! ## Invariants
//! - Insertions are exactly `desired \ existing` by subject value
//! - Deletions are exactly the records whose subject is not desired, plus
//!   (under [`DuplicatePolicy::Collapse`]) every repeat of a satisfied subject
//! - Inputs are never mutated

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::names::Anchor;
use super::record::{EntityKey, MembershipRecord};

/// What to do with two records carrying the same pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep every duplicate; only undesired subjects are deleted
    #[default]
    Preserve,
    /// Keep the first record of a pairing and delete the rest
    Collapse,
}

/// Planned change set for one anchor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Subject values to pair with the anchor
    pub to_insert: BTreeSet<String>,
    /// Records to remove
    pub to_delete: Vec<EntityKey>,
}

impl MembershipDiff {
    /// Diff `existing` records of `anchor` against `desired` subjects.
    ///
    /// `existing` must already be filtered to the anchor. Records are
    /// scanned in the given order; under `Collapse` the first record of a
    /// pairing is the one kept.
    pub fn compute(
        anchor: &Anchor,
        existing: &[MembershipRecord],
        desired: &BTreeSet<String>,
        policy: DuplicatePolicy,
    ) -> Self {
        let mut satisfied: BTreeSet<&str> = BTreeSet::new();
        let mut to_delete = Vec::new();

        for record in existing {
            let subject = anchor.subject_of(record);
            if !desired.contains(subject) {
                to_delete.push(record.key());
                continue;
            }
            let first_seen = satisfied.insert(subject);
            if !first_seen && policy == DuplicatePolicy::Collapse {
                to_delete.push(record.key());
            }
        }

        let to_insert = desired
            .iter()
            .filter(|s| !satisfied.contains(s.as_str()))
            .cloned()
            .collect();

        Self {
            to_insert,
            to_delete,
        }
    }

    /// Nothing to insert and nothing to delete
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}
