//! # Relation Store
//!
//! Contract of the persistence substrate under the membership layer.
//! Every call may fail with `MembershipError::StoreUnavailable`; callers
//! propagate it and never substitute an empty result.

use std::collections::BTreeSet;

use super::errors::MembershipResult;
use super::names::Actor;
use super::record::{EntityKey, Field, MembershipDraft, MembershipRecord};
use super::relation::{RelationDescriptor, RelationHandle};

/// Filter comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
}

/// One column predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: Field,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn matches(&self, record: &MembershipRecord) -> bool {
        match self.op {
            FilterOp::Equal => match record.field_str(self.field) {
                Some(v) => v == self.value,
                None => record.field_value(self.field) == self.value,
            },
        }
    }
}

/// Store-facing description of a query: a table and a conjunction of filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub table: String,
    pub filters: Vec<Filter>,
}

impl QuerySpec {
    pub fn matches(&self, record: &MembershipRecord) -> bool {
        record.table() == self.table && self.filters.iter().all(|f| f.matches(record))
    }
}

/// Persistence substrate for typed records
pub trait RelationStore: Send + Sync {
    /// Schema new relations are created in
    fn default_schema_name(&self) -> &str;

    /// Create the table described by `relation` if it does not exist
    fn assert_relation(&self, relation: &RelationDescriptor, actor: &Actor) -> MembershipResult<()>;

    /// All records matching `spec`
    fn run_query(&self, spec: &QuerySpec, actor: &Actor) -> MembershipResult<Vec<MembershipRecord>>;

    /// Distinct values of `field` over the records matching `spec`
    fn run_distinct(
        &self,
        spec: &QuerySpec,
        field: Field,
        actor: &Actor,
    ) -> MembershipResult<Vec<String>>;

    /// Allocate an unsaved record with a fresh id
    fn create_entity(&self, relation: &RelationHandle, actor: &Actor) -> MembershipResult<MembershipDraft>;

    /// Persist a batch of new records
    fn put_entities(&self, records: &[MembershipRecord], actor: &Actor) -> MembershipResult<()>;

    /// Remove a batch of records; unknown keys are ignored
    fn delete_entities(&self, keys: &[EntityKey], actor: &Actor) -> MembershipResult<()>;
}

/// A query under construction against one store
pub struct Query<'a> {
    store: &'a dyn RelationStore,
    actor: &'a Actor,
    spec: QuerySpec,
}

impl<'a> Query<'a> {
    pub fn new(store: &'a dyn RelationStore, relation: &RelationHandle, actor: &'a Actor) -> Self {
        Self {
            store,
            actor,
            spec: QuerySpec {
                table: relation.table_name().to_string(),
                filters: Vec::new(),
            },
        }
    }

    pub fn add_filter(mut self, field: Field, op: FilterOp, value: impl Into<String>) -> Self {
        self.spec.filters.push(Filter {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn execute(&self) -> MembershipResult<Vec<MembershipRecord>> {
        self.store.run_query(&self.spec, self.actor)
    }

    pub fn execute_distinct_values(&self, field: Field) -> MembershipResult<Vec<String>> {
        self.store.run_distinct(&self.spec, field, self.actor)
    }
}

/// Distinct values of `field`, in sorted order
pub fn distinct_values<'r>(
    records: impl IntoIterator<Item = &'r MembershipRecord>,
    field: Field,
) -> Vec<String> {
    records
        .into_iter()
        .map(|r| r.field_value(field))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::record::{FieldBounds, RecordId};

    fn record(principal: &str, authority: &str) -> MembershipRecord {
        let mut d = MembershipDraft::new(
            RecordId::generate(),
            "_user_granted_authority",
            FieldBounds::default(),
            "system",
        );
        d.set_principal(principal).unwrap();
        d.set_authority(authority).unwrap();
        d.build().unwrap()
    }

    #[test]
    fn test_spec_matches_all_filters() {
        let r = record("uid:alice", "ROLE_USER");
        let spec = QuerySpec {
            table: "_user_granted_authority".to_string(),
            filters: vec![
                Filter { field: Field::Principal, op: FilterOp::Equal, value: "uid:alice".into() },
                Filter { field: Field::Authority, op: FilterOp::Equal, value: "ROLE_USER".into() },
            ],
        };
        assert!(spec.matches(&r));

        let other_table = QuerySpec { table: "_other".to_string(), filters: vec![] };
        assert!(!other_table.matches(&r));
    }

    #[test]
    fn test_filter_is_exact_match() {
        let r = record("uid:alice", "ROLE_USER");
        let f = Filter { field: Field::Principal, op: FilterOp::Equal, value: "UID:ALICE".into() };
        assert!(!f.matches(&r));
    }

    #[test]
    fn test_filter_on_id() {
        let r = record("uid:alice", "ROLE_USER");
        let f = Filter { field: Field::Id, op: FilterOp::Equal, value: r.id().to_string() };
        assert!(f.matches(&r));
    }

    #[test]
    fn test_distinct_values_dedupes() {
        let records = vec![
            record("uid:alice", "ROLE_USER"),
            record("uid:alice", "ROLE_USER"),
            record("uid:alice", "ROLE_DATA_VIEWER"),
        ];
        assert_eq!(
            distinct_values(&records, Field::Authority),
            vec!["ROLE_DATA_VIEWER".to_string(), "ROLE_USER".to_string()]
        );
    }
}
