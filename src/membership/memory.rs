//! In-memory relation store
//!
//! Used by tests and embedded deployments. Counts every call by operation
//! and can be told to fail the next call of a given kind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use super::errors::{MembershipError, MembershipResult};
use super::names::Actor;
use super::record::{EntityKey, Field, MembershipDraft, MembershipRecord, RecordId};
use super::relation::{RelationDescriptor, RelationHandle};
use super::store::{distinct_values, QuerySpec, RelationStore};

/// Store operations, for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    AssertRelation,
    Query,
    Distinct,
    CreateEntity,
    Put,
    Delete,
}

/// In-memory relation store
#[derive(Debug)]
pub struct InMemoryRelationStore {
    schema_name: String,
    tables: RwLock<HashSet<String>>,
    records: RwLock<BTreeMap<RecordId, MembershipRecord>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl Default for InMemoryRelationStore {
    fn default() -> Self {
        Self::with_schema("aerodb")
    }
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            tables: RwLock::new(HashSet::new()),
            records: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next call of `op` fail with a store error
    pub fn fail_next(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    /// Number of calls of `op` so far, failed ones included
    pub fn op_count(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of put and delete calls so far
    pub fn mutation_count(&self) -> usize {
        self.op_count(StoreOp::Put) + self.op_count(StoreOp::Delete)
    }

    /// Insert a record directly, bypassing call counting
    ///
    /// Lets tests seed state the reconciler would never produce, such as
    /// duplicate pairings.
    pub fn seed(&self, record: MembershipRecord) {
        if let Ok(mut records) = self.records.write() {
            records.insert(record.id(), record);
        }
    }

    /// Every live record
    pub fn all_records(&self) -> Vec<MembershipRecord> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self, op: StoreOp) -> MembershipResult<()> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        *calls.entry(op).or_insert(0) += 1;

        let mut failing = self
            .failing
            .lock()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        if failing.remove(&op) {
            return Err(MembershipError::store(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }

    fn require_table(&self, table: &str) -> MembershipResult<()> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        if tables.contains(table) {
            Ok(())
        } else {
            Err(MembershipError::store(format!("relation {} does not exist", table)))
        }
    }
}

impl RelationStore for InMemoryRelationStore {
    fn default_schema_name(&self) -> &str {
        &self.schema_name
    }

    fn assert_relation(&self, relation: &RelationDescriptor, _actor: &Actor) -> MembershipResult<()> {
        self.enter(StoreOp::AssertRelation)?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        tables.insert(relation.table_name.clone());
        Ok(())
    }

    fn run_query(&self, spec: &QuerySpec, _actor: &Actor) -> MembershipResult<Vec<MembershipRecord>> {
        self.enter(StoreOp::Query)?;
        self.require_table(&spec.table)?;
        let records = self
            .records
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        Ok(records.values().filter(|r| spec.matches(r)).cloned().collect())
    }

    fn run_distinct(
        &self,
        spec: &QuerySpec,
        field: Field,
        _actor: &Actor,
    ) -> MembershipResult<Vec<String>> {
        self.enter(StoreOp::Distinct)?;
        self.require_table(&spec.table)?;
        let records = self
            .records
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        Ok(distinct_values(records.values().filter(|r| spec.matches(r)), field))
    }

    fn create_entity(&self, relation: &RelationHandle, actor: &Actor) -> MembershipResult<MembershipDraft> {
        self.enter(StoreOp::CreateEntity)?;
        Ok(MembershipDraft::new(
            RecordId::generate(),
            relation.table_name(),
            relation.bounds(),
            actor.id(),
        ))
    }

    fn put_entities(&self, records: &[MembershipRecord], _actor: &Actor) -> MembershipResult<()> {
        self.enter(StoreOp::Put)?;
        for record in records {
            self.require_table(record.table())?;
        }
        let mut stored = self
            .records
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        for record in records {
            stored.insert(record.id(), record.clone());
        }
        Ok(())
    }

    fn delete_entities(&self, keys: &[EntityKey], _actor: &Actor) -> MembershipResult<()> {
        self.enter(StoreOp::Delete)?;
        let mut stored = self
            .records
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        for key in keys {
            if stored.get(&key.id).map(|r| r.table() == key.table).unwrap_or(false) {
                stored.remove(&key.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::record::FieldBounds;
    use crate::membership::store::{FilterOp, Query};
    use crate::membership::relation::RelationRegistry;
    use crate::observability::MetricsRegistry;
    use std::sync::Arc;

    fn setup() -> (InMemoryRelationStore, Arc<RelationHandle>, Actor) {
        let store = InMemoryRelationStore::new();
        let actor = Actor::system();
        let handle = RelationRegistry::new(FieldBounds::default())
            .assert_relation(&store, &actor, &MetricsRegistry::new())
            .unwrap();
        (store, handle, actor)
    }

    fn make(store: &InMemoryRelationStore, handle: &RelationHandle, actor: &Actor, p: &str, a: &str) -> MembershipRecord {
        let mut d = store.create_entity(handle, actor).unwrap();
        d.set_principal(p).unwrap();
        d.set_authority(a).unwrap();
        d.build().unwrap()
    }

    #[test]
    fn test_put_query_delete() {
        let (store, handle, actor) = setup();
        let r1 = make(&store, &handle, &actor, "uid:alice", "ROLE_USER");
        let r2 = make(&store, &handle, &actor, "uid:bob", "ROLE_USER");
        store.put_entities(&[r1.clone(), r2.clone()], &actor).unwrap();

        let found = Query::new(&store, &handle, &actor)
            .add_filter(Field::Principal, FilterOp::Equal, "uid:alice")
            .execute()
            .unwrap();
        assert_eq!(found, vec![r1.clone()]);

        store.delete_entities(&[r1.key()], &actor).unwrap();
        assert_eq!(store.all_records(), vec![r2]);
    }

    #[test]
    fn test_query_without_relation_fails() {
        let store = InMemoryRelationStore::new();
        let spec = QuerySpec { table: "_user_granted_authority".into(), filters: vec![] };
        let err = store.run_query(&spec, &Actor::system()).unwrap_err();
        assert!(matches!(err, MembershipError::StoreUnavailable(_)));
    }

    #[test]
    fn test_fault_injection_is_one_shot() {
        let (store, handle, actor) = setup();
        store.fail_next(StoreOp::Query);
        let q = Query::new(&store, &handle, &actor);
        assert!(q.execute().is_err());
        assert!(q.execute().is_ok());
        assert_eq!(store.op_count(StoreOp::Query), 2);
    }

    #[test]
    fn test_delete_unknown_key_is_ignored() {
        let (store, _handle, actor) = setup();
        let key = EntityKey::new("_user_granted_authority", RecordId::generate());
        assert!(store.delete_entities(&[key], &actor).is_ok());
    }

    #[test]
    fn test_distinct_values() {
        let (store, handle, actor) = setup();
        let records = vec![
            make(&store, &handle, &actor, "uid:alice", "ROLE_USER"),
            make(&store, &handle, &actor, "uid:alice", "ROLE_DATA_OWNER"),
            make(&store, &handle, &actor, "uid:bob", "ROLE_USER"),
        ];
        store.put_entities(&records, &actor).unwrap();

        let principals = Query::new(&store, &handle, &actor)
            .add_filter(Field::Authority, FilterOp::Equal, "ROLE_USER")
            .execute_distinct_values(Field::Principal)
            .unwrap();
        assert_eq!(principals, vec!["uid:alice".to_string(), "uid:bob".to_string()]);
    }
}
