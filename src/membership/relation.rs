//! # Relation Handle
//!
//! The membership table must exist before any record is read or written.
//! [`RelationRegistry::assert_relation`] creates it on first use and hands
//! out the same [`RelationHandle`] afterwards.
//!
//! ## Invariants
//! - Concurrent first callers observe exactly one creation
//! - A failed creation caches nothing; the next call tries again
//! - The registry is owned by the service, never a process global

use std::sync::{Arc, Mutex};

use super::errors::{MembershipError, MembershipResult};
use super::names::Actor;
use super::record::{Field, FieldBounds};
use super::store::RelationStore;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Table name of the membership relation
pub const MEMBERSHIP_TABLE: &str = "_user_granted_authority";

/// Schema of the membership relation, as handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub bounds: FieldBounds,
}

impl RelationDescriptor {
    pub fn membership(schema_name: impl Into<String>, bounds: FieldBounds) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: MEMBERSHIP_TABLE.to_string(),
            bounds,
        }
    }

    /// Only the principal column is indexed
    pub fn is_indexed(&self, field: Field) -> bool {
        matches!(field, Field::Id | Field::Principal)
    }

    /// `schema.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// Proof that the membership relation exists and is ready
#[derive(Debug)]
pub struct RelationHandle {
    descriptor: RelationDescriptor,
}

impl RelationHandle {
    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    pub fn table_name(&self) -> &str {
        &self.descriptor.table_name
    }

    pub fn bounds(&self) -> FieldBounds {
        self.descriptor.bounds
    }
}

/// Creates the relation once and caches the handle
#[derive(Debug)]
pub struct RelationRegistry {
    bounds: FieldBounds,
    slot: Mutex<Option<Arc<RelationHandle>>>,
}

impl RelationRegistry {
    pub fn new(bounds: FieldBounds) -> Self {
        Self {
            bounds,
            slot: Mutex::new(None),
        }
    }

    /// Return the handle, creating the relation in `store` on first call.
    ///
    /// The slot lock is held across the store call so a second first-caller
    /// waits and then sees the cached handle.
    pub fn assert_relation(
        &self,
        store: &dyn RelationStore,
        actor: &Actor,
        metrics: &MetricsRegistry,
    ) -> MembershipResult<Arc<RelationHandle>> {
        let mut slot = self.slot.lock().map_err(|_| {
            MembershipError::RelationInit(Box::new(MembershipError::store(
                "relation registry lock poisoned",
            )))
        })?;

        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let descriptor = RelationDescriptor::membership(store.default_schema_name(), self.bounds);
        store
            .assert_relation(&descriptor, actor)
            .map_err(|e| MembershipError::RelationInit(Box::new(e)))?;

        let qualified = descriptor.qualified_name();
        let handle = Arc::new(RelationHandle { descriptor });
        *slot = Some(Arc::clone(&handle));

        metrics.increment_relation_inits();
        log_event_with_fields(Event::RelationAsserted, &[("relation", qualified.as_str())]);

        Ok(handle)
    }

    /// Whether a handle has been cached
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}
