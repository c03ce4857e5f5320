//! # Membership Subsystem
//!
//! Principal to granted-authority pairings, stored as one record per
//! pairing in the `_user_granted_authority` relation.
//!
//! Writers never edit records in place. They state the full desired set of
//! subjects for one anchor (a principal or an authority) and the reconciler
//! computes and applies the minimal insert/delete delta. Every applied
//! change invalidates the authorization cache.
//!
//! ## Components
//!
//! - [`MembershipService`]: owns the relation registry and anchor locks
//! - [`RelationStore`]: storage seam, with in-memory and file-backed stores
//! - [`ChangeNotifier`]: cache invalidation hook
//! - [`MembershipDiff`]: the pure set difference

mod bootstrap;
mod diff;
mod errors;
mod file;
mod locks;
mod memory;
mod names;
mod notifier;
mod query;
mod reconciler;
mod record;
mod relation;
mod service;
mod store;

pub use diff::{DuplicatePolicy, MembershipDiff};
pub use errors::{MembershipError, MembershipResult, NotifierError};
pub use file::FileRelationStore;
pub use locks::{AnchorGuard, AnchorLocks};
pub use memory::{InMemoryRelationStore, StoreOp};
pub use names::{Actor, Anchor, GrantedAuthorityName};
pub use notifier::{
    invalidate_best_effort, ChangeNotifier, CountingNotifier, GrantedAuthorityCache, NotifyOnExit,
};
pub use record::{EntityKey, Field, FieldBounds, MembershipDraft, MembershipRecord, RecordId};
pub use relation::{RelationDescriptor, RelationHandle, RelationRegistry, MEMBERSHIP_TABLE};
pub use service::{BootstrapOutcome, MembershipConfig, MembershipService, ReconcileOutcome};
pub use store::{Filter, FilterOp, Query, QuerySpec, RelationStore};
