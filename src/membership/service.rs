//! # Membership Service
//!
//! Application-owned context for every membership operation. It owns the
//! relation registry and the per-anchor lock table, and holds the store,
//! change notifier, metrics and optional audit log it was built with.
//! Nothing here is process-global; two services never share state.

use std::sync::Arc;

use super::diff::DuplicatePolicy;
use super::errors::{MembershipError, MembershipResult};
use super::locks::AnchorLocks;
use super::names::{Actor, GrantedAuthorityName};
use super::notifier::ChangeNotifier;
use super::record::{FieldBounds, MembershipRecord};
use super::relation::{RelationHandle, RelationRegistry};
use super::store::RelationStore;
use crate::observability::{AuditAction, AuditLog, AuditOutcome, AuditRecord, Event, Logger, MetricsRegistry};

/// Membership configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipConfig {
    /// Authority bootstrapped onto the superuser
    pub admin_authority: String,
    /// Column bounds for new records
    pub bounds: FieldBounds,
    /// Handling of pre-existing duplicate pairings
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            admin_authority: GrantedAuthorityName::AccessAdmin.as_str().to_string(),
            bounds: FieldBounds::default(),
            duplicate_policy: DuplicatePolicy::Preserve,
        }
    }
}

impl MembershipConfig {
    pub fn validate(&self) -> MembershipResult<()> {
        if self.bounds.principal_max_len == 0 || self.bounds.authority_max_len == 0 {
            return Err(MembershipError::Config("field bounds must be > 0".to_string()));
        }
        self.bounds
            .check(super::record::Field::Authority, &self.admin_authority)
            .map_err(|e| MembershipError::Config(format!("admin_authority: {}", e)))
    }
}

/// Membership operations over one store
pub struct MembershipService {
    pub(super) store: Arc<dyn RelationStore>,
    pub(super) notifier: Arc<dyn ChangeNotifier>,
    pub(super) config: MembershipConfig,
    pub(super) registry: RelationRegistry,
    pub(super) locks: AnchorLocks,
    pub(super) metrics: Arc<MetricsRegistry>,
    pub(super) audit: Option<Arc<dyn AuditLog>>,
}

impl MembershipService {
    pub fn new(
        store: Arc<dyn RelationStore>,
        notifier: Arc<dyn ChangeNotifier>,
        config: MembershipConfig,
    ) -> MembershipResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            notifier,
            registry: RelationRegistry::new(config.bounds),
            config,
            locks: AnchorLocks::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            audit: None,
        })
    }

    /// Share an existing metrics registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Record every applied mutation in `audit`
    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Per-anchor locks; callers composing several operations may hold one
    pub fn locks(&self) -> &AnchorLocks {
        &self.locks
    }

    /// The relation handle, creating the relation on first use
    pub fn relation(&self, actor: &Actor) -> MembershipResult<Arc<RelationHandle>> {
        self.registry
            .assert_relation(self.store.as_ref(), actor, &self.metrics)
    }

    /// Append one audit record per applied mutation; failures are logged only
    pub(super) fn audit(&self, actor: &Actor, action: AuditAction, records: &[MembershipRecord]) {
        self.append_audit(actor, action, records, None);
    }

    /// Audit a rejected store mutation, handing the error back
    pub(super) fn audit_failure(
        &self,
        actor: &Actor,
        action: AuditAction,
        records: &[MembershipRecord],
        error: MembershipError,
    ) -> MembershipError {
        self.append_audit(actor, action, records, Some(&error));
        error
    }

    fn append_audit(
        &self,
        actor: &Actor,
        action: AuditAction,
        records: &[MembershipRecord],
        error: Option<&MembershipError>,
    ) {
        let Some(audit) = self.audit.as_ref() else {
            return;
        };
        for record in records {
            let mut entry = match error {
                None => AuditRecord::new(action, AuditOutcome::Success),
                Some(e) => AuditRecord::new(action, AuditOutcome::Failed).with_error(e.to_string()),
            };
            entry = entry.with_operator(actor.id()).with_membership(record);
            if let Err(e) = audit.append(&entry) {
                let reason = e.to_string();
                Logger::warn(
                    Event::AuditAppendFailed.as_str(),
                    &[("action", action.as_str()), ("reason", reason.as_str())],
                );
            }
        }
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Records created
    pub inserted: Vec<MembershipRecord>,
    /// Records removed
    pub deleted: Vec<MembershipRecord>,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || !self.deleted.is_empty()
    }
}

/// Result of a superuser bootstrap
#[derive(Debug, Clone, Default)]
pub struct BootstrapOutcome {
    /// Former holders of the admin authority that were removed
    pub stale_removed: Vec<MembershipRecord>,
    /// The superuser's new admin record, when one was missing
    pub inserted: Option<MembershipRecord>,
}

impl BootstrapOutcome {
    pub fn changed(&self) -> bool {
        !self.stale_removed.is_empty() || self.inserted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::memory::InMemoryRelationStore;
    use crate::membership::notifier::CountingNotifier;

    #[test]
    fn test_default_config_is_valid() {
        let config = MembershipConfig::default();
        assert_eq!(config.admin_authority, "ROLE_ACCESS_ADMIN");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_authority_must_fit_bound() {
        let config = MembershipConfig {
            admin_authority: "A".repeat(81),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MembershipError::Config(_))));
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let config = MembershipConfig {
            bounds: FieldBounds {
                principal_max_len: 0,
                authority_max_len: 80,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_services_do_not_share_relation_state() {
        let store = Arc::new(InMemoryRelationStore::new());
        let notifier = Arc::new(CountingNotifier::new());
        let a = MembershipService::new(store.clone(), notifier.clone(), MembershipConfig::default()).unwrap();
        let b = MembershipService::new(store.clone(), notifier, MembershipConfig::default()).unwrap();

        a.relation(&Actor::system()).unwrap();
        assert!(a.registry.is_initialized());
        assert!(!b.registry.is_initialized());
    }
}
