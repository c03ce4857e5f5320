//! # Superuser Bootstrap
//!
//! Run once at startup: the configured superuser must hold the admin
//! authority and nobody else may. Former holders are revoked and the
//! superuser's record is created when missing.
//!
//! The notifier is invalidated only when something changed.

use super::diff::DuplicatePolicy;
use super::errors::MembershipResult;
use super::names::{Actor, Anchor};
use super::notifier::NotifyOnExit;
use super::record::{Field, MembershipRecord};
use super::service::{BootstrapOutcome, MembershipService};
use super::store::{FilterOp, Query};
use crate::observability::{AuditAction, Event, Logger, ObservationScope};

impl MembershipService {
    /// Make `superuser` the sole holder of the configured admin authority
    pub fn ensure_superuser_admin(
        &self,
        actor: &Actor,
        superuser: &str,
    ) -> MembershipResult<BootstrapOutcome> {
        let admin = self.config.admin_authority.clone();
        let anchor = Anchor::authority(admin.as_str());
        let _serial = self.locks.acquire(&anchor);

        self.metrics.increment_bootstrap_runs();
        let scope = ObservationScope::with_fields(
            "BOOTSTRAP",
            &[("superuser", superuser), ("authority", admin.as_str())],
        );

        let result = self.bootstrap_locked(actor, &admin, superuser);
        match &result {
            Ok(outcome) => {
                let removed = outcome.stale_removed.len().to_string();
                let inserted = if outcome.inserted.is_some() { "1" } else { "0" };
                scope.complete_with_fields(&[("stale_removed", removed.as_str()), ("inserted", inserted)]);
            }
            Err(e) => {
                let reason = e.to_string();
                scope.fail(&reason);
            }
        }
        result
    }

    fn bootstrap_locked(
        &self,
        actor: &Actor,
        admin: &str,
        superuser: &str,
    ) -> MembershipResult<BootstrapOutcome> {
        let relation = self.relation(actor)?;
        let holders = Query::new(self.store.as_ref(), &relation, actor)
            .add_filter(Field::Authority, FilterOp::Equal, admin)
            .execute()?;

        let mut superuser_held = false;
        let mut stale: Vec<MembershipRecord> = Vec::new();
        for record in holders {
            if record.principal() != superuser {
                stale.push(record);
            } else if superuser_held && self.config.duplicate_policy == DuplicatePolicy::Collapse {
                stale.push(record);
            } else {
                superuser_held = true;
            }
        }

        let insert = if superuser_held {
            None
        } else {
            Some(self.new_record(&relation, actor, superuser, admin)?)
        };

        let mut notify = NotifyOnExit::disarmed(self.notifier.as_ref(), &self.metrics, "bootstrap");

        if !stale.is_empty() {
            notify.arm();
            let keys: Vec<_> = stale.iter().map(|r| r.key()).collect();
            self.store
                .delete_entities(&keys, actor)
                .map_err(|e| self.audit_failure(actor, AuditAction::MembershipRevoked, &stale, e))?;

            self.metrics.add_stale_admins_removed(stale.len() as u64);
            for record in &stale {
                Logger::warn(
                    Event::StaleAdminRemoved.as_str(),
                    &[("principal", record.principal()), ("authority", admin)],
                );
            }
            self.record_applied(actor, Event::MembershipRevoked, AuditAction::MembershipRevoked, &stale);
        }

        if let Some(record) = &insert {
            notify.arm();
            let batch = std::slice::from_ref(record);
            self.store
                .put_entities(batch, actor)
                .map_err(|e| self.audit_failure(actor, AuditAction::SuperuserBootstrapped, batch, e))?;
            self.record_applied(actor, Event::MembershipGranted, AuditAction::SuperuserBootstrapped, batch);
        }

        Ok(BootstrapOutcome {
            stale_removed: stale,
            inserted: insert,
        })
    }
}
