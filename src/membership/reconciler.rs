//! # Reconciler
//!
//! Makes the stored pairings for one anchor match a desired set of subjects.
//!
//! Each call reads the anchor's records once, diffs them against an owned
//! snapshot of the desired set, then submits insertions and deletions. No
//! mutation is issued before the read completes. The change notifier fires
//! exactly once iff a non-empty mutation was submitted, whether or not the
//! submission succeeded.
//!
//! ## Invariants
//! - Insertions are `desired \ existing`, deletions `existing \ desired`
//! - Equal sets issue no mutation and no notification
//! - Calls on the same anchor are serialized by [`AnchorLocks`]
//!
//! [`AnchorLocks`]: super::locks::AnchorLocks

use std::collections::{BTreeSet, HashSet};

use super::diff::MembershipDiff;
use super::errors::MembershipResult;
use super::names::{Actor, Anchor};
use super::notifier::NotifyOnExit;
use super::record::{MembershipRecord, RecordId};
use super::relation::RelationHandle;
use super::service::{MembershipService, ReconcileOutcome};
use super::store::{FilterOp, Query};
use crate::observability::{AuditAction, Event, Logger, ObservationScope};

impl MembershipService {
    /// Make `principal` hold exactly `desired_authorities`
    pub fn reconcile_authorities_for_principal<I, S>(
        &self,
        actor: &Actor,
        principal: &str,
        desired_authorities: I,
    ) -> MembershipResult<ReconcileOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let desired = snapshot(desired_authorities);
        self.reconcile(actor, Anchor::principal(principal), &desired)
    }

    /// Make `authority` held by exactly `desired_principals`
    pub fn reconcile_principals_for_authority<I, S>(
        &self,
        actor: &Actor,
        authority: &str,
        desired_principals: I,
    ) -> MembershipResult<ReconcileOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let desired = snapshot(desired_principals);
        self.reconcile(actor, Anchor::authority(authority), &desired)
    }

    /// Reconcile the subjects paired with `anchor` against `desired`
    pub fn reconcile(
        &self,
        actor: &Actor,
        anchor: Anchor,
        desired: &BTreeSet<String>,
    ) -> MembershipResult<ReconcileOutcome> {
        let _serial = self.locks.acquire(&anchor);

        let scope = ObservationScope::with_fields(
            "RECONCILE",
            &[("anchor_field", anchor.field().column_name()), ("anchor", anchor.value())],
        );

        let result = self.reconcile_locked(actor, &anchor, desired);
        match &result {
            Ok(outcome) => {
                let inserted = outcome.inserted.len().to_string();
                let deleted = outcome.deleted.len().to_string();
                scope.complete_with_fields(&[
                    ("inserted", inserted.as_str()),
                    ("deleted", deleted.as_str()),
                ]);
            }
            Err(e) => {
                self.metrics.increment_reconcile_failures();
                let reason = e.to_string();
                scope.fail(&reason);
            }
        }
        result
    }

    fn reconcile_locked(
        &self,
        actor: &Actor,
        anchor: &Anchor,
        desired: &BTreeSet<String>,
    ) -> MembershipResult<ReconcileOutcome> {
        self.metrics.increment_reconciliations();

        let relation = self.relation(actor)?;
        let existing = Query::new(self.store.as_ref(), &relation, actor)
            .add_filter(anchor.field(), FilterOp::Equal, anchor.value())
            .execute()?;

        let diff = MembershipDiff::compute(anchor, &existing, desired, self.config.duplicate_policy);
        if diff.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        // Construction errors abort here, before anything is submitted.
        let mut inserted = Vec::with_capacity(diff.to_insert.len());
        for subject in &diff.to_insert {
            let (principal, authority) = anchor.pair_with(subject);
            inserted.push(self.new_record(&relation, actor, principal, authority)?);
        }

        let doomed: HashSet<RecordId> = diff.to_delete.iter().map(|k| k.id).collect();
        let deleted: Vec<MembershipRecord> = existing
            .into_iter()
            .filter(|r| doomed.contains(&r.id()))
            .collect();

        let _notify = NotifyOnExit::armed(self.notifier.as_ref(), &self.metrics, "reconcile");

        if !inserted.is_empty() {
            self.store
                .put_entities(&inserted, actor)
                .map_err(|e| self.audit_failure(actor, AuditAction::MembershipGranted, &inserted, e))?;
            self.record_applied(actor, Event::MembershipGranted, AuditAction::MembershipGranted, &inserted);
        }
        if !diff.to_delete.is_empty() {
            self.store
                .delete_entities(&diff.to_delete, actor)
                .map_err(|e| self.audit_failure(actor, AuditAction::MembershipRevoked, &deleted, e))?;
            self.record_applied(actor, Event::MembershipRevoked, AuditAction::MembershipRevoked, &deleted);
        }

        Ok(ReconcileOutcome { inserted, deleted })
    }

    /// Remove every record of `principal`, then always invalidate
    ///
    /// Used when a principal itself is being removed, so the notifier fires
    /// even if the principal held nothing or the store failed.
    pub fn delete_all_for_principal(
        &self,
        actor: &Actor,
        principal: &str,
    ) -> MembershipResult<Vec<MembershipRecord>> {
        let anchor = Anchor::principal(principal);
        let _serial = self.locks.acquire(&anchor);
        let _notify = NotifyOnExit::armed(self.notifier.as_ref(), &self.metrics, "purge");

        let relation = self.relation(actor)?;
        let records = Query::new(self.store.as_ref(), &relation, actor)
            .add_filter(anchor.field(), FilterOp::Equal, anchor.value())
            .execute()?;

        if !records.is_empty() {
            let keys: Vec<_> = records.iter().map(|r| r.key()).collect();
            self.store
                .delete_entities(&keys, actor)
                .map_err(|e| self.audit_failure(actor, AuditAction::PrincipalPurged, &records, e))?;
            self.record_applied(actor, Event::PrincipalPurged, AuditAction::PrincipalPurged, &records);
        }

        Ok(records)
    }

    /// Allocate and fill a record for `(principal, authority)`
    pub(super) fn new_record(
        &self,
        relation: &RelationHandle,
        actor: &Actor,
        principal: &str,
        authority: &str,
    ) -> MembershipResult<MembershipRecord> {
        let mut draft = self.store.create_entity(relation, actor)?;
        draft.set_principal(principal)?;
        draft.set_authority(authority)?;
        draft.build()
    }

    /// Count, log and audit mutations the store accepted
    pub(super) fn record_applied(
        &self,
        actor: &Actor,
        event: Event,
        action: AuditAction,
        records: &[MembershipRecord],
    ) {
        match action {
            AuditAction::MembershipGranted | AuditAction::SuperuserBootstrapped => {
                self.metrics.add_records_inserted(records.len() as u64)
            }
            _ => self.metrics.add_records_deleted(records.len() as u64),
        }

        for record in records {
            Logger::info(
                event.as_str(),
                &[
                    ("actor", actor.id()),
                    ("authority", record.authority()),
                    ("principal", record.principal()),
                ],
            );
        }

        self.audit(actor, action, records);
    }
}

/// Owned, deduplicated copy of caller input
fn snapshot<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values.into_iter().map(|v| v.as_ref().to_string()).collect()
}
