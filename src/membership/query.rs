//! Read-only membership lookups
//!
//! Every lookup returns an empty collection, never an error, when nothing
//! matches. Store failures propagate.

use std::collections::BTreeSet;

use super::errors::MembershipResult;
use super::names::Actor;
use super::record::{Field, MembershipRecord};
use super::service::MembershipService;
use super::store::{FilterOp, Query};

impl MembershipService {
    /// All records whose `filter_field` equals `filter_value`
    pub fn lookup(
        &self,
        actor: &Actor,
        filter_field: Field,
        filter_value: &str,
    ) -> MembershipResult<Vec<MembershipRecord>> {
        let relation = self.relation(actor)?;
        Query::new(self.store.as_ref(), &relation, actor)
            .add_filter(filter_field, FilterOp::Equal, filter_value)
            .execute()
    }

    /// Distinct values of `field` over records whose `filter_field` equals `filter_value`
    pub fn distinct_values(
        &self,
        actor: &Actor,
        field: Field,
        filter_field: Field,
        filter_value: &str,
    ) -> MembershipResult<BTreeSet<String>> {
        let relation = self.relation(actor)?;
        let values = Query::new(self.store.as_ref(), &relation, actor)
            .add_filter(filter_field, FilterOp::Equal, filter_value)
            .execute_distinct_values(field)?;
        Ok(values.into_iter().collect())
    }

    /// Authorities directly granted to `principal`
    pub fn granted_authorities(&self, actor: &Actor, principal: &str) -> MembershipResult<BTreeSet<String>> {
        self.distinct_values(actor, Field::Authority, Field::Principal, principal)
    }

    /// Principals holding `authority`
    pub fn principals_with_authority(&self, actor: &Actor, authority: &str) -> MembershipResult<BTreeSet<String>> {
        self.distinct_values(actor, Field::Principal, Field::Authority, authority)
    }

    /// Whether `principal` holds `authority`
    pub fn has_authority(&self, actor: &Actor, principal: &str, authority: &str) -> MembershipResult<bool> {
        Ok(self
            .lookup(actor, Field::Principal, principal)?
            .iter()
            .any(|r| r.authority() == authority))
    }
}
