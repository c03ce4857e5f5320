//! aerogrant - deterministic group-membership reconciliation
//!
//! Principal to granted-authority pairings are never edited in place.
//! Callers state the desired set for one principal or one authority and
//! the reconciler applies the minimal insert/delete delta, invalidating
//! the authorization cache whenever something actually changed.

pub mod cli;
pub mod membership;
pub mod observability;
