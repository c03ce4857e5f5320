//! Observable membership events
//!
//! Events are explicit and typed. Scoped operations (`RECONCILE`,
//! `BOOTSTRAP`) log their `_BEGIN`/`_COMPLETE`/`_FAILED` lines through
//! [`ObservationScope`](super::ObservationScope) instead.

use std::fmt;

/// Observable events in aerogrant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// Relation log replayed and open
    StoreOpened,
    /// Membership relation created or confirmed
    RelationAsserted,

    // Membership changes
    /// One record inserted
    MembershipGranted,
    /// One record deleted by reconciliation
    MembershipRevoked,
    /// One record deleted because its principal is gone
    PrincipalPurged,
    /// A former admin holder was revoked during bootstrap
    StaleAdminRemoved,

    // Notification
    /// Authorization cache invalidated
    PermissionsInvalidated,
    /// Authorization cache invalidation failed (not propagated)
    PermissionsInvalidationFailed,

    // Audit
    /// Audit record could not be appended
    AuditAppendFailed,

    // Storage
    /// Relation log failed checksum or parse (FATAL)
    StoreCorruption,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StoreOpened => "STORE_OPENED",
            Event::RelationAsserted => "RELATION_ASSERTED",

            Event::MembershipGranted => "MEMBERSHIP_GRANTED",
            Event::MembershipRevoked => "MEMBERSHIP_REVOKED",
            Event::PrincipalPurged => "PRINCIPAL_PURGED",
            Event::StaleAdminRemoved => "STALE_ADMIN_REMOVED",

            Event::PermissionsInvalidated => "PERMISSIONS_INVALIDATED",
            Event::PermissionsInvalidationFailed => "PERMISSIONS_INVALIDATION_FAILED",

            Event::AuditAppendFailed => "AUDIT_APPEND_FAILED",

            Event::StoreCorruption => "STORE_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StoreCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::StoreOpened,
            Event::RelationAsserted,
            Event::MembershipGranted,
            Event::MembershipRevoked,
            Event::PrincipalPurged,
            Event::StaleAdminRemoved,
            Event::PermissionsInvalidated,
            Event::PermissionsInvalidationFailed,
            Event::AuditAppendFailed,
            Event::StoreCorruption,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::StoreCorruption.is_fatal());
        assert!(!Event::MembershipGranted.is_fatal());
        assert!(!Event::PermissionsInvalidationFailed.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::RelationAsserted), "RELATION_ASSERTED");
        assert_eq!(format!("{}", Event::StaleAdminRemoved), "STALE_ADMIN_REMOVED");
    }
}
