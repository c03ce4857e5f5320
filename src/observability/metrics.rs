//! Membership metrics
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Atomic, lock-free increments

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one membership service
///
/// Relaxed ordering throughout; counters are not used for synchronization.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Reconcile calls that reached the store
    reconciliations: AtomicU64,
    /// Reconcile calls that returned an error
    reconcile_failures: AtomicU64,
    /// Records inserted by any operation
    records_inserted: AtomicU64,
    /// Records deleted by any operation
    records_deleted: AtomicU64,
    /// Successful change notifications
    invalidations: AtomicU64,
    /// Failed change notifications
    invalidation_failures: AtomicU64,
    /// Superuser bootstrap runs
    bootstrap_runs: AtomicU64,
    /// Former admins revoked by bootstrap
    stale_admins_removed: AtomicU64,
    /// First-time relation creations
    relation_inits: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Reconciliation

    pub fn increment_reconciliations(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconcile_failures(&self) {
        self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconciliations(&self) -> u64 {
        self.reconciliations.load(Ordering::Relaxed)
    }

    pub fn reconcile_failures(&self) -> u64 {
        self.reconcile_failures.load(Ordering::Relaxed)
    }

    // Records

    pub fn add_records_inserted(&self, count: u64) {
        self.records_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_records_deleted(&self, count: u64) {
        self.records_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records_inserted(&self) -> u64 {
        self.records_inserted.load(Ordering::Relaxed)
    }

    pub fn records_deleted(&self) -> u64 {
        self.records_deleted.load(Ordering::Relaxed)
    }

    // Notification

    pub fn increment_invalidations(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invalidation_failures(&self) {
        self.invalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn invalidation_failures(&self) -> u64 {
        self.invalidation_failures.load(Ordering::Relaxed)
    }

    // Bootstrap

    pub fn increment_bootstrap_runs(&self) {
        self.bootstrap_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stale_admins_removed(&self, count: u64) {
        self.stale_admins_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bootstrap_runs(&self) -> u64 {
        self.bootstrap_runs.load(Ordering::Relaxed)
    }

    pub fn stale_admins_removed(&self) -> u64 {
        self.stale_admins_removed.load(Ordering::Relaxed)
    }

    // Relation

    pub fn increment_relation_inits(&self) {
        self.relation_inits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relation_inits(&self) -> u64 {
        self.relation_inits.load(Ordering::Relaxed)
    }

    /// Current values as one JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"reconciliations":{},"reconcile_failures":{},"records_inserted":{},"records_deleted":{},"invalidations":{},"invalidation_failures":{},"bootstrap_runs":{},"stale_admins_removed":{},"relation_inits":{}}}"#,
            s.reconciliations,
            s.reconcile_failures,
            s.records_inserted,
            s.records_deleted,
            s.invalidations,
            s.invalidation_failures,
            s.bootstrap_runs,
            s.stale_admins_removed,
            s.relation_inits,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconciliations: self.reconciliations(),
            reconcile_failures: self.reconcile_failures(),
            records_inserted: self.records_inserted(),
            records_deleted: self.records_deleted(),
            invalidations: self.invalidations(),
            invalidation_failures: self.invalidation_failures(),
            bootstrap_runs: self.bootstrap_runs(),
            stale_admins_removed: self.stale_admins_removed(),
            relation_inits: self.relation_inits(),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reconciliations: u64,
    pub reconcile_failures: u64,
    pub records_inserted: u64,
    pub records_deleted: u64,
    pub invalidations: u64,
    pub invalidation_failures: u64,
    pub bootstrap_runs: u64,
    pub stale_admins_removed: u64,
    pub relation_inits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let registry = MetricsRegistry::new();
        registry.increment_reconciliations();
        registry.increment_reconciliations();
        registry.increment_reconcile_failures();
        registry.add_records_inserted(3);
        registry.add_records_deleted(2);
        registry.increment_invalidations();
        registry.increment_invalidation_failures();
        registry.increment_bootstrap_runs();
        registry.add_stale_admins_removed(4);
        registry.increment_relation_inits();

        let s = registry.snapshot();
        assert_eq!(s.reconciliations, 2);
        assert_eq!(s.reconcile_failures, 1);
        assert_eq!(s.records_inserted, 3);
        assert_eq!(s.records_deleted, 2);
        assert_eq!(s.invalidations, 1);
        assert_eq!(s.invalidation_failures, 1);
        assert_eq!(s.bootstrap_runs, 1);
        assert_eq!(s.stale_admins_removed, 4);
        assert_eq!(s.relation_inits, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_records_inserted(12);
        registry.increment_reconciliations();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["records_inserted"], 12);
        assert_eq!(parsed["reconciliations"], 1);
        assert_eq!(parsed["relation_inits"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_invalidations();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.invalidations(), 800);
    }
}
