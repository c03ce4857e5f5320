//! # Change Notification
//!
//! Authorization caches must be invalidated whenever membership actually
//! changes. [`NotifyOnExit`] is armed once a mutation is about to be
//! submitted and fires exactly once when it goes out of scope, on the
//! success path and on every error path alike.
//!
//! Notifier failures are logged and counted; they never fail the caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use super::errors::{MembershipResult, NotifierError};
use crate::observability::{Event, Logger, MetricsRegistry};

/// Process-wide authorization cache hook
pub trait ChangeNotifier: Send + Sync {
    /// Drop everything derived from membership state
    fn invalidate(&self) -> Result<(), NotifierError>;
}

/// Invoke `notifier`, logging instead of returning failures
pub fn invalidate_best_effort(notifier: &dyn ChangeNotifier, metrics: &MetricsRegistry, origin: &str) {
    match notifier.invalidate() {
        Ok(()) => {
            metrics.increment_invalidations();
            Logger::info(Event::PermissionsInvalidated.as_str(), &[("origin", origin)]);
        }
        Err(e) => {
            metrics.increment_invalidation_failures();
            Logger::warn(
                Event::PermissionsInvalidationFailed.as_str(),
                &[("origin", origin), ("reason", e.message())],
            );
        }
    }
}

/// Scope guard that invalidates the notifier on drop when armed
pub struct NotifyOnExit<'a> {
    notifier: &'a dyn ChangeNotifier,
    metrics: &'a MetricsRegistry,
    origin: &'a str,
    armed: bool,
}

impl<'a> NotifyOnExit<'a> {
    /// Guard that fires only once [`arm`](Self::arm) is called
    pub fn disarmed(notifier: &'a dyn ChangeNotifier, metrics: &'a MetricsRegistry, origin: &'a str) -> Self {
        Self {
            notifier,
            metrics,
            origin,
            armed: false,
        }
    }

    /// Guard that fires unconditionally
    pub fn armed(notifier: &'a dyn ChangeNotifier, metrics: &'a MetricsRegistry, origin: &'a str) -> Self {
        let mut guard = Self::disarmed(notifier, metrics, origin);
        guard.arm();
        guard
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for NotifyOnExit<'_> {
    fn drop(&mut self) {
        if self.armed {
            invalidate_best_effort(self.notifier, self.metrics, self.origin);
        }
    }
}

/// Memoized principal -> granted authorities, cleared on every change
///
/// A load that raced an invalidation is returned but not cached.
#[derive(Debug, Default)]
pub struct GrantedAuthorityCache {
    entries: RwLock<HashMap<String, BTreeSet<String>>>,
    generation: AtomicU64,
}

impl GrantedAuthorityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached authorities for `principal`, loading them on a miss
    pub fn get_or_load<F>(&self, principal: &str, load: F) -> MembershipResult<BTreeSet<String>>
    where
        F: FnOnce() -> MembershipResult<BTreeSet<String>>,
    {
        if let Ok(entries) = self.entries.read() {
            if let Some(hit) = entries.get(principal) {
                return Ok(hit.clone());
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = load()?;

        if let Ok(mut entries) = self.entries.write() {
            if self.generation.load(Ordering::Acquire) == generation {
                entries.insert(principal.to_string(), loaded.clone());
            }
        }
        Ok(loaded)
    }

    pub fn is_cached(&self, principal: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(principal))
            .unwrap_or(false)
    }

    /// Number of invalidations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl ChangeNotifier for GrantedAuthorityCache {
    fn invalidate(&self) -> Result<(), NotifierError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| NotifierError::new("authority cache lock poisoned"))?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        Ok(())
    }
}

/// Notifier that only counts, optionally failing every call
#[derive(Debug, Default)]
pub struct CountingNotifier {
    calls: AtomicU64,
    failing: AtomicBool,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call fails (after being counted)
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::Relaxed);
        notifier
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ChangeNotifier for CountingNotifier {
    fn invalidate(&self) -> Result<(), NotifierError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(NotifierError::new("permissions reload unavailable"));
        }
        Ok(())
    }
}
