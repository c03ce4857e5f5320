//! Per-anchor mutual exclusion
//!
//! Two reconciliations against the same anchor must not interleave their
//! read-diff-apply cycles. Each call holds an [`AnchorGuard`] for its
//! anchor; calls on different anchors proceed in parallel.
//!
//! Principal and authority anchors are distinct keys. A call anchored on a
//! principal is not serialized against one anchored on an authority.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use super::names::Anchor;

/// Set of anchors currently held
#[derive(Debug, Default)]
pub struct AnchorLocks {
    held: Mutex<HashSet<Anchor>>,
    released: Condvar,
}

impl AnchorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `anchor` is free, then hold it until the guard drops
    pub fn acquire(&self, anchor: &Anchor) -> AnchorGuard<'_> {
        let mut held = self.lock_set();
        while held.contains(anchor) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(anchor.clone());

        AnchorGuard {
            locks: self,
            anchor: anchor.clone(),
        }
    }

    /// Hold `anchor` only if nobody else does
    pub fn try_acquire(&self, anchor: &Anchor) -> Option<AnchorGuard<'_>> {
        let mut held = self.lock_set();
        if !held.insert(anchor.clone()) {
            return None;
        }
        Some(AnchorGuard {
            locks: self,
            anchor: anchor.clone(),
        })
    }

    pub fn is_held(&self, anchor: &Anchor) -> bool {
        self.lock_set().contains(anchor)
    }

    // The set guards no data of its own; a panic while holding it leaves it consistent.
    fn lock_set(&self) -> MutexGuard<'_, HashSet<Anchor>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive hold on one anchor
#[derive(Debug)]
pub struct AnchorGuard<'a> {
    locks: &'a AnchorLocks,
    anchor: Anchor,
}

impl Drop for AnchorGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.lock_set();
        held.remove(&self.anchor);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_anchor_is_exclusive() {
        let locks = AnchorLocks::new();
        let anchor = Anchor::principal("uid:alice");

        let guard = locks.acquire(&anchor);
        assert!(locks.is_held(&anchor));
        assert!(locks.try_acquire(&anchor).is_none());

        drop(guard);
        assert!(!locks.is_held(&anchor));
        assert!(locks.try_acquire(&anchor).is_some());
    }

    #[test]
    fn test_different_anchors_are_independent() {
        let locks = AnchorLocks::new();
        let _a = locks.acquire(&Anchor::principal("uid:alice"));
        let _b = locks.acquire(&Anchor::principal("uid:bob"));
        let _c = locks.acquire(&Anchor::authority("uid:alice"));
        assert!(locks.is_held(&Anchor::authority("uid:alice")));
    }

    #[test]
    fn test_waiters_never_overlap() {
        let locks = Arc::new(AnchorLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire(&Anchor::authority("ROLE_USER"));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
