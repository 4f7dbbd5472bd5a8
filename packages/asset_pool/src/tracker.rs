//! Cancellation scopes for long-running operations.

use std::cell::{Cell, RefCell};
use std::fmt;

use foldhash::{HashMap, HashMapExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::AssetKey;

/// Owns the cancellation scopes of every prewarm and acquire in flight.
///
/// At most one prewarm runs per key. Acquires are not deduplicated, each gets its own scope.
pub(crate) struct OperationTracker {
    prewarms: RefCell<HashMap<AssetKey, CancellationToken>>,
    acquires: RefCell<HashMap<u64, CancellationToken>>,
    next_acquire: Cell<u64>,
}

impl fmt::Debug for OperationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTracker")
            .field("prewarms", &self.prewarms.borrow().len())
            .field("acquires", &self.acquires.borrow().len())
            .finish_non_exhaustive()
    }
}

impl OperationTracker {
    pub(crate) fn new() -> Self {
        Self {
            prewarms: RefCell::new(HashMap::new()),
            acquires: RefCell::new(HashMap::new()),
            next_acquire: Cell::new(0),
        }
    }

    /// Opens the prewarm scope for `key`, or returns `None` if one is already open.
    ///
    /// The scope stays open until the returned guard is dropped.
    pub(crate) fn start_prewarm(&self, key: &AssetKey) -> Option<PrewarmScope<'_>> {
        let mut prewarms = self.prewarms.borrow_mut();

        if prewarms.contains_key(key) {
            return None;
        }

        let token = CancellationToken::new();
        prewarms.insert(key.clone(), token.clone());

        Some(PrewarmScope {
            tracker: self,
            key: key.clone(),
            token,
        })
    }

    pub(crate) fn is_prewarming(&self, key: &AssetKey) -> bool {
        self.prewarms.borrow().contains_key(key)
    }

    pub(crate) fn prewarming_keys(&self) -> Vec<AssetKey> {
        self.prewarms.borrow().keys().cloned().collect()
    }

    /// Signals the running prewarm for `key`, if any. Returns whether one was running.
    pub(crate) fn cancel_prewarm(&self, key: &AssetKey) -> bool {
        match self.prewarms.borrow().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all_prewarms(&self) {
        let prewarms = self.prewarms.borrow();

        for token in prewarms.values() {
            token.cancel();
        }

        debug!(count = prewarms.len(), "cancelled running prewarms");
    }

    /// Opens a scope for one acquire. The scope stays tracked until the guard is dropped.
    pub(crate) fn track_acquire(&self) -> AcquireScope<'_> {
        let id = self.next_acquire.get();
        self.next_acquire.set(id.wrapping_add(1));

        let token = CancellationToken::new();
        self.acquires.borrow_mut().insert(id, token.clone());

        AcquireScope {
            tracker: self,
            id,
            token,
        }
    }

    pub(crate) fn cancel_all_acquires(&self) {
        let acquires = self.acquires.borrow();

        for token in acquires.values() {
            token.cancel();
        }

        debug!(count = acquires.len(), "cancelled in-flight acquires");
    }

    pub(crate) fn acquires_in_flight(&self) -> usize {
        self.acquires.borrow().len()
    }
}

/// Marks a prewarm as running for one key. Dropping the scope clears the mark.
#[derive(Debug)]
pub(crate) struct PrewarmScope<'a> {
    tracker: &'a OperationTracker,
    key: AssetKey,
    token: CancellationToken,
}

impl PrewarmScope<'_> {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PrewarmScope<'_> {
    fn drop(&mut self) {
        self.tracker.prewarms.borrow_mut().remove(&self.key);
    }
}

/// Tracks one in-flight acquire. Dropping the scope untracks it.
#[derive(Debug)]
pub(crate) struct AcquireScope<'a> {
    tracker: &'a OperationTracker,
    id: u64,
    token: CancellationToken,
}

impl AcquireScope<'_> {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for AcquireScope<'_> {
    fn drop(&mut self) {
        self.tracker.acquires.borrow_mut().remove(&self.id);
    }
}
