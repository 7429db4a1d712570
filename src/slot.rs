//! Single-item handoff between two pipeline threads.
//!
//! `SyncSlot` holds at most one item. Publishing over an unconsumed item
//! replaces it: only the freshest frame matters downstream, so a slow consumer
//! sees the latest item rather than a growing backlog. Replaced items are
//! dropped without notice.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct SlotState<T> {
    item: Option<T>,
    closed: bool,
    replaced: u64,
}

/// Overwrite-on-arrival slot with condition signaling.
pub struct SyncSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> SyncSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                item: None,
                closed: false,
                replaced: 0,
            }),
            ready: Condvar::new(),
        }
    }

    // State is a plain Option and stays consistent across a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `item`, discarding any unconsumed one, and wake one waiter.
    ///
    /// Returns false (and drops `item`) once the slot is closed.
    pub fn publish(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.item.replace(item).is_some() {
            state.replaced += 1;
        }
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Block until an item is available, then take it and clear the slot.
    ///
    /// Returns `None` once the slot is closed, even if an item is pending.
    pub fn take_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.item.take() {
                return Some(item);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the pending item without blocking.
    pub fn try_take(&self) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.item.take()
    }

    /// Close the slot and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.item = None;
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items discarded by a later `publish`.
    pub fn replaced(&self) -> u64 {
        self.lock().replaced
    }
}

impl<T> Default for SyncSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
