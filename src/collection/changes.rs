//! ChangeTracker — bounded log of a collection's mutations plus listeners.
//!
//! The log is a ring buffer: once `capacity` changes are held, appending
//! evicts the oldest. Listeners are stored as `Arc<dyn Fn(&Change)>` so the
//! list can be snapshotted cheaply before notifying:
//!   - A listener removed *during* notification is still called that round.
//!   - A listener added *during* notification is NOT called until the next.
//!
//! Listeners run synchronously, in registration order, on the thread that
//! performed the mutation. A panicking listener is caught and logged; the
//! remaining listeners still run and the mutation is unaffected.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Change;

/// Default ring-buffer capacity.
pub const DEFAULT_CHANGE_CAPACITY: usize = 16;

/// A listener ID returned by [`ChangeTracker::on`] that can be passed to
/// [`ChangeTracker::off`] to remove the listener.
pub type ListenerId = u64;

/// Closure type for change listeners.
pub type ListenerFn = dyn Fn(&Change) + Send + Sync;

pub struct ChangeTracker {
    collection: String,
    capacity: usize,
    buffer: Mutex<VecDeque<Change>>,
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn>)>>,
    next_id: AtomicU64,
}

impl ChangeTracker {
    pub fn new(collection: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            collection: collection.into(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register `callback` and return its [`ListenerId`].
    pub fn on(&self, callback: impl Fn(&Change) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove the listener identified by `id`. Safe to call repeatedly.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Append `change`, evicting the oldest when full, then notify listeners.
    pub fn add_change(&self, change: Change) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(change.clone());
        }

        let snapshot: Vec<(ListenerId, Arc<ListenerFn>)> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, cb) in snapshot {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&change)));
            if outcome.is_err() {
                tracing::warn!(
                    collection = %self.collection,
                    listener = id,
                    "change listener panicked; continuing"
                );
            }
        }
    }

    /// Buffered changes, oldest first.
    pub fn changes(&self) -> Vec<Change> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Remove and return buffered changes, oldest first.
    pub fn drain(&self) -> Vec<Change> {
        self.buffer.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Detach every listener and discard the buffer.
    pub fn teardown(&self) {
        self.listeners.lock().clear();
        self.buffer.lock().clear();
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("collection", &self.collection)
            .field("capacity", &self.capacity)
            .field("buffered", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
