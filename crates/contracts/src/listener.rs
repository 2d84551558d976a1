//! Observer registry used for device events (lines, fixes, readings, frames, ticks)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Event callback
///
/// Invoked on the thread that produced the event (serial reader thread,
/// capture callback, sync tick task). Must not block.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle returned by `subscribe`, unique across all registries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of events to registered listeners
pub struct ListenerRegistry<T> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener
    pub fn subscribe(&self, listener: Listener<T>) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener.
    ///
    /// The listener list is copied first so callbacks run without the lock
    /// and may themselves subscribe or unsubscribe.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
