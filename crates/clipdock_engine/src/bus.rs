use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use clipdock_logging::engine_trace;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Inner<E> {
    next_id: u64,
    subscribers: BTreeMap<u64, Callback<E>>,
}

/// Typed publish/subscribe channel for one category of state changes.
///
/// Callbacks run on the publishing thread, in subscription order. A callback
/// may subscribe or dispose while being invoked; the change applies from the
/// next publish on.
pub struct EventBus<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Arc::new(callback));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    pub fn publish(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = lock(&self.inner).subscribers.values().cloned().collect();
        engine_trace!("Publishing to {} subscribers", callbacks.len());
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Disposer returned by [`EventBus::subscribe`]. Disposing twice is a no-op,
/// and dropping the handle disposes it.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<E> {
    bus: Weak<Mutex<Inner<E>>>,
    id: Option<u64>,
}

impl<E> Subscription<E> {
    pub fn dispose(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(inner) = self.bus.upgrade() {
            lock(&inner).subscribers.remove(&id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.bus.strong_count() > 0
    }

    /// Keeps the callback registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.id = None;
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock<E>(inner: &Mutex<Inner<E>>) -> MutexGuard<'_, Inner<E>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
