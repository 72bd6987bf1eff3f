//! Same-process change notification.
//!
//! The ChangeBus lets one mutation site (the session store) tell any number of
//! observers (history sidebar, active chat view, etc.) about a new state
//! without them polling storage.
//!
//! # Delivery Rules
//!
//! - `publish` calls every current handler synchronously, in subscription
//!   order, and returns only after all of them ran
//! - a handler unsubscribed before its turn in a publish is skipped, and is
//!   never called again
//! - the subscriber list is not locked while handlers run, so a handler may
//!   subscribe, unsubscribe or publish itself
//!
//! # Example
//!
//! ```rust
//! use inferra_core::change_bus::ChangeBus;
//! use std::sync::{Arc, Mutex};
//!
//! let bus = ChangeBus::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = Arc::clone(&seen);
//! let subscription = bus.subscribe(move |n: &u32| sink.lock().unwrap().push(*n));
//!
//! bus.publish(&1);
//! subscription.unsubscribe();
//! bus.publish(&2);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Slot<E> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler<E>,
}

struct Subscribers<E> {
    next_id: AtomicU64,
    slots: Mutex<Vec<Slot<E>>>,
}

impl<E> Subscribers<E> {
    fn remove(&self, id: u64) {
        match self.slots.lock() {
            Ok(mut slots) => slots.retain(|slot| slot.id != id),
            Err(e) => log::warn!("Change bus subscriber list poisoned: {}", e),
        }
    }
}

/// A synchronous publish/subscribe fan-out.
pub struct ChangeBus<E> {
    subscribers: Arc<Subscribers<E>>,
}

impl<E: 'static> ChangeBus<E> {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Subscribers {
                next_id: AtomicU64::new(0),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a handler for all future events.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped. Past events are not replayed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        match self.subscribers.slots.lock() {
            Ok(mut slots) => slots.push(Slot {
                id,
                active: Arc::clone(&active),
                handler: Arc::new(handler),
            }),
            Err(e) => {
                log::warn!("Change bus subscriber list poisoned: {}", e);
                active.store(false, Ordering::SeqCst);
            }
        }

        let subscribers: Weak<Subscribers<E>> = Arc::downgrade(&self.subscribers);
        Subscription {
            active,
            detach: Some(Box::new(move || {
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers.remove(id);
                }
            })),
        }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Returns the number of handlers that were invoked.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Handler<E>)> = match self.subscribers.slots.lock() {
            Ok(slots) => slots
                .iter()
                .map(|slot| (Arc::clone(&slot.active), Arc::clone(&slot.handler)))
                .collect(),
            Err(e) => {
                log::warn!("Change bus subscriber list poisoned: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for (active, handler) in snapshot {
            if active.load(Ordering::SeqCst) {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Get the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or(0)
    }
}

impl<E: 'static> Default for ChangeBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ChangeBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

/// Handle to a registered handler. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Stop receiving events.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn detach(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
