//! Synchronous publish/subscribe for game events.
//!
//! RULES:
//!   - `publish` runs every handler subscribed at the moment of the call,
//!     on the caller's thread, in registration order, exactly once.
//!   - Handlers may subscribe, unsubscribe or publish from inside a
//!     dispatch. Changes apply to later publishes only.
//!   - No lock is held while a handler runs.

use crate::event::{EventKind, GameEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub type Handler = Arc<dyn Fn(&GameEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Injectable event bus. One instance per match/session.
pub trait EventBus: Send + Sync {
    /// Subscribe `handler` to events of `kind`. Subscribing the same handler
    /// (same `Arc`) twice for one kind returns the existing id.
    fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionId;

    /// Returns false if `id` was not subscribed to `kind`.
    fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool;

    fn publish(&self, event: &GameEvent);

    fn subscriber_count(&self, kind: EventKind) -> usize;
}

struct Subscription {
    id:      SubscriptionId,
    handler: Handler,
}

/// Thread-safe in-process bus.
#[derive(Default)]
pub struct SyncEventBus {
    table:   RwLock<HashMap<EventKind, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Handler> {
        let table = self.table.read().unwrap_or_else(|p| p.into_inner());
        table
            .get(&kind)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default()
    }
}

impl EventBus for SyncEventBus {
    fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let mut table = self.table.write().unwrap_or_else(|p| p.into_inner());
        let subs = table.entry(kind).or_default();
        if let Some(existing) = subs.iter().find(|s| same_handler(&s.handler, &handler)) {
            return existing.id;
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscription { id, handler });
        id
    }

    fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut table = self.table.write().unwrap_or_else(|p| p.into_inner());
        let Some(subs) = table.get_mut(&kind) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    fn publish(&self, event: &GameEvent) {
        let handlers = self.snapshot(event.kind());
        log::trace!("publish {:?} to {} handlers", event.kind(), handlers.len());
        for handler in handlers {
            handler(event);
        }
    }

    fn subscriber_count(&self, kind: EventKind) -> usize {
        let table = self.table.read().unwrap_or_else(|p| p.into_inner());
        table.get(&kind).map_or(0, Vec::len)
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Bus decorator that records every published event before dispatching it.
pub struct RecordingEventBus<B: EventBus = SyncEventBus> {
    inner: B,
    log:   Mutex<Vec<GameEvent>>,
}

impl RecordingEventBus<SyncEventBus> {
    pub fn new() -> Self {
        Self::wrap(SyncEventBus::new())
    }
}

impl Default for RecordingEventBus<SyncEventBus> {
    fn default() -> Self { Self::new() }
}

impl<B: EventBus> RecordingEventBus<B> {
    pub fn wrap(inner: B) -> Self {
        Self { inner, log: Mutex::new(Vec::new()) }
    }

    /// Every event published so far, in publish order.
    pub fn events(&self) -> Vec<GameEvent> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    /// Remove and return the recorded events.
    pub fn drain(&self) -> Vec<GameEvent> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl<B: EventBus> EventBus for RecordingEventBus<B> {
    fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.inner.subscribe(kind, handler)
    }

    fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(kind, id)
    }

    fn publish(&self, event: &GameEvent) {
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        self.inner.publish(event);
    }

    fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.subscriber_count(kind)
    }
}
