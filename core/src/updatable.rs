//! Updatable contract and the registry the scheduler drives.
//!
//! RULE: Only the scheduler thread touches the live set, and only from
//! `flush()`. Every other thread goes through the pending sets.
//! A removal always wins over an add of the same object in the same cycle.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

/// Anything that needs a state update once per simulation step.
pub trait Updatable: Send + Sync {
    /// Stable name used in logs and fault reports.
    fn name(&self) -> &str;

    /// Called once per step by the scheduler, never concurrently with itself.
    fn update_state(&self, ticks_per_second: u32) -> anyhow::Result<()>;
}

/// Shared handle with reference-equality semantics: two handles are equal
/// only when they point at the same object.
#[derive(Clone)]
pub struct UpdatableHandle(Arc<dyn Updatable>);

impl UpdatableHandle {
    pub fn new(updatable: Arc<dyn Updatable>) -> Self {
        Self(updatable)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn get(&self) -> &dyn Updatable {
        self.0.as_ref()
    }
}

impl<T: Updatable + 'static> From<Arc<T>> for UpdatableHandle {
    fn from(updatable: Arc<T>) -> Self {
        Self(updatable)
    }
}

impl PartialEq for UpdatableHandle {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for UpdatableHandle {}

impl Hash for UpdatableHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for UpdatableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UpdatableHandle({} @ {:#x})", self.0.name(), self.addr())
    }
}

#[derive(Default)]
struct Pending {
    add:    Vec<UpdatableHandle>,
    remove: HashSet<UpdatableHandle>,
}

#[derive(Default)]
struct Live {
    order:   Vec<UpdatableHandle>,
    members: HashSet<UpdatableHandle>,
}

/// Thread-safe set of updatables with deferred add/remove.
#[derive(Default)]
pub struct UpdatableRegistry {
    pending: Mutex<Pending>,
    live:    Mutex<Live>,
}

impl UpdatableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include `updatable` from the next flush on. Idempotent.
    pub fn add(&self, updatable: impl Into<UpdatableHandle>) {
        let handle = updatable.into();
        let mut pending = lock(&self.pending);
        if !pending.add.contains(&handle) {
            pending.add.push(handle);
        }
    }

    /// Exclude `updatable` from the next flush on. Idempotent.
    pub fn remove(&self, updatable: impl Into<UpdatableHandle>) {
        let handle = updatable.into();
        lock(&self.pending).remove.insert(handle);
    }

    /// Apply pending adds, then pending removes, to the live set.
    /// Scheduler thread only, between steps.
    pub fn flush(&self) {
        let Pending { add, remove } = std::mem::take(&mut *lock(&self.pending));
        if add.is_empty() && remove.is_empty() {
            return;
        }

        let mut live = lock(&self.live);
        for handle in add {
            if live.members.insert(handle.clone()) {
                live.order.push(handle);
            }
        }
        if !remove.is_empty() {
            live.order.retain(|h| !remove.contains(h));
            live.members.retain(|h| !remove.contains(h));
        }
        log::trace!("registry flushed: {} live", live.order.len());
    }

    /// Live updatables in registration order. The returned vector is a
    /// copy, so updates may call back into the registry freely.
    pub fn live(&self) -> Vec<UpdatableHandle> {
        lock(&self.live).order.clone()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.live).order.len()
    }

    pub fn is_live(&self, updatable: impl Into<UpdatableHandle>) -> bool {
        lock(&self.live).members.contains(&updatable.into())
    }

    /// Number of queued adds and removes not yet flushed.
    pub fn pending_count(&self) -> (usize, usize) {
        let pending = lock(&self.pending);
        (pending.add.len(), pending.remove.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}
