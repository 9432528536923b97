//! Snapshot system contract: the core only needs a transactional
//! read/write view over observable state and a way to be told when one
//! applies. The MVCC machinery behind that view (snapshot id sets, state
//! records) is an external collaborator's concern; this module supplies a
//! small reference implementation so the recomposer and its tests have
//! something real to drive. It shares the rest of this crate's
//! single-threaded, `Rc`-based discipline rather than a fully thread-safe
//! one — `Arc` here is just a multi-owner handle, not a crossing-real-threads
//! guarantee.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotApplyResult {
    Success,
    Failure,
}

pub type ChangedSet = Vec<Rc<dyn Any>>;
pub type ApplyObserver = Box<dyn Fn(&ChangedSet)>;

/// A disposable registration returned by [`SnapshotHub::register_apply_observer`].
pub struct ObserverHandle {
    id: u64,
    hub: Arc<SnapshotHub>,
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

struct Entry {
    id: u64,
    observer: ApplyObserver,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    observers: Vec<Entry>,
    pending: Vec<ChangedSet>,
}

/// Process-wide registry of apply observers plus a queue of changed-object
/// sets awaiting notification, matching the `Snapshot.*` surface the core
/// calls through.
#[derive(Default)]
pub struct SnapshotHub {
    state: RefCell<HubState>,
}

impl SnapshotHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a mutable snapshot scope. The returned [`MutableSnapshot`]'s
    /// `apply()` enqueues its changed set for later `send_apply_notifications`.
    pub fn take_mutable_snapshot(self: &Arc<Self>) -> MutableSnapshot {
        MutableSnapshot {
            hub: Arc::clone(self),
            changed: RefCell::new(Vec::new()),
        }
    }

    pub fn register_apply_observer(
        self: &Arc<Self>,
        observer: ApplyObserver,
    ) -> ObserverHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.observers.push(Entry { id, observer });
        drop(state);
        ObserverHandle {
            id,
            hub: Arc::clone(self),
        }
    }

    fn unregister(&self, id: u64) {
        self.state.borrow_mut().observers.retain(|e| e.id != id);
    }

    /// Flush every queued changed-set to every currently registered
    /// observer, oldest batch first.
    pub fn send_apply_notifications(&self) {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        if pending.is_empty() {
            return;
        }
        let state = self.state.borrow();
        for changed in &pending {
            for entry in &state.observers {
                (entry.observer)(changed);
            }
        }
    }

    /// No-op hook point matching `Snapshot.notifyObjectsInitialized()`;
    /// kept as an explicit call so callers don't need to special-case the
    /// reference implementation.
    pub fn notify_objects_initialized(&self) {}

    pub fn with_mutable_snapshot<T>(self: &Arc<Self>, block: impl FnOnce() -> T) -> T {
        let snapshot = self.take_mutable_snapshot();
        let value = block();
        let _ = snapshot.apply();
        value
    }

    fn enqueue(&self, changed: ChangedSet) {
        if changed.is_empty() {
            return;
        }
        self.state.borrow_mut().pending.push(changed);
    }
}

/// A scope entered by `take_mutable_snapshot`. Reads/writes performed while
/// "inside" (tracked here only by the caller recording changed objects
/// through [`MutableSnapshot::record_write`]) are staged until `apply()`.
pub struct MutableSnapshot {
    hub: Arc<SnapshotHub>,
    changed: RefCell<ChangedSet>,
}

impl MutableSnapshot {
    pub fn enter<T>(&self, block: impl FnOnce() -> T) -> T {
        block()
    }

    pub fn record_write(&self, value: Rc<dyn Any>) {
        self.changed.borrow_mut().push(value);
    }

    pub fn apply(&self) -> SnapshotApplyResult {
        let changed = std::mem::take(&mut *self.changed.borrow_mut());
        self.hub.enqueue(changed);
        SnapshotApplyResult::Success
    }
}

#[cfg(test)]
#[path = "tests/snapshot_tests.rs"]
mod tests;
