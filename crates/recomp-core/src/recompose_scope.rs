//! RecomposeScope lifecycle: the smallest restartable region tracked
//! for invalidation.

use crate::anchor::Anchor;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Pending,
    Composing,
    Valid,
    Invalid,
    Released,
}

struct Inner {
    id: usize,
    anchor: Anchor,
    state: Cell<ScopeState>,
    used: Cell<bool>,
}

/// A cloneable handle to one restartable group's invalidation bookkeeping.
/// Per the one-way ownership rule: the scope holds an [`Anchor`], never a
/// direct table reference, so no reference cycle forms with the slot table.
#[derive(Clone)]
pub struct RecomposeScope {
    inner: Rc<Inner>,
}

impl PartialEq for RecomposeScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RecomposeScope {}

impl std::hash::Hash for RecomposeScope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as *const () as usize).hash(state);
    }
}

impl RecomposeScope {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                anchor,
                state: Cell::new(ScopeState::Pending),
                used: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn anchor(&self) -> &Anchor {
        &self.inner.anchor
    }

    pub fn state(&self) -> ScopeState {
        self.inner.state.get()
    }

    pub fn is_used(&self) -> bool {
        self.inner.used.get()
    }

    pub fn mark_used(&self) {
        self.inner.used.set(true);
    }

    pub fn enter_composing(&self) {
        self.inner.state.set(ScopeState::Composing);
        self.inner.used.set(false);
    }

    pub fn mark_valid(&self) {
        if self.inner.state.get() != ScopeState::Released {
            self.inner.state.set(ScopeState::Valid);
        }
    }

    pub fn mark_invalid(&self) {
        if self.inner.state.get() != ScopeState::Released {
            self.inner.state.set(ScopeState::Invalid);
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.inner.state.get() == ScopeState::Invalid
    }

    pub fn is_released(&self) -> bool {
        self.inner.state.get() == ScopeState::Released
    }

    /// A released scope can never recompose again; its anchor is no longer
    /// trustworthy once the owning group has been removed.
    pub fn release(&self) {
        self.inner.state.set(ScopeState::Released);
    }

    /// A non-owning handle, for the recomposer's `compositionInvalidations`
    /// bookkeeping: it must not keep an otherwise-unreferenced
    /// scope alive.
    pub fn downgrade(&self) -> WeakRecomposeScope {
        WeakRecomposeScope {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

#[derive(Clone)]
pub struct WeakRecomposeScope {
    inner: std::rc::Weak<Inner>,
}

impl WeakRecomposeScope {
    pub fn upgrade(&self) -> Option<RecomposeScope> {
        self.inner.upgrade().map(|inner| RecomposeScope { inner })
    }
}

#[cfg(test)]
#[path = "tests/recompose_scope_tests.rs"]
mod tests;
