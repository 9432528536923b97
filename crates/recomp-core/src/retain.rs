//! Retain scopes: values that can outlive a group's removal, returned again
//! if the group re-enters composition with identical keys.

use crate::collections::map::HashMap;
use crate::Key;
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// `(typeHash, positionalKey, userKeys)` — the composite identity a retained
/// value is filed under.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RetainKeys {
    pub type_hash: u64,
    pub positional_key: Key,
    pub user_keys: Vec<Key>,
}

pub trait Retainable: Any {
    fn on_retained(&self) {}
    fn on_entered_composition(&self) {}
    fn on_exited_composition(&self) {}
    fn on_retired(&self) {}
    fn as_any(&self) -> &dyn Any;
}

type RetainedValue = Rc<dyn Retainable>;

/// A scope that can hold onto values removed from composition for later
/// reuse. Two stateless implementations exist besides the controlled one:
/// [`Forgetful`] (never keeps) and [`AlwaysKeepExitedValues`] (provider
/// only, no storage).
pub trait RetainScope {
    fn is_keeping_exited_values(&self) -> bool;
    fn get_retained(&self, keys: &RetainKeys) -> Option<RetainedValue>;
    fn save_retained(&self, keys: RetainKeys, value: RetainedValue);
    fn parent(&self) -> Option<Rc<dyn RetainScope>>;
    fn set_parent_retain_state_provider(&mut self, parent: Option<Rc<dyn RetainScope>>);
}

/// Never keeps anything that leaves composition.
#[derive(Default)]
pub struct Forgetful {
    parent: RefCell<Option<Rc<dyn RetainScope>>>,
}

impl RetainScope for Forgetful {
    fn is_keeping_exited_values(&self) -> bool {
        false
    }
    fn get_retained(&self, _keys: &RetainKeys) -> Option<RetainedValue> {
        None
    }
    fn save_retained(&self, _keys: RetainKeys, _value: RetainedValue) {}
    fn parent(&self) -> Option<Rc<dyn RetainScope>> {
        self.parent.borrow().clone()
    }
    fn set_parent_retain_state_provider(&mut self, parent: Option<Rc<dyn RetainScope>>) {
        *self.parent.borrow_mut() = parent;
    }
}

/// Provider-only stateless scope: always reports "keeping" but never
/// actually stores anything (used where a parent in the retain-scope chain
/// must report keeping without itself owning storage).
#[derive(Default)]
pub struct AlwaysKeepExitedValues {
    parent: RefCell<Option<Rc<dyn RetainScope>>>,
}

impl RetainScope for AlwaysKeepExitedValues {
    fn is_keeping_exited_values(&self) -> bool {
        true
    }
    fn get_retained(&self, _keys: &RetainKeys) -> Option<RetainedValue> {
        None
    }
    fn save_retained(&self, _keys: RetainKeys, _value: RetainedValue) {}
    fn parent(&self) -> Option<Rc<dyn RetainScope>> {
        self.parent.borrow().clone()
    }
    fn set_parent_retain_state_provider(&mut self, parent: Option<Rc<dyn RetainScope>>) {
        *self.parent.borrow_mut() = parent;
    }
}

/// A retain scope with a counted "keeping" window, multi-mapped storage,
/// and optional parenting so a child inherits the parent's keep state.
#[derive(Default)]
pub struct ControlledRetainScope {
    keeping_depth: RefCell<u32>,
    storage: RefCell<HashMap<RetainKeys, Vec<RetainedValue>>>,
    parent: RefCell<Option<Rc<dyn RetainScope>>>,
}

impl ControlledRetainScope {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn start_keeping_exited_values(&self) {
        *self.keeping_depth.borrow_mut() += 1;
    }

    pub fn stop_keeping_exited_values(&self) {
        let mut d = self.keeping_depth.borrow_mut();
        *d = d.saturating_sub(1);
    }
}

impl RetainScope for ControlledRetainScope {
    fn is_keeping_exited_values(&self) -> bool {
        *self.keeping_depth.borrow() > 0
            || self
                .parent
                .borrow()
                .as_ref()
                .map(|p| p.is_keeping_exited_values())
                .unwrap_or(false)
    }

    fn get_retained(&self, keys: &RetainKeys) -> Option<RetainedValue> {
        let mut storage = self.storage.borrow_mut();
        if let Some(bucket) = storage.get_mut(keys) {
            return bucket.pop();
        }
        None
    }

    fn save_retained(&self, keys: RetainKeys, value: RetainedValue) {
        self.storage.borrow_mut().entry(keys).or_default().push(value);
    }

    fn parent(&self) -> Option<Rc<dyn RetainScope>> {
        self.parent.borrow().clone()
    }

    fn set_parent_retain_state_provider(&mut self, parent: Option<Rc<dyn RetainScope>>) {
        *self.parent.borrow_mut() = parent;
    }
}

/// Lifecycle driver for a single retained holder's four steps.
pub struct RetainedHolderLifecycle {
    scope: Weak<dyn RetainScope>,
    keys: RetainKeys,
    retained_once: std::cell::Cell<bool>,
}

impl RetainedHolderLifecycle {
    pub fn new(scope: Weak<dyn RetainScope>, keys: RetainKeys) -> Self {
        Self {
            scope,
            keys,
            retained_once: std::cell::Cell::new(false),
        }
    }

    pub fn on_remembered(&self, holder: &dyn Retainable) {
        if !self.retained_once.get() {
            holder.on_retained();
            self.retained_once.set(true);
        }
        holder.on_entered_composition();
    }

    pub fn on_forgotten(&self, holder: RetainedValue) {
        let keeping = self
            .scope
            .upgrade()
            .map(|s| s.is_keeping_exited_values())
            .unwrap_or(false);
        if keeping {
            if let Some(scope) = self.scope.upgrade() {
                scope.save_retained(self.keys.clone(), holder.clone());
            }
            holder.on_exited_composition();
        } else {
            holder.on_exited_composition();
            holder.on_retired();
        }
    }

    pub fn on_abandoned(&self, holder: &dyn Retainable) {
        holder.on_retired();
    }
}

#[cfg(test)]
#[path = "tests/retain_tests.rs"]
mod tests;
