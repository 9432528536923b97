//! Ordered buffering and dispatch of remember/forget/side-effect lifecycle
//! callbacks.

use crate::collections::map::HashSet;
use std::any::Any;
use std::rc::Rc;

/// Something a group can remember: receives lifecycle notifications as the
/// group enters, leaves, and is retired from composition.
pub trait RememberObserver: Any {
    fn on_remembered(&self) {}
    fn on_forgotten(&self) {}
    fn on_abandoned(&self) {}
    fn as_any(&self) -> &dyn Any;
}

pub type Holder = Rc<dyn RememberObserver>;

fn holder_id(h: &Holder) -> usize {
    Rc::as_ptr(h) as *const () as usize
}

#[derive(Default)]
pub struct RememberEventDispatcher {
    remembers: Vec<Holder>,
    forgets: Vec<Holder>,
    side_effects: Vec<Box<dyn FnOnce()>>,
    abandoning: HashSet<usize>,
    abandon_holders: Vec<Holder>,
}

impl RememberEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, holder: Holder) {
        self.abandoning.insert(holder_id(&holder));
        self.abandon_holders.push(holder.clone());
        self.remembers.push(holder);
    }

    pub fn forget(&mut self, holder: Holder) {
        self.forgets.push(holder);
    }

    pub fn side_effect(&mut self, effect: Box<dyn FnOnce()>) {
        self.side_effects.push(effect);
    }

    /// Bind the abandon-tracking set for this apply pass.
    pub fn prepare(&mut self) {
        // abandon_holders/abandoning already populated incrementally by
        // `remember`; nothing further to bind since this dispatcher owns
        // its own tracking set per apply pass.
    }

    /// Dispatch order: forget (LIFO relative to insertion order) -> remember
    /// (FIFO) -> side-effect (FIFO).
    pub fn dispatch(&mut self) {
        while let Some(h) = self.forgets.pop() {
            h.on_forgotten();
        }
        for h in self.remembers.drain(..) {
            let id = holder_id(&h);
            self.abandoning.remove(&id);
            h.on_remembered();
        }
        self.abandon_holders
            .retain(|h| self.abandoning.contains(&holder_id(h)));
        for effect in self.side_effects.drain(..) {
            effect();
        }
    }

    /// On exceptional bailout: call `on_abandoned` on every holder still in
    /// the abandon set (i.e. remembered but never reached dispatch).
    pub fn dispatch_abandons(&mut self) {
        for h in self.abandon_holders.drain(..) {
            h.on_abandoned();
        }
        self.abandoning.clear();
        self.remembers.clear();
        self.forgets.clear();
        self.side_effects.clear();
    }

    /// For pausable composition: return the pending remembers so callers can
    /// suppress them if the composition is cancelled instead of dispatching.
    pub fn extract_remember_set(&mut self) -> Vec<Holder> {
        std::mem::take(&mut self.remembers)
    }

    pub fn is_empty(&self) -> bool {
        self.remembers.is_empty() && self.forgets.is_empty() && self.side_effects.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/remember_tests.rs"]
mod tests;
