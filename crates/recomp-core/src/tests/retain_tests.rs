use crate::retain::{
    AlwaysKeepExitedValues, ControlledRetainScope, Forgetful, RetainKeys, RetainScope, Retainable,
    RetainedHolderLifecycle,
};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

fn keys(n: i64) -> RetainKeys {
    RetainKeys {
        type_hash: 1,
        positional_key: n,
        user_keys: Vec::new(),
    }
}

#[derive(Default)]
struct Log {
    events: RefCell<Vec<&'static str>>,
}

struct Holder {
    log: Rc<Log>,
}

impl Retainable for Holder {
    fn on_retained(&self) {
        self.log.events.borrow_mut().push("retained");
    }
    fn on_entered_composition(&self) {
        self.log.events.borrow_mut().push("entered");
    }
    fn on_exited_composition(&self) {
        self.log.events.borrow_mut().push("exited");
    }
    fn on_retired(&self) {
        self.log.events.borrow_mut().push("retired");
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn forgetful_never_retains_anything() {
    let scope = Forgetful::default();
    assert!(!scope.is_keeping_exited_values());
    let log = Rc::new(Log::default());
    let holder: Rc<dyn Retainable> = Rc::new(Holder { log });
    scope.save_retained(keys(1), holder);
    assert!(scope.get_retained(&keys(1)).is_none());
}

#[test]
fn always_keep_reports_keeping_but_stores_nothing() {
    let scope = AlwaysKeepExitedValues::default();
    assert!(scope.is_keeping_exited_values());
    assert!(scope.get_retained(&keys(1)).is_none());
}

#[test]
fn controlled_scope_round_trips_a_saved_value_under_its_keys() {
    let scope = ControlledRetainScope::new();
    let log = Rc::new(Log::default());
    let holder: Rc<dyn Retainable> = Rc::new(Holder { log });
    scope.save_retained(keys(1), holder);

    assert!(scope.get_retained(&keys(2)).is_none());
    let retrieved = scope.get_retained(&keys(1));
    assert!(retrieved.is_some());
    // A value is consumed on retrieval; a second fetch under the same keys
    // finds nothing left in the bucket.
    assert!(scope.get_retained(&keys(1)).is_none());
}

#[test]
fn controlled_scope_keeping_depth_is_reentrant() {
    let scope = ControlledRetainScope::new();
    assert!(!scope.is_keeping_exited_values());
    scope.start_keeping_exited_values();
    scope.start_keeping_exited_values();
    assert!(scope.is_keeping_exited_values());
    scope.stop_keeping_exited_values();
    assert!(scope.is_keeping_exited_values());
    scope.stop_keeping_exited_values();
    assert!(!scope.is_keeping_exited_values());
}

#[test]
fn controlled_scope_stop_below_zero_saturates_instead_of_panicking() {
    let scope = ControlledRetainScope::new();
    scope.stop_keeping_exited_values();
    assert!(!scope.is_keeping_exited_values());
}

#[test]
fn child_scope_inherits_parent_keeping_state() {
    let parent = ControlledRetainScope::new();
    parent.start_keeping_exited_values();
    let mut child = ControlledRetainScope::default();
    child.set_parent_retain_state_provider(Some(parent.clone() as Rc<dyn RetainScope>));
    assert!(child.is_keeping_exited_values());
    parent.stop_keeping_exited_values();
    assert!(!child.is_keeping_exited_values());
}

#[test]
fn lifecycle_on_remembered_fires_on_retained_only_once() {
    let log = Rc::new(Log::default());
    let scope: Rc<dyn RetainScope> = ControlledRetainScope::new();
    let lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys(1));
    let holder = Holder { log: Rc::clone(&log) };

    lifecycle.on_remembered(&holder);
    lifecycle.on_remembered(&holder);

    assert_eq!(*log.events.borrow(), vec!["retained", "entered", "entered"]);
}

#[test]
fn lifecycle_on_forgotten_saves_into_a_keeping_scope() {
    let log = Rc::new(Log::default());
    let scope: Rc<dyn RetainScope> = {
        let s = ControlledRetainScope::new();
        s.start_keeping_exited_values();
        s
    };
    let lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys(1));
    let holder: Rc<dyn Retainable> = Rc::new(Holder { log: Rc::clone(&log) });

    lifecycle.on_forgotten(holder);
    assert_eq!(*log.events.borrow(), vec!["exited"]);
    assert!(scope.get_retained(&keys(1)).is_some());
}

#[test]
fn lifecycle_on_forgotten_retires_when_the_scope_is_not_keeping() {
    let log = Rc::new(Log::default());
    let scope: Rc<dyn RetainScope> = ControlledRetainScope::new();
    let lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys(1));
    let holder: Rc<dyn Retainable> = Rc::new(Holder { log: Rc::clone(&log) });

    lifecycle.on_forgotten(holder);
    assert_eq!(*log.events.borrow(), vec!["exited", "retired"]);
    assert!(scope.get_retained(&keys(1)).is_none());
}

#[test]
fn lifecycle_on_abandoned_retires_directly() {
    let log = Rc::new(Log::default());
    let scope: Rc<dyn RetainScope> = ControlledRetainScope::new();
    let lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys(1));
    let holder = Holder { log: Rc::clone(&log) };

    lifecycle.on_abandoned(&holder);
    assert_eq!(*log.events.borrow(), vec!["retired"]);
}

#[test]
fn lifecycle_survives_a_dropped_scope() {
    let log = Rc::new(Log::default());
    let weak = {
        let scope: Rc<dyn RetainScope> = ControlledRetainScope::new();
        Rc::downgrade(&scope)
    };
    let lifecycle = RetainedHolderLifecycle::new(weak, keys(1));
    let holder: Rc<dyn Retainable> = Rc::new(Holder { log: Rc::clone(&log) });
    lifecycle.on_forgotten(holder);
    assert_eq!(*log.events.borrow(), vec!["exited", "retired"]);
}
