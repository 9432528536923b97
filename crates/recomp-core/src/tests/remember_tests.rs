use crate::remember::{Holder, RememberEventDispatcher, RememberObserver};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct Log {
    events: RefCell<Vec<&'static str>>,
}

struct Observer {
    name: &'static str,
    log: Rc<Log>,
}

impl RememberObserver for Observer {
    fn on_remembered(&self) {
        self.log.events.borrow_mut().push(self.name);
    }
    fn on_forgotten(&self) {
        self.log.events.borrow_mut().push("forgotten");
    }
    fn on_abandoned(&self) {
        self.log.events.borrow_mut().push("abandoned");
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn holder(log: &Rc<Log>, name: &'static str) -> Holder {
    Rc::new(Observer { name, log: Rc::clone(log) })
}

#[test]
fn dispatch_runs_remembers_then_side_effects() {
    let log = Rc::new(Log::default());
    let mut d = RememberEventDispatcher::new();
    d.remember(holder(&log, "a"));
    d.side_effect(Box::new({
        let log = Rc::clone(&log);
        move || log.events.borrow_mut().push("effect")
    }));
    d.dispatch();
    assert_eq!(*log.events.borrow(), vec!["a", "effect"]);
    assert!(d.is_empty());
}

#[test]
fn forgets_run_lifo_before_remembers() {
    let log = Rc::new(Log::default());
    let mut d = RememberEventDispatcher::new();
    d.forget(holder(&log, "first"));
    d.forget(holder(&log, "second"));
    d.dispatch();
    assert_eq!(*log.events.borrow(), vec!["forgotten", "forgotten"]);
}

#[test]
fn dispatch_abandons_calls_on_abandoned_instead_of_on_remembered() {
    let log = Rc::new(Log::default());
    let mut d = RememberEventDispatcher::new();
    d.remember(holder(&log, "a"));
    d.dispatch_abandons();
    assert_eq!(*log.events.borrow(), vec!["abandoned"]);
    assert!(d.is_empty());
}

#[test]
fn extract_remember_set_empties_pending_remembers() {
    let log = Rc::new(Log::default());
    let mut d = RememberEventDispatcher::new();
    d.remember(holder(&log, "a"));
    let extracted = d.extract_remember_set();
    assert_eq!(extracted.len(), 1);
    d.dispatch();
    assert!(log.events.borrow().is_empty(), "extracted holders must not be dispatched");
}

#[test]
fn new_dispatcher_is_empty() {
    assert!(RememberEventDispatcher::new().is_empty());
}
