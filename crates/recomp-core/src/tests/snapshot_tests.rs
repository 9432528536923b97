use crate::snapshot::{SnapshotApplyResult, SnapshotHub};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn a_write_inside_a_mutable_snapshot_reaches_every_registered_observer() {
    let hub = SnapshotHub::new();
    let received = Rc::new(RefCell::new(Vec::new()));
    let _handle = hub.register_apply_observer(Box::new({
        let received = Rc::clone(&received);
        move |changed| {
            received.borrow_mut().push(changed.len());
        }
    }));

    let snapshot = hub.take_mutable_snapshot();
    let value: Rc<dyn Any> = Rc::new(1i32);
    snapshot.record_write(value);
    assert_eq!(snapshot.apply(), SnapshotApplyResult::Success);

    assert!(received.borrow().is_empty(), "apply only queues, it doesn't notify");
    hub.send_apply_notifications();
    assert_eq!(*received.borrow(), vec![1]);
}

#[test]
fn applying_an_empty_changed_set_never_reaches_observers() {
    let hub = SnapshotHub::new();
    let calls = Rc::new(RefCell::new(0u32));
    let _handle = hub.register_apply_observer(Box::new({
        let calls = Rc::clone(&calls);
        move |_| *calls.borrow_mut() += 1
    }));

    let snapshot = hub.take_mutable_snapshot();
    snapshot.apply();
    hub.send_apply_notifications();
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn dropping_the_observer_handle_unregisters_it() {
    let hub = SnapshotHub::new();
    let calls = Rc::new(RefCell::new(0u32));
    let handle = hub.register_apply_observer(Box::new({
        let calls = Rc::clone(&calls);
        move |_| *calls.borrow_mut() += 1
    }));
    drop(handle);

    let snapshot = hub.take_mutable_snapshot();
    snapshot.record_write(Rc::new(1i32));
    snapshot.apply();
    hub.send_apply_notifications();
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn multiple_pending_batches_are_delivered_oldest_first() {
    let hub = SnapshotHub::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let _handle = hub.register_apply_observer(Box::new({
        let order = Rc::clone(&order);
        move |changed: &Vec<Rc<dyn Any>>| {
            if let Some(v) = changed.first() {
                if let Some(tag) = v.downcast_ref::<i32>() {
                    order.borrow_mut().push(*tag);
                }
            }
        }
    }));

    let first = hub.take_mutable_snapshot();
    first.record_write(Rc::new(1i32));
    first.apply();

    let second = hub.take_mutable_snapshot();
    second.record_write(Rc::new(2i32));
    second.apply();

    hub.send_apply_notifications();
    assert_eq!(*order.borrow(), vec![1, 2]);
}

#[test]
fn with_mutable_snapshot_runs_the_block_and_applies_afterward() {
    let hub = SnapshotHub::new();
    let calls = Rc::new(RefCell::new(0u32));
    let _handle = hub.register_apply_observer(Box::new({
        let calls = Rc::clone(&calls);
        move |_| *calls.borrow_mut() += 1
    }));

    let result = hub.with_mutable_snapshot(|| 42);
    assert_eq!(result, 42);
    // The block recorded nothing, so apply's empty changed set never
    // notifies even after a flush.
    hub.send_apply_notifications();
    assert_eq!(*calls.borrow(), 0);
}
