//! End-to-end scenarios spanning more than one module: scheduler dispatch
//! order, write-before-recompose coalescing, scope reclaimability after
//! dispose, paused-composition cancellation, movable-content rendezvous,
//! and retained-holder recreate.

use crate::anchor::Anchor;
use crate::applier::MemoryApplier;
use crate::change_list::Op;
use crate::composition::Composition;
use crate::movable_content::{MovableContent, MovableContentState, StateReference};
use crate::observation::ObservableKey;
use crate::recompose_scope::RecomposeScope;
use crate::recomposer::{CompositionId, LabeledWorkerExecutor, Recomposer, RecomposerConfig};
use crate::remember::{Holder, RememberObserver};
use crate::retain::{ControlledRetainScope, RetainKeys, RetainScope, Retainable, RetainedHolderLifecycle};
use crate::snapshot::SnapshotHub;
use recomp_testing::{NoopComposer, ScriptedComposer};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

fn observable(value: i32) -> ObservableKey {
    Rc::new(value) as ObservableKey
}

/// S1: two compositions invalidated in the same frame dispatch through the
/// worker executor in ascending composition-id order, matching the
/// `PrioritySet`'s min-heap drain order rather than registration order.
#[test]
fn scheduler_dispatches_concurrent_compositions_in_ascending_id_order() {
    let hub = SnapshotHub::new();
    let recomposer = Recomposer::new(RecomposerConfig::default(), Arc::clone(&hub));
    recomposer.start();

    let mut composer_a = ScriptedComposer::new();
    composer_a.push_pass(vec![Op::Downs(vec![0]), Op::Ups(1)]);
    let composition_a = Rc::new(RefCell::new(Composition::new(Box::new(composer_a))));
    let applier_a: Rc<RefCell<dyn crate::applier::Applier>> = Rc::new(RefCell::new(MemoryApplier::new()));
    recomposer.register_composition(Rc::clone(&composition_a), applier_a);

    let mut composer_b = ScriptedComposer::new();
    composer_b.push_pass(vec![Op::Downs(vec![0]), Op::Ups(1)]);
    let composition_b = Rc::new(RefCell::new(Composition::new(Box::new(composer_b))));
    let applier_b: Rc<RefCell<dyn crate::applier::Applier>> = Rc::new(RefCell::new(MemoryApplier::new()));
    recomposer.register_composition(Rc::clone(&composition_b), applier_b);

    let scope_a = RecomposeScope::new(Anchor::new(0));
    composition_a.borrow_mut().invalidate(&scope_a, None);
    let scope_b = RecomposeScope::new(Anchor::new(0));
    composition_b.borrow_mut().invalidate(&scope_b, None);

    let executor = LabeledWorkerExecutor::new(vec!["w0", "w1"]);
    let summary = recomposer.run_one_frame(0, &executor).unwrap();

    assert_eq!(summary.recomposed, 2);
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.worker_labels, vec!["w0", "w1"]);
}

/// S2 / P9: two writes to the same observed value recorded before a single
/// recompose pass runs must not lose either one — the composer still sees
/// exactly one invalidation and the scope still recomposes.
#[test]
fn two_writes_before_one_recompose_are_coalesced_not_lost() {
    let mut composer = ScriptedComposer::new();
    composer.push_pass(vec![Op::Downs(vec![0]), Op::Ups(1)]);
    let mut composition = Composition::new(Box::new(composer));

    let scope = RecomposeScope::new(Anchor::new(0));
    let value = observable(1);
    composition.record_read_of(&scope, &value);

    // Two independent "concurrent" writers append modifications before the
    // scheduler gets a chance to drain either into an invalidation.
    composition.record_modifications_of(vec![value.clone()]);
    composition.record_modifications_of(vec![value.clone()]);

    let had_changes = composition.recompose().unwrap();
    assert!(had_changes, "the coalesced write must still trigger the one queued pass");

    // A second recompose with nothing new pending finds no invalidations.
    let had_changes_again = composition.recompose().unwrap();
    assert!(!had_changes_again);
}

/// S3: a scope that is only reachable through a composition's observation
/// maps becomes reclaimable once that composition is disposed.
#[test]
fn disposing_a_composition_releases_its_observed_scopes() {
    let mut composition = Composition::new(Box::new(NoopComposer));
    let mut applier = MemoryApplier::new();

    let weak = {
        let scope = RecomposeScope::new(Anchor::new(0));
        let value = observable(7);
        composition.record_read_of(&scope, &value);
        scope.downgrade()
    };
    // Our local strong handle is gone; the observation map's clone keeps it
    // alive.
    assert!(weak.upgrade().is_some());

    composition.dispose(&mut applier);
    assert!(weak.upgrade().is_none());
}

struct TrackedHolder {
    remembered: Rc<Cell<bool>>,
    abandoned: Rc<Cell<bool>>,
}

impl RememberObserver for TrackedHolder {
    fn on_remembered(&self) {
        self.remembered.set(true);
    }
    fn on_abandoned(&self) {
        self.abandoned.set(true);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// S4: cancelling a paused composition mid-yield must never dispatch
/// `on_remembered` for a holder it queued, but always dispatch
/// `on_abandoned`.
#[test]
fn cancelling_a_paused_composition_abandons_instead_of_remembering() {
    let remembered = Rc::new(Cell::new(false));
    let abandoned = Rc::new(Cell::new(false));
    let holder: Holder = Rc::new(TrackedHolder {
        remembered: Rc::clone(&remembered),
        abandoned: Rc::clone(&abandoned),
    });

    let mut composer = ScriptedComposer::new();
    composer.push_pass(vec![Op::Remember(holder)]);
    let composition = Rc::new(RefCell::new(Composition::new(Box::new(composer))));
    let scope = RecomposeScope::new(Anchor::new(0));
    composition.borrow_mut().invalidate(&scope, None);

    let hub = SnapshotHub::new();
    let recomposer = Recomposer::new(RecomposerConfig::default(), Arc::clone(&hub));
    recomposer.start();

    let paused = recomposer.set_pausable_content(Rc::clone(&composition));
    paused.resume(&|| true).unwrap();
    assert!(!remembered.get());
    assert!(!abandoned.get());

    paused.cancel();
    assert!(!remembered.get(), "a cancelled pause must never remember its holder");
    assert!(abandoned.get(), "a cancelled pause must abandon every holder it queued");
}

/// S5: an extracted movable-content state round-trips by content identity
/// to whoever claims it, is consumed exactly once, and is discarded if
/// nothing ever claims it.
#[test]
fn movable_content_state_round_trips_by_identity_or_is_discarded() {
    let hub = SnapshotHub::new();
    let recomposer = Recomposer::new(RecomposerConfig::default(), Arc::clone(&hub));
    recomposer.start();

    let content = MovableContent::new();
    let marker: Rc<dyn Any> = Rc::new(42i32);
    let mut state = MovableContentState::new(content.clone());
    state.remembered.push(marker);
    let reference = StateReference::new(content.clone(), 0, CompositionId::new(0));
    recomposer.movable_content_state_released(&reference, state);

    let claimed = recomposer
        .take_movable_content_state(&reference)
        .expect("extracted state round-trips by content identity");
    assert!(claimed.content.same_content(&content));
    assert_eq!(claimed.remembered.len(), 1);
    assert!(
        recomposer.take_movable_content_state(&reference).is_none(),
        "a claimed state is consumed, not left around for a second claim"
    );

    // Nothing ever asked for this one's identity, so a frame's discard pass
    // throws it away instead of holding it forever.
    let unclaimed_reference = StateReference::new(content.clone(), 0, CompositionId::new(0));
    recomposer.movable_content_state_released(&unclaimed_reference, MovableContentState::new(content.clone()));
    recomposer.discard_unused_movable_content_state();
    assert!(recomposer.take_movable_content_state(&unclaimed_reference).is_none());
}

#[derive(Default)]
struct RetainLog {
    events: RefCell<Vec<&'static str>>,
}

struct LoggingHolder {
    log: Rc<RetainLog>,
}

impl Retainable for LoggingHolder {
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

/// S6: a retained holder that leaves composition under a keeping scope
/// comes back as the same instance when a group with identical keys
/// re-enters, and a fresh lifecycle for that recreated group runs its own
/// remembered/retained steps rather than inheriting the old one's state.
#[test]
fn retained_holder_survives_removal_and_reappears_identical_on_recreate() {
    let scope: Rc<dyn RetainScope> = {
        let s = ControlledRetainScope::new();
        s.start_keeping_exited_values();
        s
    };
    let log = Rc::new(RetainLog::default());
    let keys = RetainKeys {
        type_hash: 1,
        positional_key: 7,
        user_keys: Vec::new(),
    };

    let holder: Rc<dyn Retainable> = Rc::new(LoggingHolder { log: Rc::clone(&log) });
    let first_lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys.clone());
    first_lifecycle.on_remembered(holder.as_ref());
    first_lifecycle.on_forgotten(holder.clone());
    assert_eq!(*log.events.borrow(), vec!["retained", "entered", "exited"]);

    let recreated = scope
        .get_retained(&keys)
        .expect("the same keys must retrieve the instance the exiting group saved");
    assert!(Rc::ptr_eq(&recreated, &holder));

    let second_lifecycle = RetainedHolderLifecycle::new(Rc::downgrade(&scope), keys);
    second_lifecycle.on_remembered(recreated.as_ref());
    assert_eq!(
        *log.events.borrow(),
        vec!["retained", "entered", "exited", "retained", "entered"]
    );
}
