//! Composition: the per-tree façade holding one slot table, one
//! change list pair, the observation maps, and the pending-
//! modifications queue that bridges snapshot writes into invalidations.

use crate::applier::Applier;
use crate::change_list::{ChangeList, OpContext};
use crate::error::CoreError;
use crate::observation::{InvalidationCause, InvalidationResult, ObservableKey, ObservationMaps};
use crate::recompose_scope::{RecomposeScope, ScopeState};
use crate::remember::RememberEventDispatcher;
use crate::slot_table::SlotTable;
use crate::Key;
use std::cell::{Cell, RefCell};

/// The composer contract: the front-end that walks user code and emits
/// groups/slots. Its internal algorithm is out of scope; this crate
/// only needs the call it makes back into a composition during a recompose
/// pass.
pub trait Composer {
    /// Re-execute every scope named by `invalid` (or, if `invalid` carries
    /// [`crate::slot_table::ScopeInvalidated`], unconditionally), recording
    /// reads/writes through `observations` and appending edits to `changes`.
    /// Returns `Ok(true)` iff at least one operation was appended.
    fn recompose(
        &mut self,
        invalid: &crate::collections::map::HashMap<usize, InvalidationCause>,
        observations: &mut ObservationMaps,
        changes: &mut ChangeList,
    ) -> Result<bool, CoreError>;

    /// Called when a pausable composition yields mid-composition.
    fn report_paused_scope(&mut self, _scope: RecomposeScope) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionState {
    Running,
    Deactivated,
    Inconsistent,
    Disposed,
}

/// Composition's pending-modifications slot. Modelled as a lock-free
/// atomic reference (`null` / sentinel / one batch / coalesced batches) so
/// concurrent snapshot-apply observers never block each other; this crate's
/// compositions are single-threaded per composition, so a `RefCell` gives
/// the same CAS-append semantics without the atomics.
enum PendingModifications {
    None,
    PendingNoModifications,
    One(Vec<ObservableKey>),
    Many(Vec<Vec<ObservableKey>>),
}

impl PendingModifications {
    fn append(&mut self, values: Vec<ObservableKey>) {
        if values.is_empty() {
            return;
        }
        *self = match std::mem::replace(self, PendingModifications::None) {
            PendingModifications::None | PendingModifications::PendingNoModifications => {
                PendingModifications::One(values)
            }
            PendingModifications::One(existing) => PendingModifications::Many(vec![existing, values]),
            PendingModifications::Many(mut batches) => {
                batches.push(values);
                PendingModifications::Many(batches)
            }
        };
    }

    fn mark_pending_no_modifications(&mut self) {
        if matches!(self, PendingModifications::None) {
            *self = PendingModifications::PendingNoModifications;
        }
    }

    fn drain(&mut self) -> Vec<ObservableKey> {
        match std::mem::replace(self, PendingModifications::None) {
            PendingModifications::None | PendingModifications::PendingNoModifications => Vec::new(),
            PendingModifications::One(v) => v,
            PendingModifications::Many(batches) => batches.into_iter().flatten().collect(),
        }
    }
}

/// Per-tree façade: one slot table, one composer, two change lists,
/// the observation maps, and the pending-modifications bridge from
/// snapshot writes to invalidations.
pub struct Composition {
    state: Cell<CompositionState>,
    table: SlotTable,
    changes: ChangeList,
    late_changes: ChangeList,
    observations: ObservationMaps,
    remember: RememberEventDispatcher,
    composer: Box<dyn Composer>,
    pending: RefCell<PendingModifications>,
    /// Set by a `PausedComposition` (owned by the Recomposer) while it
    /// holds an in-flight cooperative composition this composition cannot
    /// safely recompose over.
    paused_incomplete: Cell<bool>,
}

impl Composition {
    pub fn new(composer: Box<dyn Composer>) -> Self {
        Self {
            state: Cell::new(CompositionState::Running),
            table: SlotTable::new(),
            changes: ChangeList::new(),
            late_changes: ChangeList::new(),
            observations: ObservationMaps::new(),
            remember: RememberEventDispatcher::new(),
            composer,
            pending: RefCell::new(PendingModifications::None),
            paused_incomplete: Cell::new(false),
        }
    }

    pub fn state(&self) -> CompositionState {
        self.state.get()
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub fn set_paused_incomplete(&self, incomplete: bool) {
        self.paused_incomplete.set(incomplete);
    }

    pub fn is_paused_incomplete(&self) -> bool {
        self.paused_incomplete.get()
    }

    /// CAS-appends a batch of changed values
    /// onto the pending-modifications slot.
    pub fn record_modifications_of(&self, values: Vec<ObservableKey>) {
        self.pending.borrow_mut().append(values);
    }

    pub fn mark_pending_apply(&self) {
        self.pending.borrow_mut().mark_pending_no_modifications();
    }

    pub fn has_pending_modifications(&self) -> bool {
        !matches!(*self.pending.borrow(), PendingModifications::None)
    }

    /// `recordReadOf`: mark `scope` as having read `value` during its
    /// current composition, skipping while a child composition is active
    /// (the composer, not this crate, tracks that nesting and simply won't
    /// call this while suppressed).
    pub fn record_read_of(&mut self, scope: &RecomposeScope, value: &ObservableKey) {
        self.observations.record_read_of(scope, value);
    }

    /// `recordWriteOf`: invalidate every scope keyed by `value` directly or
    /// transitively through a derived state, returning the touched scopes so
    /// the caller (typically the Recomposer) can decide which compositions
    /// to re-enqueue.
    pub fn record_write_of(&mut self, value: &ObservableKey) -> Vec<RecomposeScope> {
        let touched = self.observations.record_write_of(value);
        for scope in &touched {
            if !scope.is_released() {
                self.observations.invalidate_unconditionally(scope);
                scope.mark_invalid();
            }
        }
        touched
    }

    /// Invalidates `scope` given `instance`. Resolution order: ignore a
    /// released scope; report `Imminent` if the scope is actively composing
    /// right now (the composer will pick it up without a separate pass);
    /// otherwise record the cause and report `Scheduled`.
    pub fn invalidate(&mut self, scope: &RecomposeScope, instance: Option<ObservableKey>) -> InvalidationResult {
        if scope.is_released() {
            return InvalidationResult::Ignored;
        }
        match instance {
            Some(v) => self.observations.invalidate_with_instance(scope, v),
            None => self.observations.invalidate_unconditionally(scope),
        }
        if scope.state() == ScopeState::Composing {
            InvalidationResult::Imminent
        } else {
            scope.mark_invalid();
            InvalidationResult::Scheduled
        }
    }

    /// Runs the recompose steps. Returns `Ok(true)` iff the change list
    /// ended up non-empty.
    pub fn recompose(&mut self) -> Result<bool, CoreError> {
        if self.state.get() != CompositionState::Running {
            return Ok(false);
        }
        if self.paused_incomplete.get() {
            return Ok(false);
        }

        self.drain_pending_into_invalidations();

        let invalid = self.observations.drain_invalidations();
        if invalid.is_empty() {
            return Ok(false);
        }

        let had_changes = self.composer.recompose(&invalid, &mut self.observations, &mut self.changes)?;

        if !had_changes {
            // Step 4: don't let modifications recorded mid-pass disappear.
            self.drain_pending_into_invalidations();
        }
        Ok(had_changes)
    }

    /// Live-edit structural invalidation: sweep the slot table for every
    /// group keyed by `key` (or bashed with the live-edit sentinel), collect
    /// their nearest enclosing recompose scopes, and mark those invalid. If
    /// any matched group has no recoverable restart boundary, every scope
    /// this composition has ever observed is invalidated instead, forcing a
    /// full recomposition.
    pub fn invalidate_groups_with_key(&mut self, key: Key) -> Result<(), CoreError> {
        let scopes = {
            let writer = self.table.open_writer()?;
            writer.invalidate_groups_with_key(key)
        };
        let touched = match scopes {
            Some(scopes) => {
                for scope in &scopes {
                    if !scope.is_released() {
                        self.observations.invalidate_unconditionally(scope);
                    }
                }
                scopes
            }
            None => self.observations.invalidate_all_known_scopes(),
        };
        for scope in &touched {
            if !scope.is_released() {
                scope.mark_invalid();
            }
        }
        Ok(())
    }

    fn drain_pending_into_invalidations(&mut self) {
        let drained = self.pending.borrow_mut().drain();
        for value in drained {
            let touched = self.observations.record_write_of(&value);
            for scope in touched {
                if !scope.is_released() {
                    self.observations.invalidate_unconditionally(&scope);
                    scope.mark_invalid();
                }
            }
        }
    }

    /// Drains `changes` through the writer + applier +
    /// remember dispatcher, dispatch remembered/side-effect callbacks, then
    /// — if movable content left late work — apply `lateChanges` too.
    pub fn apply_changes(&mut self, applier: &mut dyn Applier) -> Result<(), CoreError> {
        applier.on_begin_changes();
        let result = self.drain_change_list(false, applier);
        applier.on_end_changes();
        match result {
            Ok(()) => {
                self.remember.dispatch();
                if !self.late_changes.is_empty() {
                    self.apply_late_changes(applier)?;
                }
                Ok(())
            }
            Err(e) => {
                self.remember.dispatch_abandons();
                self.state.set(CompositionState::Inconsistent);
                Err(e)
            }
        }
    }

    /// Applies movable-content insertions that required
    /// the prior deletes to have already landed.
    pub fn apply_late_changes(&mut self, applier: &mut dyn Applier) -> Result<(), CoreError> {
        match self.drain_change_list(true, applier) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.remember.dispatch_abandons();
                self.state.set(CompositionState::Inconsistent);
                Err(e)
            }
        }
    }

    fn drain_change_list(&mut self, late: bool, applier: &mut dyn Applier) -> Result<(), CoreError> {
        let mut writer = self.table.open_writer()?;
        let mut ctx = OpContext {
            writer: &mut writer,
            applier,
            remember: &mut self.remember,
        };
        if late {
            self.late_changes.execute(&mut ctx)
        } else {
            self.changes.execute(&mut ctx)
        }
    }

    pub fn push_late_changes(&mut self, changes: ChangeList) {
        self.late_changes.append(changes);
    }

    /// Rebind `scopes` (lifted out of a [`crate::movable_content::MovableContentState`]
    /// by a different composition) as belonging to this one. This crate's
    /// scopes carry no owner field (the one-way ownership rule), so
    /// rebinding reduces to making the scopes recomposable here: clear any
    /// stale invalidation they carried under the old owner and let the next
    /// read establish fresh observations under this composition's maps.
    pub fn adopt_moved_scopes(&mut self, scopes: Vec<RecomposeScope>) {
        for scope in scopes {
            if !scope.is_released() {
                scope.mark_valid();
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == CompositionState::Disposed
    }

    pub(crate) fn remember_dispatcher_mut(&mut self) -> &mut RememberEventDispatcher {
        &mut self.remember
    }

    /// Drains `changes` (whatever the last `recompose()` produced) through
    /// `applier` without dispatching remember/side-effect callbacks yet.
    /// Used by [`crate::recomposer::PausedComposition::resume`], which
    /// targets a [`crate::applier::RecordingApplier`] mirror instead of the
    /// live tree so a cooperative yield never leaves the real tree
    /// half-mutated; the remembers this populates are only dispatched once
    /// [`crate::recomposer::PausedComposition::apply`] replays successfully.
    pub(crate) fn drain_into_recording(&mut self, applier: &mut dyn Applier) -> Result<(), CoreError> {
        self.drain_change_list(false, applier)
    }

    /// Dispatches whatever remember/side-effect callbacks accumulated from a
    /// prior [`Composition::drain_into_recording`], called once the paused
    /// composition's recording has been replayed onto the real applier.
    pub(crate) fn dispatch_remembers(&mut self) {
        self.remember.dispatch();
    }

    /// Called when a paused composition is cancelled: forces the host composition into
    /// `Inconsistent`, which `recompose`/`apply_changes` both already treat
    /// as unusable, so the caller's only remaining move is `dispose`.
    pub(crate) fn mark_inconsistent(&self) {
        self.state.set(CompositionState::Inconsistent);
    }

    pub fn has_late_changes(&self) -> bool {
        !self.late_changes.is_empty()
    }

    pub fn deactivate(&self) {
        if self.state.get() == CompositionState::Running {
            self.state.set(CompositionState::Deactivated);
        }
    }

    pub fn reactivate(&self) {
        if self.state.get() == CompositionState::Deactivated {
            self.state.set(CompositionState::Running);
        }
    }

    /// Disposes the composition: apply deferred movable-content changes, then remove
    /// every group so remember observers receive `onForgotten`, clear the
    /// applier, and dispatch any abandons.
    pub fn dispose(&mut self, applier: &mut dyn Applier) {
        if self.state.get() == CompositionState::Disposed {
            return;
        }
        if !self.late_changes.is_empty() {
            let _ = self.apply_late_changes(applier);
        }
        if let Ok(mut writer) = self.table.open_writer() {
            while writer.table().group_count() > 0 {
                if writer.remove_group().is_err() {
                    break;
                }
            }
        }
        self.remember.dispatch();
        self.remember.dispatch_abandons();
        applier.clear();
        self.observations.clear_all();
        self.state.set(CompositionState::Disposed);
    }
}

#[cfg(test)]
#[path = "tests/composition_tests.rs"]
mod tests;
