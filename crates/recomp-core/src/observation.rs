//! Per-composition observation maps: what each recompose scope read,
//! which derived states bridge further reads, and the invalidation set a
//! recompose pass drains.

use crate::collections::map::HashMap;
use crate::recompose_scope::RecomposeScope;
use crate::slot_table::ScopeInvalidated;
use smallvec::SmallVec;
use std::any::Any;
use std::rc::Rc;

/// Most observed values are read by only a handful of scopes at once, so the
/// per-value scope list stays inline until it grows past this many entries.
const INLINE_SCOPES: usize = 4;

/// A list of scopes observing one value. Stays stack-allocated for the
/// common case (a handful of readers) and only heap-allocates past
/// [`INLINE_SCOPES`] entries.
type ScopeList = SmallVec<[RecomposeScope; INLINE_SCOPES]>;

/// Anything read during composition that can be compared by pointer
/// identity: plain observable state cells and [`DerivedState`] alike.
pub type ObservableKey = Rc<dyn Any>;

fn key_id(key: &ObservableKey) -> usize {
    Rc::as_ptr(key) as *const () as usize
}

/// A computed value that re-derives from other observables. Holds its own
/// identity plus a snapshot of the upstream keys it last depended on, so a
/// write to any upstream can be checked against the stored value before
/// invalidating readers.
pub struct DerivedState {
    pub dependencies: Vec<ObservableKey>,
    pub last_value: Box<dyn Any>,
}

/// What a call to [`Composition::invalidate`]-style resolution reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationResult {
    Ignored,
    Deferred,
    Scheduled,
    Imminent,
}

/// Sentinel or specific-instance payload stored per invalidated scope.
pub enum InvalidationCause {
    ScopeInvalidated(ScopeInvalidated),
    Instance(ObservableKey),
}

#[derive(Default)]
pub struct ObservationMaps {
    observations: HashMap<usize, ScopeList>,
    derived_states: HashMap<usize, Vec<usize>>,
    observations_processed: HashMap<usize, ScopeList>,
    invalidations: HashMap<usize, InvalidationCause>,
    derived_by_id: HashMap<usize, DerivedState>,
}

impl ObservationMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read: mark `scope` as having read `value` during its
    /// current composition.
    pub fn record_read_of(&mut self, scope: &RecomposeScope, value: &ObservableKey) {
        scope.mark_used();
        let id = key_id(value);
        self.observations.entry(id).or_default().push(scope.clone());
    }

    /// Registers `value` as a derived state whose current dependency set is
    /// `dependencies`; replaces any prior bookkeeping for the same identity.
    pub fn record_derived_state(
        &mut self,
        value: &ObservableKey,
        dependencies: Vec<ObservableKey>,
        current_value: Box<dyn Any>,
    ) {
        let id = key_id(value);
        if let Some(prev) = self.derived_by_id.get(&id) {
            for dep in &prev.dependencies {
                let dep_id = key_id(dep);
                if let Some(list) = self.derived_states.get_mut(&dep_id) {
                    list.retain(|&v| v != id);
                }
            }
        }
        for dep in &dependencies {
            let dep_id = key_id(dep);
            self.derived_states.entry(dep_id).or_default().push(id);
        }
        self.derived_by_id.insert(
            id,
            DerivedState {
                dependencies,
                last_value: current_value,
            },
        );
    }

    /// Records a write: invalidate every scope that directly observed
    /// `value`, plus every scope that observed a derived state transitively
    /// depending on it.
    pub fn record_write_of(&mut self, value: &ObservableKey) -> Vec<RecomposeScope> {
        let mut touched = Vec::new();
        let mut frontier = vec![key_id(value)];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = frontier.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(scopes) = self.observations.get(&id) {
                touched.extend(scopes.iter().cloned());
            }
            if let Some(dependents) = self.derived_states.get(&id) {
                frontier.extend(dependents.iter().copied());
            }
        }
        touched
    }

    pub fn mark_processed(&mut self, value: &ObservableKey, scope: RecomposeScope) {
        let id = key_id(value);
        self.observations_processed.entry(id).or_default().push(scope);
    }

    pub fn was_processed(&self, value: &ObservableKey, scope: &RecomposeScope) -> bool {
        let id = key_id(value);
        self.observations_processed
            .get(&id)
            .map(|list| list.iter().any(|s| s == scope))
            .unwrap_or(false)
    }

    pub fn invalidate_unconditionally(&mut self, scope: &RecomposeScope) {
        self.invalidations
            .insert(scope.id(), InvalidationCause::ScopeInvalidated(ScopeInvalidated));
    }

    pub fn invalidate_with_instance(&mut self, scope: &RecomposeScope, instance: ObservableKey) {
        self.invalidations
            .insert(scope.id(), InvalidationCause::Instance(instance));
    }

    /// Capture and clear the invalidation set step 3 ("capture and
    /// reset the invalidation set").
    pub fn drain_invalidations(&mut self) -> HashMap<usize, InvalidationCause> {
        std::mem::take(&mut self.invalidations)
    }

    /// Invalidates every scope that has ever been observed reading
    /// anything, for a live-edit structural change whose invalidated groups
    /// have no recoverable restart boundary — the caller falls back to
    /// treating the whole composition as dirty rather than a precise subset.
    pub fn invalidate_all_known_scopes(&mut self) -> Vec<RecomposeScope> {
        let mut seen = std::collections::HashSet::new();
        let mut all = Vec::new();
        for scopes in self.observations.values() {
            for scope in scopes {
                if seen.insert(scope.id()) {
                    all.push(scope.clone());
                }
            }
        }
        for scope in &all {
            self.invalidate_unconditionally(scope);
        }
        all
    }

    /// Drop the bookkeeping accumulated for one composition pass, keeping
    /// derived-state dependency edges (which persist across passes).
    pub fn clear_observations(&mut self) {
        self.observations.clear();
        self.observations_processed.clear();
    }

    /// Drop every map, including derived-state edges and pending
    /// invalidations. Called when a composition is disposed: every
    /// `RecomposeScope` this map's `ScopeList`s hold a strong reference to
    /// must be released so a scope with no other owner becomes reclaimable.
    pub fn clear_all(&mut self) {
        self.observations.clear();
        self.derived_states.clear();
        self.observations_processed.clear();
        self.invalidations.clear();
        self.derived_by_id.clear();
    }
}

#[cfg(test)]
#[path = "tests/observation_tests.rs"]
mod tests;
