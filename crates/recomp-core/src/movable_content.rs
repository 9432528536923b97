//! Movable content: a subtree identity that can migrate between
//! compositions within one frame. A `MovableContentState` is the extracted
//! slot range + anchored scopes of a detached region; a `StateReference`
//! carries the identity a removal and a later insert are paired by.

use crate::recompose_scope::RecomposeScope;
use crate::recomposer::CompositionId;
use crate::slot_table::SlotTable;
use std::any::Any;
use std::rc::Rc;

/// Opaque identity for a piece of movable content, stable across the
/// composition(s) it migrates between. Identity-equatable, never contents-
/// equatable: two `MovableContent` handles are "the same" iff they share the
/// same allocation.
#[derive(Clone)]
pub struct MovableContent {
    inner: Rc<()>,
}

impl MovableContent {
    pub fn new() -> Self {
        Self { inner: Rc::new(()) }
    }

    pub fn same_content(&self, other: &MovableContent) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl Default for MovableContent {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MovableContent {
    fn eq(&self, other: &Self) -> bool {
        self.same_content(other)
    }
}
impl Eq for MovableContent {}

impl std::hash::Hash for MovableContent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// The extracted slot range + anchored scopes of a detached movable region,
/// produced when a composition removes a group holding movable content.
pub struct MovableContentState {
    pub content: MovableContent,
    /// Recompose scopes that were anchored inside the removed range; their
    /// owner must be rebound to whichever composition re-inserts this state.
    pub scopes: Vec<RecomposeScope>,
    /// Opaque remembered values captured with the region, handed back to the
    /// composer driving the re-insertion so it can restore them verbatim
    /// instead of re-running user code.
    pub remembered: Vec<Rc<dyn Any>>,
    /// Nested movable-content states found inside this one, keyed by their
    /// own content identity, extracted lazily when this state is released
    /// (when the container's state is released).
    pub nested: Vec<MovableContentState>,
    /// The detached group and its descendants, physically moved out of the
    /// owning composition's slot table by
    /// [`crate::change_list::Op::ReleaseMovableGroupAtCurrent`]. `None` until
    /// that op has run; insertion copies out of this table via
    /// [`crate::change_list::Op::CopySlotTableToAnchorLocation`].
    pub extracted: Option<SlotTable>,
}

impl MovableContentState {
    pub fn new(content: MovableContent) -> Self {
        Self {
            content,
            scopes: Vec::new(),
            remembered: Vec::new(),
            nested: Vec::new(),
            extracted: None,
        }
    }

    /// Rebind every anchored scope's composition owner. Anchors themselves
    /// are relocatable and need no change; only bookkeeping that names "the
    /// composition that owns this scope" changes. Concretely this crate's
    /// `RecomposeScope` carries no owner field (the table, not the scope,
    /// owns the composition link), so rebinding reduces to handing the
    /// scopes to the destination composition's observation maps, which the
    /// caller does when it calls `Composition::adopt_moved_scopes`.
    pub fn take_scopes(&mut self) -> Vec<RecomposeScope> {
        std::mem::take(&mut self.scopes)
    }
}

/// A reference into a removed-or-pending movable content region, threaded
/// between the composition that lost it and the Recomposer's rendezvous
/// tables.
pub struct StateReference {
    pub content: MovableContent,
    pub container_group: usize,
    pub nested_references: Vec<StateReference>,
    /// Which registered composition this reference belongs to — the
    /// recomposer's late-apply pass needs this to know which composition to
    /// drain, since the position of a reference in the pending-insert queue
    /// carries no such information.
    pub composition: CompositionId,
}

impl StateReference {
    pub fn new(content: MovableContent, container_group: usize, composition: CompositionId) -> Self {
        Self {
            content,
            container_group,
            nested_references: Vec::new(),
            composition,
        }
    }
}

#[cfg(test)]
#[path = "tests/movable_content_tests.rs"]
mod tests;
