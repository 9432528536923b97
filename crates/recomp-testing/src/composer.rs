//! Stand-ins for the composer contract, which recomp-core treats as an
//! external collaborator. Real composers walk user code and emit
//! groups/slots; these just replay whatever a test pre-scripted.

use recomp_core::change_list::{ChangeList, Op};
use recomp_core::collections::map::HashMap;
use recomp_core::observation::{InvalidationCause, ObservationMaps};
use recomp_core::{Composer, CoreError};
use std::collections::VecDeque;

/// A composer that never produces a change, used wherever a test only needs
/// a composition to exist (e.g. exercising `Recomposer` registration/dispose
/// plumbing) without caring what composing would actually do.
#[derive(Default)]
pub struct NoopComposer;

impl Composer for NoopComposer {
    fn recompose(
        &mut self,
        _invalid: &HashMap<usize, InvalidationCause>,
        _observations: &mut ObservationMaps,
        _changes: &mut ChangeList,
    ) -> Result<bool, CoreError> {
        Ok(false)
    }
}

/// A composer driven by a queue of pre-built passes: each call to
/// `recompose` pops the next queued pass (if any) and appends its ops to the
/// change list, regardless of which scopes were actually invalidated. This
/// mirrors a headless robot harness driving a fixed content
/// closure instead of a dynamic one — here the "content" is the literal
/// sequence of ops a test wants executed.
#[derive(Default)]
pub struct ScriptedComposer {
    passes: VecDeque<Vec<Op>>,
}

impl ScriptedComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a pass. An empty pass is a legal no-op recompose (matches a
    /// composer that found nothing to do for this invalidation).
    pub fn push_pass(&mut self, ops: Vec<Op>) -> &mut Self {
        self.passes.push_back(ops);
        self
    }

    pub fn pending_passes(&self) -> usize {
        self.passes.len()
    }
}

impl Composer for ScriptedComposer {
    fn recompose(
        &mut self,
        _invalid: &HashMap<usize, InvalidationCause>,
        _observations: &mut ObservationMaps,
        changes: &mut ChangeList,
    ) -> Result<bool, CoreError> {
        let Some(ops) = self.passes.pop_front() else {
            return Ok(false);
        };
        let had_changes = !ops.is_empty();
        for op in ops {
            changes.push(op);
        }
        Ok(had_changes)
    }
}
