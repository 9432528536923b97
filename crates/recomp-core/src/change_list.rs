//! The operations VM: a queue of typed edits recorded during
//! composition and drained, in FIFO order, against the writer, applier, and
//! remember dispatcher together.
//!
//! Operations are a closed tagged union, encoded here as a plain `Op` enum
//! rather than a packed `(tag, ints, objects)` integer triple: a tagged enum
//! gets the same FIFO/atomic execution contract and is easy to reason about
//! without boxing every argument.

use crate::anchor::Anchor;
use crate::applier::Applier;
use crate::error::CoreError;
use crate::movable_content::{MovableContentState, StateReference};
use crate::recomposer::Recomposer;
use crate::remember::{Holder, RememberEventDispatcher};
use crate::slot_table::{SlotTable, SlotWriter};
use crate::{Key, NodeId};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A boxed value carried by an opcode. Kept as a type alias so call sites
/// read like the host-agnostic `Any?` it models.
pub type OpValue = Box<dyn Any>;

/// A side-effect closure, queued onto the remember dispatcher and run after
/// the change list has finished draining.
pub type OpClosure = Box<dyn FnOnce()>;

/// Everything an opcode needs to mutate state atomically.
pub struct OpContext<'a, 'w> {
    pub writer: &'a mut SlotWriter<'w>,
    pub applier: &'a mut dyn Applier,
    pub remember: &'a mut RememberEventDispatcher,
}

/// One recorded operation, grouped by concern: cursor, memoization, group,
/// node, sub-composition, movable content.
pub enum Op {
    // -- cursor -------------------------------------------------------
    Ups(u32),
    Downs(Vec<NodeId>),
    AdvanceSlotsBy(u32),

    // -- memoization ----------------------------------------------------
    Remember(Holder),
    SideEffect(OpClosure),
    RememberPausingScope(Holder),
    StartResumingScope(Holder),
    EndResumingScope(Holder),
    AppendValue(Anchor, OpValue),
    UpdateValue(OpValue, usize),
    UpdateAnchoredValue(OpValue, Anchor, usize),
    TrimParentValues(usize),
    UpdateAuxData(OpValue),

    // -- groups -----------------------------------------------------------
    EnsureRootGroupStarted,
    EnsureGroupStarted(Anchor),
    RemoveCurrentGroup,
    MoveCurrentGroup(i32),
    EndCurrentGroup,
    SkipToEndOfCurrentGroup,
    DeactivateCurrentGroup,

    // -- nodes --------------------------------------------------------
    UseCurrentNode,
    UpdateNode(OpValue, Box<dyn Fn(&mut dyn Any, &dyn Any)>),
    RemoveNode(usize, usize),
    MoveNode(usize, usize, usize),
    InsertNodeFixup {
        factory: Box<dyn FnOnce() -> NodeId>,
        insert_index: usize,
        group_anchor: Anchor,
    },
    PostInsertNodeFixup(usize, Anchor),

    // -- sub-composition ------------------------------------------------
    InsertSlots(Anchor, SlotTable),
    InsertSlotsWithFixups(Anchor, SlotTable, ChangeList),
    ApplyChangeList {
        changes: ChangeList,
        effective_node_index: usize,
    },
    EndCompositionScope(OpClosure),

    // -- movable content --------------------------------------------------
    ResetSlots,
    DetermineMovableContentNodeIndex(Rc<Cell<usize>>, Anchor),
    CopyNodesToNewAnchorLocation { index: usize, nodes: Vec<NodeId> },
    CopySlotTableToAnchorLocation(MovableContentState),
    EndMovableContentPlacement,
    ReleaseMovableGroupAtCurrent {
        recomposer: Rc<Recomposer>,
        reference: StateReference,
    },
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(op_label(self))
    }
}

/// Name of an opcode's variant, used for debug output and for tagging
/// errors raised while executing it.
fn op_label(op: &Op) -> &'static str {
    match op {
        Op::Ups(_) => "Ups",
        Op::Downs(_) => "Downs",
        Op::AdvanceSlotsBy(_) => "AdvanceSlotsBy",
        Op::Remember(_) => "Remember",
        Op::SideEffect(_) => "SideEffect",
        Op::RememberPausingScope(_) => "RememberPausingScope",
        Op::StartResumingScope(_) => "StartResumingScope",
        Op::EndResumingScope(_) => "EndResumingScope",
        Op::AppendValue(..) => "AppendValue",
        Op::UpdateValue(..) => "UpdateValue",
        Op::UpdateAnchoredValue(..) => "UpdateAnchoredValue",
        Op::TrimParentValues(_) => "TrimParentValues",
        Op::UpdateAuxData(_) => "UpdateAuxData",
        Op::EnsureRootGroupStarted => "EnsureRootGroupStarted",
        Op::EnsureGroupStarted(_) => "EnsureGroupStarted",
        Op::RemoveCurrentGroup => "RemoveCurrentGroup",
        Op::MoveCurrentGroup(_) => "MoveCurrentGroup",
        Op::EndCurrentGroup => "EndCurrentGroup",
        Op::SkipToEndOfCurrentGroup => "SkipToEndOfCurrentGroup",
        Op::DeactivateCurrentGroup => "DeactivateCurrentGroup",
        Op::UseCurrentNode => "UseCurrentNode",
        Op::UpdateNode(..) => "UpdateNode",
        Op::RemoveNode(..) => "RemoveNode",
        Op::MoveNode(..) => "MoveNode",
        Op::InsertNodeFixup { .. } => "InsertNodeFixup",
        Op::PostInsertNodeFixup(..) => "PostInsertNodeFixup",
        Op::InsertSlots(..) => "InsertSlots",
        Op::InsertSlotsWithFixups(..) => "InsertSlotsWithFixups",
        Op::ApplyChangeList { .. } => "ApplyChangeList",
        Op::EndCompositionScope(_) => "EndCompositionScope",
        Op::ResetSlots => "ResetSlots",
        Op::DetermineMovableContentNodeIndex(..) => "DetermineMovableContentNodeIndex",
        Op::CopyNodesToNewAnchorLocation { .. } => "CopyNodesToNewAnchorLocation",
        Op::CopySlotTableToAnchorLocation(_) => "CopySlotTableToAnchorLocation",
        Op::EndMovableContentPlacement => "EndMovableContentPlacement",
        Op::ReleaseMovableGroupAtCurrent { .. } => "ReleaseMovableGroupAtCurrent",
    }
}

/// Queue of recorded edits. Composition appends to the tail; `execute`
/// drains from the head.
#[derive(Default)]
pub struct ChangeList {
    ops: Vec<Op>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Move every recorded op from `other` onto the end of this list, for
    /// nested compositions whose change list is flattened into the parent's
    /// before `execute`.
    pub fn append(&mut self, mut other: ChangeList) {
        self.ops.append(&mut other.ops);
    }

    /// Run every recorded operation once, in FIFO order, in a single pass.
    /// Each operation mutates `ctx.writer`, `ctx.applier`, and
    /// `ctx.remember` together; a failing operation is tagged with its name
    /// before being returned.
    pub fn execute(&mut self, ctx: &mut OpContext) -> Result<(), CoreError> {
        for op in self.ops.drain(..) {
            let label = op_label(&op);
            if let Err(e) = execute_one(op, ctx) {
                return Err(CoreError::user_code(label, Vec::new(), e));
            }
        }
        Ok(())
    }
}

fn execute_one(op: Op, ctx: &mut OpContext) -> Result<(), String> {
    match op {
        Op::Ups(n) => {
            for _ in 0..n {
                ctx.applier.up();
            }
        }
        Op::Downs(nodes) => {
            for n in nodes {
                ctx.applier.down(n);
            }
        }
        Op::AdvanceSlotsBy(n) => {
            for _ in 0..n {
                ctx.writer.next_slot();
            }
        }
        Op::Remember(holder) => ctx.remember.remember(holder),
        Op::SideEffect(effect) => ctx.remember.side_effect(effect),
        Op::RememberPausingScope(holder) => ctx.remember.remember(holder),
        Op::StartResumingScope(holder) => ctx.remember.remember(holder),
        Op::EndResumingScope(_holder) => {}
        Op::AppendValue(_anchor, value) => {
            ctx.writer.append_value(value);
        }
        Op::UpdateValue(value, slot_index) => {
            ctx.writer.update_value(slot_index, value);
        }
        Op::UpdateAnchoredValue(value, _anchor, slot_index) => {
            ctx.writer.update_value(slot_index, value);
        }
        Op::TrimParentValues(count) => {
            ctx.writer.trim_parent_values(count);
        }
        Op::UpdateAuxData(value) => {
            ctx.writer.update_aux_data(value);
        }
        Op::EnsureRootGroupStarted => {
            if ctx.writer.table().group_count() == 0 {
                // The table has never held a root group: create it. Bracket
                // just this one `start_group` in its own insert span so the
                // global insert-depth counter isn't left elevated for
                // whatever op runs next, matching the begin/end pairing
                // every other fresh-group creation in this crate uses.
                ctx.writer.begin_insert();
                let result = ctx.writer.start_group(0, None, false, None);
                ctx.writer.end_insert();
                result.map_err(|e| e.to_string())?;
            } else {
                ctx.writer.ensure_group_started(0).map_err(|e| e.to_string())?;
            }
        }
        Op::EnsureGroupStarted(anchor) => {
            let index = ctx.writer.table().index_for_anchor(&anchor);
            ctx.writer.ensure_group_started(index).map_err(|e| e.to_string())?;
        }
        Op::RemoveCurrentGroup => {
            ctx.writer.remove_group().map_err(|e| e.to_string())?;
        }
        Op::MoveCurrentGroup(offset) => {
            if offset < 0 {
                return Err("MoveCurrentGroup with a negative offset is not supported".into());
            }
            ctx.writer
                .move_group(offset as usize)
                .map_err(|e| e.to_string())?;
        }
        Op::EndCurrentGroup => {
            ctx.writer.end_group().map_err(|e| e.to_string())?;
        }
        Op::SkipToEndOfCurrentGroup => {
            ctx.writer.skip_to_group_end().map_err(|e| e.to_string())?;
        }
        Op::DeactivateCurrentGroup => {
            ctx.writer.bash_current_group();
        }
        Op::UseCurrentNode => {}
        Op::UpdateNode(value, apply) => {
            ctx.applier.apply_to_current(&*apply, value.as_ref());
        }
        Op::RemoveNode(index, count) => {
            ctx.applier.remove(index, count);
        }
        Op::MoveNode(from, to, count) => {
            ctx.applier.move_range(from, to, count);
        }
        Op::InsertNodeFixup {
            factory,
            insert_index,
            group_anchor: _,
        } => {
            let node = factory();
            ctx.applier.insert_bottom_up(insert_index, node);
        }
        Op::PostInsertNodeFixup(insert_index, group_anchor) => {
            let index = ctx.writer.table().index_for_anchor(&group_anchor);
            if let Some(node) = ctx.writer.node_at(index) {
                ctx.applier.insert_top_down(insert_index, node);
            }
        }
        Op::InsertSlots(anchor, mut source_table) => {
            let index = source_table.index_for_anchor(&anchor);
            let mut source_writer = source_table.open_writer().map_err(|e| e.to_string())?;
            ctx.writer
                .move_from(&mut source_writer, index, true)
                .map_err(|e| e.to_string())?;
        }
        Op::InsertSlotsWithFixups(anchor, mut source_table, mut fixups) => {
            let index = source_table.index_for_anchor(&anchor);
            let mut source_writer = source_table.open_writer().map_err(|e| e.to_string())?;
            ctx.writer
                .move_from(&mut source_writer, index, true)
                .map_err(|e| e.to_string())?;
            drop(source_writer);
            fixups.execute(ctx).map_err(|e| e.to_string())?;
        }
        Op::ApplyChangeList {
            mut changes,
            effective_node_index: _,
        } => {
            changes.execute(ctx).map_err(|e| e.to_string())?;
        }
        Op::EndCompositionScope(effect) => {
            ctx.remember.side_effect(effect);
        }
        Op::ResetSlots => {
            ctx.writer.reset_slots().map_err(|e| e.to_string())?;
        }
        Op::DetermineMovableContentNodeIndex(out, anchor) => {
            let index = ctx.writer.table().index_for_anchor(&anchor);
            out.set(ctx.writer.table().node_count_at(index));
        }
        Op::CopyNodesToNewAnchorLocation { index, nodes } => {
            for (i, n) in nodes.into_iter().enumerate() {
                ctx.applier.insert_top_down(index + i, n);
            }
        }
        Op::CopySlotTableToAnchorLocation(mut state) => {
            if let Some(mut extracted) = state.extracted.take() {
                let mut source_writer = extracted.open_writer().map_err(|e| e.to_string())?;
                ctx.writer
                    .move_from(&mut source_writer, 0, true)
                    .map_err(|e| e.to_string())?;
            }
        }
        Op::EndMovableContentPlacement => {
            if ctx.writer.is_inserting() {
                ctx.writer.end_insert();
            }
        }
        Op::ReleaseMovableGroupAtCurrent { recomposer, reference } => {
            let index = ctx.writer.cursor();
            let mut extracted_table = SlotTable::new();
            {
                let mut extracted_writer = extracted_table.open_writer().map_err(|e| e.to_string())?;
                extracted_writer.begin_insert();
                extracted_writer
                    .move_from(ctx.writer, index, true)
                    .map_err(|e| e.to_string())?;
                extracted_writer.end_insert();
            }
            let mut state = MovableContentState::new(reference.content.clone());
            state.extracted = Some(extracted_table);
            recomposer.movable_content_state_released(&reference, state);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/change_list_tests.rs"]
mod tests;
