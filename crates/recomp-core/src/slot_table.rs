//! The slot table: a gap-buffered, anchor-indexed forest of groups.
//!
//! Two parallel gap buffers back the table: [`GroupRecord`]s (fixed 5-integer
//! rows) and heterogeneous [`SlotCell`]s. This is the persistent
//! representation of what the last composition produced and the sole source
//! of truth incremental recomposition reads and writes.

use crate::anchor::{self, Anchor};
use crate::bits;
use crate::error::CoreError;
use crate::recompose_scope::RecomposeScope;
use crate::{Key, NodeId};
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

pub const LIVE_EDIT_INVALID_KEY: Key = -3;

/// A fixed 5-integer group record.
#[derive(Clone, Copy)]
struct GroupRecord {
    key: Key,
    info: u32,
    parent_anchor: i32,
    size: i32,
    data_anchor: i32,
}

impl GroupRecord {
    const TOMBSTONE: GroupRecord = GroupRecord {
        key: 0,
        info: 0,
        parent_anchor: 0,
        size: 0,
        data_anchor: 0,
    };
}

enum SlotCell {
    /// Gap filler; must be this between writer operations (P5).
    Null,
    Node(NodeId),
    Value(Box<dyn Any>),
}

impl SlotCell {
    fn is_null(&self) -> bool {
        matches!(self, SlotCell::Null)
    }
}

/// Singleton sentinel returned by reads taken while in "empty" scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

/// Singleton sentinel carried in the invalidations map for an unconditional
/// (non-instance-specific) invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeInvalidated;

#[derive(Default)]
pub struct SlotTable {
    groups: Vec<GroupRecord>,
    group_gap_start: usize,
    group_gap_len: usize,

    slots: Vec<SlotCell>,
    slot_gap_start: usize,
    slot_gap_len: usize,

    anchors: Vec<Anchor>,

    version: Cell<u32>,
    reader_count: Cell<u32>,
    writer_open: Cell<bool>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups_logical_size() == 0
    }

    pub fn group_count(&self) -> usize {
        self.groups_logical_size()
    }

    #[inline]
    fn groups_logical_size(&self) -> usize {
        self.groups.len() - self.group_gap_len
    }

    #[inline]
    fn slots_logical_size(&self) -> usize {
        self.slots.len() - self.slot_gap_len
    }

    /// Branchless physical address translation (design notes ).
    #[inline]
    fn group_address(&self, index: usize) -> usize {
        index + self.group_gap_len * (index >= self.group_gap_start) as usize
    }

    #[inline]
    fn slot_address(&self, index: usize) -> usize {
        index + self.slot_gap_len * (index >= self.slot_gap_start) as usize
    }

    fn group(&self, index: usize) -> &GroupRecord {
        &self.groups[self.group_address(index)]
    }

    fn group_mut(&mut self, index: usize) -> &mut GroupRecord {
        let addr = self.group_address(index);
        &mut self.groups[addr]
    }

    // -- anchors ---------------------------------------------------------

    fn encode_group_anchor(&self, index: usize) -> i32 {
        anchor::encode(index, self.group_gap_start, self.groups_logical_size())
    }

    fn decode_group_anchor(&self, location: i32) -> usize {
        anchor::decode(location, self.groups_logical_size())
    }

    fn encode_data_anchor(&self, index: usize) -> i32 {
        anchor::encode(index, self.slot_gap_start, self.slots_logical_size())
    }

    fn decode_data_anchor(&self, location: i32) -> usize {
        anchor::decode(location, self.slots_logical_size())
    }

    /// Resolves an owned [`Anchor`] back to the group index it currently
    /// tracks. The inverse of [`SlotTable::anchor_for`].
    pub(crate) fn index_for_anchor(&self, anchor: &Anchor) -> usize {
        anchor::decode(anchor.location(), self.groups_logical_size())
    }

    /// The node count recorded for the group at `index` (its own node, if it
    /// is one, otherwise the total descendant node count).
    pub(crate) fn node_count_at(&self, index: usize) -> usize {
        let rec = self.group(index);
        if bits::is_node(rec.info) {
            1
        } else {
            bits::node_count(rec.info) as usize
        }
    }

    /// Allocate a fresh, owned anchor for logical group index `index`.
    fn anchor_for(&mut self, index: usize) -> Anchor {
        let loc = self.encode_group_anchor(index);
        let a = Anchor::new(loc);
        self.anchors.push(a.clone());
        a
    }

    /// P4: every owning anchor's packed location must track group-gap moves.
    /// Called whenever the group gap relocates across a range of anchors.
    fn reencode_anchors_crossing(&mut self, old_gap_start: usize, new_gap_start: usize) {
        let logical = self.groups_logical_size();
        let (lo, hi) = if old_gap_start <= new_gap_start {
            (old_gap_start, new_gap_start)
        } else {
            (new_gap_start, old_gap_start)
        };
        self.anchors.retain(|a| a.is_valid());
        for a in &self.anchors {
            let idx = anchor::decode(a.location(), logical);
            if idx >= lo && idx < hi {
                a.set_location(anchor::encode(idx, new_gap_start, logical));
            }
        }
    }

    fn invalidate_anchors_in_removed_range(&mut self, start: usize, end: usize) {
        let logical = self.groups_logical_size();
        for a in &self.anchors {
            if !a.is_valid() {
                continue;
            }
            let idx = anchor::decode(a.location(), logical);
            if idx > start && idx < end {
                // strictly inside, per spec (the start group itself is the
                // removed group's own identity and is handled by the caller)
                a.invalidate();
            } else if idx == start {
                a.invalidate();
            }
        }
        self.anchors.retain(|a| a.is_valid());
    }

    // -- reader / writer lifecycle ----------------------------------------

    pub fn open_reader(&self) -> SlotReader<'_> {
        self.reader_count.set(self.reader_count.get() + 1);
        SlotReader::new(self)
    }

    pub fn open_writer(&mut self) -> Result<SlotWriter<'_>, CoreError> {
        if self.reader_count.get() > 0 {
            return Err(CoreError::ConcurrentMisuse(
                "cannot open a writer while readers are outstanding",
            ));
        }
        if self.writer_open.get() {
            return Err(CoreError::ConcurrentMisuse("writer is already open"));
        }
        self.writer_open.set(true);
        self.version.set(self.version.get().wrapping_add(1));
        Ok(SlotWriter::new(self))
    }

    fn release_reader(&self) {
        self.reader_count.set(self.reader_count.get() - 1);
    }

    fn release_writer(&self) {
        self.writer_open.set(false);
    }

    /// Structural invariant sweep used by the error taxonomy's fatal class.
    /// Intended for debug assertions / tests, not the hot path.
    pub fn verify_well_formed(&self) -> Result<(), CoreError> {
        let n = self.groups_logical_size();
        for g in 0..n {
            let rec = self.group(g);
            if g > 0 {
                let parent = self.decode_group_anchor(rec.parent_anchor);
                if !(parent < g) {
                    return Err(CoreError::StructuralInvariant(format!(
                        "group {g} parent {parent} is not strictly before it"
                    )));
                }
                let parent_rec = self.group(parent);
                if !(parent as i32 + parent_rec.size >= g as i32 + rec.size) {
                    return Err(CoreError::StructuralInvariant(format!(
                        "group {g} (size {}) is not covered by parent {parent} (size {})",
                        rec.size, parent_rec.size
                    )));
                }
            }
            if rec.size < 1 {
                return Err(CoreError::StructuralInvariant(format!(
                    "group {g} has non-positive size {}",
                    rec.size
                )));
            }
        }
        Ok(())
    }
}

// ======================================================================
// Reader
// ======================================================================

struct ReaderFrame {
    parent: i32, // logical index, or -1 for root
    end: usize,  // logical index one past the group's last descendant
}

pub struct SlotReader<'t> {
    table: &'t SlotTable,
    version: u32,
    cursor: usize,
    slot_cursor: usize,
    stack: Vec<ReaderFrame>,
    empty_depth: u32,
}

impl<'t> SlotReader<'t> {
    fn new(table: &'t SlotTable) -> Self {
        Self {
            table,
            version: table.version.get(),
            cursor: 0,
            slot_cursor: 0,
            stack: Vec::new(),
            empty_depth: 0,
        }
    }

    fn check_version(&self) -> Result<(), CoreError> {
        if self.table.version.get() != self.version {
            Err(CoreError::ConcurrentModification)
        } else {
            Ok(())
        }
    }

    pub fn in_empty_mode(&self) -> bool {
        self.empty_depth > 0
    }

    pub fn begin_empty(&mut self) {
        self.empty_depth += 1;
    }

    pub fn end_empty(&mut self) {
        debug_assert!(self.empty_depth > 0);
        self.empty_depth = self.empty_depth.saturating_sub(1);
    }

    fn current_parent(&self) -> i32 {
        self.stack.last().map(|f| f.parent).unwrap_or(-1)
    }

    fn current_end(&self) -> usize {
        self.stack
            .last()
            .map(|f| f.end)
            .unwrap_or_else(|| self.table.groups_logical_size())
    }

    pub fn start_group(&mut self) -> Result<(), CoreError> {
        self.check_version()?;
        if self.in_empty_mode() {
            return Ok(());
        }
        let idx = self.cursor;
        let rec = self.table.group(idx);
        let size = rec.size as usize;
        self.slot_cursor = self.table.decode_data_anchor(rec.data_anchor)
            + bits::reserved_slot_count(rec.info);
        self.stack.push(ReaderFrame {
            parent: idx as i32,
            end: idx + size,
        });
        self.cursor = idx + 1;
        Ok(())
    }

    pub fn end_group(&mut self) -> Result<(), CoreError> {
        self.check_version()?;
        if self.in_empty_mode() {
            return Ok(());
        }
        let frame = self.stack.pop().expect("end_group without matching start_group");
        self.cursor = frame.end;
        Ok(())
    }

    pub fn skip_group(&mut self) -> Result<usize, CoreError> {
        self.check_version()?;
        if self.in_empty_mode() {
            return Ok(0);
        }
        let idx = self.cursor;
        let size = self.table.group(idx).size as usize;
        self.cursor = idx + size;
        Ok(size)
    }

    pub fn skip_to_group_end(&mut self) -> Result<(), CoreError> {
        self.check_version()?;
        self.cursor = self.current_end();
        Ok(())
    }

    pub fn reposition(&mut self, index: usize) -> Result<(), CoreError> {
        self.check_version()?;
        self.cursor = index;
        Ok(())
    }

    pub fn restore_parent(&mut self, index: usize) -> Result<(), CoreError> {
        self.check_version()?;
        let size = self.table.group(index).size as usize;
        self.stack.push(ReaderFrame {
            parent: index as i32,
            end: index + size,
        });
        Ok(())
    }

    pub fn extract_keys(&self) -> Result<Vec<(usize, Key)>, CoreError> {
        self.check_version()?;
        let mut out = Vec::new();
        let mut i = self.cursor;
        let end = self.current_end();
        while i < end {
            let rec = self.table.group(i);
            out.push((i, rec.key));
            i += rec.size as usize;
        }
        Ok(out)
    }

    /// Read the current slot and advance the cursor. In empty mode always
    /// returns [`Empty`] and advances nothing in the slots array.
    pub fn next_slot(&mut self) -> Result<ReadValue<'_>, CoreError> {
        self.check_version()?;
        if self.in_empty_mode() {
            return Ok(ReadValue::Empty);
        }
        let idx = self.slot_cursor;
        if idx >= self.current_end_data_bound() {
            return Ok(ReadValue::Nothing);
        }
        self.slot_cursor += 1;
        let addr = self.table.slot_address(idx);
        Ok(match &self.table.slots[addr] {
            SlotCell::Value(v) => ReadValue::Value(v.as_ref()),
            SlotCell::Node(id) => ReadValue::Node(*id),
            SlotCell::Null => ReadValue::Nothing,
        })
    }

    fn current_end_data_bound(&self) -> usize {
        // The data region owned by the current group run extends up to the
        // data anchor of the group immediately following its span.
        let end_group = self.current_end();
        if end_group < self.table.groups_logical_size() {
            self.table.decode_data_anchor(self.table.group(end_group).data_anchor)
        } else {
            self.table.slots_logical_size()
        }
    }

    pub fn group_key(&self, index: usize) -> Result<Key, CoreError> {
        self.check_version()?;
        Ok(self.table.group(index).key)
    }

    pub fn group_size(&self, index: usize) -> Result<usize, CoreError> {
        self.check_version()?;
        Ok(self.table.group(index).size as usize)
    }

    pub fn parent(&self, index: usize) -> Result<Option<usize>, CoreError> {
        self.check_version()?;
        let parent_anchor = self.table.group(index).parent_anchor;
        if parent_anchor == -1 {
            Ok(None)
        } else {
            Ok(Some(self.table.decode_group_anchor(parent_anchor)))
        }
    }

    pub fn is_node(&self, index: usize) -> Result<bool, CoreError> {
        self.check_version()?;
        Ok(bits::is_node(self.table.group(index).info))
    }

    pub fn node(&self, index: usize) -> Result<Option<NodeId>, CoreError> {
        self.check_version()?;
        let rec = self.table.group(index);
        if !bits::is_node(rec.info) {
            return Ok(None);
        }
        let slot_idx = self.table.decode_data_anchor(rec.data_anchor);
        match &self.table.slots[self.table.slot_address(slot_idx)] {
            SlotCell::Node(id) => Ok(Some(*id)),
            _ => Ok(None),
        }
    }

    pub fn group_aux(&self, index: usize) -> Result<Option<&dyn Any>, CoreError> {
        self.check_version()?;
        let rec = self.table.group(index);
        if !bits::has_aux(rec.info) {
            return Ok(None);
        }
        let base = self.table.decode_data_anchor(rec.data_anchor);
        let offset = bits::aux_slot_offset(rec.info);
        match &self.table.slots[self.table.slot_address(base + offset)] {
            SlotCell::Value(v) => Ok(Some(v.as_ref())),
            _ => Ok(None),
        }
    }
}

impl<'t> Drop for SlotReader<'t> {
    fn drop(&mut self) {
        self.table.release_reader();
    }
}

pub enum ReadValue<'a> {
    Empty,
    Value(&'a dyn Any),
    Node(NodeId),
    Nothing,
}

// ======================================================================
// Writer
// ======================================================================

struct WriteFrame {
    parent: i32,
    group_start: usize,
    anchor: i32,
    node_count: u32,
    inserting: bool,
    /// Deferred slot writes queued while not at the slot cursor.
    deferred_slot_writes: Vec<(usize, Box<dyn Any>)>,
}

pub struct SlotWriter<'t> {
    table: &'t mut SlotTable,
    cursor: usize,
    slot_cursor: usize,
    stack: Vec<WriteFrame>,
    insert_depth: u32,
}

impl<'t> SlotWriter<'t> {
    fn new(table: &'t mut SlotTable) -> Self {
        Self {
            table,
            cursor: 0,
            slot_cursor: 0,
            stack: Vec::new(),
            insert_depth: 0,
        }
    }

    pub fn is_inserting(&self) -> bool {
        self.insert_depth > 0
    }

    pub fn begin_insert(&mut self) {
        self.insert_depth += 1;
    }

    pub fn end_insert(&mut self) {
        debug_assert!(self.insert_depth > 0);
        self.insert_depth -= 1;
    }

    fn current_parent(&self) -> i32 {
        self.stack.last().map(|f| f.parent).unwrap_or(-1)
    }

    // -- gap management ---------------------------------------------------

    fn ensure_group_gap_at(&mut self, index: usize) {
        if self.table.group_gap_len > 0 && self.table.group_gap_start == index {
            return;
        }
        if self.table.group_gap_len == 0 {
            self.grow_group_storage();
        }
        self.move_group_gap_to(index);
    }

    fn grow_group_storage(&mut self) {
        const BLOCK: usize = 32;
        let insert_at = self.table.group_gap_start;
        let mut extra = Vec::with_capacity(BLOCK);
        extra.resize_with(BLOCK, || GroupRecord::TOMBSTONE);
        self.table.groups.splice(insert_at..insert_at, extra);
        self.table.group_gap_len += BLOCK;
    }

    fn move_group_gap_to(&mut self, new_start: usize) {
        let old_start = self.table.group_gap_start;
        let gap_len = self.table.group_gap_len;
        if new_start == old_start {
            return;
        }
        if new_start < old_start {
            // shift [new_start, old_start) right by gap_len
            let count = old_start - new_start;
            for i in (0..count).rev() {
                self.table.groups[new_start + gap_len + i] = self.table.groups[new_start + i];
            }
        } else {
            // shift [old_start+gap_len, new_start+gap_len) left by gap_len
            let count = new_start - old_start;
            for i in 0..count {
                self.table.groups[old_start + i] = self.table.groups[old_start + gap_len + i];
            }
        }
        self.table.group_gap_start = new_start;
        self.table.reencode_anchors_crossing(old_start, new_start);
    }

    fn ensure_slot_gap_at(&mut self, index: usize) {
        if self.table.slot_gap_len > 0 && self.table.slot_gap_start == index {
            return;
        }
        if self.table.slot_gap_len == 0 {
            self.grow_slot_storage();
        }
        self.move_slot_gap_to(index);
    }

    fn grow_slot_storage(&mut self) {
        const BLOCK: usize = 32;
        let insert_at = self.table.slot_gap_start;
        let mut extra = Vec::with_capacity(BLOCK);
        extra.resize_with(BLOCK, || SlotCell::Null);
        self.table.slots.splice(insert_at..insert_at, extra);
        self.table.slot_gap_len += BLOCK;
    }

    fn move_slot_gap_to(&mut self, new_start: usize) {
        let old_start = self.table.slot_gap_start;
        let gap_len = self.table.slot_gap_len;
        if new_start == old_start {
            return;
        }
        if new_start < old_start {
            let count = old_start - new_start;
            for i in (0..count).rev() {
                self.table.slots.swap(new_start + gap_len + i, new_start + i);
            }
        } else {
            let count = new_start - old_start;
            for i in 0..count {
                self.table.slots.swap(old_start + i, old_start + gap_len + i);
            }
        }
        // P5: cells entering the gap region are reset to Null.
        self.table.slot_gap_start = new_start;
        for i in new_start..new_start + gap_len {
            if !matches!(self.table.slots[i], SlotCell::Null) {
                self.table.slots[i] = SlotCell::Null;
            }
        }
    }

    // -- group structural ops ---------------------------------------------

    /// Starts a group at the writer's cursor, per the group-record contract.
    pub fn start_group(
        &mut self,
        key: Key,
        object_key: Option<Box<dyn Any>>,
        is_node: bool,
        aux: Option<Box<dyn Any>>,
    ) -> Result<usize, CoreError> {
        let index = self.cursor;
        if self.is_inserting() {
            self.ensure_group_gap_at(index);
            let parent = self.current_parent();
            let parent_anchor = if parent < 0 {
                -1
            } else {
                self.table.encode_group_anchor(parent as usize)
            };

            let has_object_key = object_key.is_some();
            let has_aux = aux.is_some();
            let reserved = bits::reserved_slot_count(bits::pack(
                is_node,
                has_object_key,
                has_aux,
                false,
                false,
                0,
            ));
            self.ensure_slot_gap_at(self.slot_cursor);
            let data_index = self.slot_cursor;
            // See open question (b): the data anchor at a fresh insertion
            // point must be encoded end-relative even though `data_index`
            // sits before the slot gap, because the reserved cells about to
            // be written will immediately straddle the gap boundary as
            // siblings are inserted after this group. Encoding front-relative
            // here would desync the moment the next sibling's insert grows
            // the slot gap leftwards past this group's data anchor.
            let data_anchor = -((self.table.slots_logical_size() as i32)
                - (data_index as i32)
                - anchor::PARENT_ANCHOR_PIVOT);

            if reserved > 0 {
                self.table.slot_gap_start += reserved;
                self.table.slot_gap_len -= reserved;
                let mut i = data_index;
                if is_node {
                    self.table.slots[i] = SlotCell::Null;
                    i += 1;
                }
                if let Some(k) = object_key {
                    self.table.slots[i] = SlotCell::Value(k);
                    i += 1;
                }
                if let Some(a) = aux {
                    self.table.slots[i] = SlotCell::Value(a);
                }
            }
            self.slot_cursor = data_index + reserved;

            let info = bits::pack(is_node, has_object_key, has_aux, false, false, 0);
            let rec = GroupRecord {
                key,
                info,
                parent_anchor,
                size: 1,
                data_anchor,
            };
            // place the record at `index` (which is exactly group_gap_start)
            self.table.groups[self.table.group_address(index)] = rec;
            self.table.group_gap_start += 1;
            self.table.group_gap_len -= 1;

            let anchor_for_new_group = self.table.anchor_for(index);
            let _ = anchor_for_new_group; // owned list already updated; caller fetches via index

            self.stack.push(WriteFrame {
                parent: index as i32,
                group_start: index,
                anchor: parent_anchor,
                node_count: 0,
                inserting: true,
                deferred_slot_writes: Vec::new(),
            });
            self.cursor = index + 1;
            Ok(index)
        } else {
            if index >= self.table.groups_logical_size() {
                return Err(CoreError::StructuralInvariant(
                    "start_group outside insertion mode past end of table".into(),
                ));
            }
            let size = self.table.group(index).size as usize;
            let data_index = self.table.decode_data_anchor(self.table.group(index).data_anchor);
            self.stack.push(WriteFrame {
                parent: index as i32,
                group_start: index,
                anchor: self.table.group(index).parent_anchor,
                node_count: bits::node_count(self.table.group(index).info),
                inserting: false,
                deferred_slot_writes: Vec::new(),
            });
            self.cursor = index + 1;
            self.slot_cursor = data_index + bits::reserved_slot_count(self.table.group(index).info);
            let _ = size;
            Ok(index)
        }
    }

    /// Ends the group started by the matching `start_group`.
    pub fn end_group(&mut self) -> Result<(), CoreError> {
        let mut frame = self
            .stack
            .pop()
            .ok_or(CoreError::StructuralInvariant("end_group without start_group".into()))?;

        self.flush_deferred_writes(&mut frame)?;

        if frame.inserting {
            let start = frame.group_start;
            let new_size = self.cursor - start;
            let rec = self.table.group_mut(start);
            rec.size = new_size as i32;
            rec.info = bits::set_node_count(rec.info, frame.node_count);
            self.propagate_node_count_to_enclosing_node(frame.node_count, start);
        } else {
            let start = frame.group_start;
            let end_cursor = self.cursor;
            let old_size = self.table.group(start).size as usize;
            let expected_end = start + old_size;
            if end_cursor != expected_end {
                return Err(CoreError::StructuralInvariant(format!(
                    "end_group cursor {end_cursor} does not match group {start} end {expected_end}"
                )));
            }
            let old_count = bits::node_count(self.table.group(start).info);
            if old_count != frame.node_count {
                let rec = self.table.group_mut(start);
                rec.info = bits::set_node_count(rec.info, frame.node_count);
                let delta = frame.node_count as i64 - old_count as i64;
                self.propagate_node_count_delta_to_parent(delta, start);
            }
        }
        self.cursor = frame.group_start + self.table.group(frame.group_start).size as usize;
        Ok(())
    }

    fn flush_deferred_writes(&mut self, frame: &mut WriteFrame) -> Result<(), CoreError> {
        for (index, value) in frame.deferred_slot_writes.drain(..) {
            self.write_slot_now(index, value);
        }
        Ok(())
    }

    /// Node-count propagation: walk from a group's structural parent
    /// up to the nearest currently-open ancestor, stopping at the first node
    /// boundary (node groups own their single node; counts do not propagate
    /// past them).
    fn propagate_node_count_delta_to_parent(&mut self, delta: i64, from_group: usize) {
        if delta == 0 {
            return;
        }
        let _ = from_group;
        if let Some(open_parent) = self.stack.last_mut() {
            if !bits::is_node(self.table.group(open_parent.group_start).info) {
                open_parent.node_count = (open_parent.node_count as i64 + delta).max(0) as u32;
            }
        }
    }

    fn propagate_node_count_to_enclosing_node(&mut self, added: u32, group_index: usize) {
        if added == 0 {
            return;
        }
        if let Some(parent_frame) = self.stack.last_mut() {
            let is_node_self = bits::is_node(self.table.group(group_index).info);
            let contributes = if is_node_self { 1 } else { added };
            if !bits::is_node(self.table.group(parent_frame.group_start).info) {
                parent_frame.node_count += contributes;
            } else {
                parent_frame.node_count = 1;
            }
        }
    }

    /// Removes a group. Must be called at a group start and outside
    /// insertion mode.
    pub fn remove_group(&mut self) -> Result<(), CoreError> {
        if self.is_inserting() {
            return Err(CoreError::ConcurrentMisuse("remove_group called while inserting"));
        }
        let index = self.cursor;
        let size = self.table.group(index).size as usize;
        let had_mark = bits::contains_mark(self.table.group(index).info);

        self.invalidate_slots_owned_by_range(index, index + size)?;
        self.table.invalidate_anchors_in_removed_range(index, index + size);

        self.ensure_group_gap_at(index);
        self.table.group_gap_len += size;

        if let Some(frame) = self.stack.last_mut() {
            let removed_nodes = self.count_nodes_in_range_unsafe(index, index + size);
            frame.node_count = frame.node_count.saturating_sub(removed_nodes);
        }
        if had_mark {
            self.recompute_contains_mark_upwards();
        }
        Ok(())
    }

    fn count_nodes_in_range_unsafe(&self, start: usize, end: usize) -> u32 {
        let mut total = 0;
        let mut i = start;
        while i < end {
            let rec = self.table.group(i);
            if bits::is_node(rec.info) {
                total += 1;
            } else {
                total += bits::node_count(rec.info);
            }
            i += rec.size as usize;
        }
        total
    }

    fn invalidate_slots_owned_by_range(&mut self, start: usize, end: usize) -> Result<(), CoreError> {
        if end <= start {
            return Ok(());
        }
        let first_data = self.table.decode_data_anchor(self.table.group(start).data_anchor);
        let last_data = if end < self.table.groups_logical_size() {
            self.table.decode_data_anchor(self.table.group(end).data_anchor)
        } else {
            self.table.slots_logical_size()
        };
        self.ensure_slot_gap_at(first_data);
        self.table.slot_gap_len += last_data - first_data;
        Ok(())
    }

    fn recompute_contains_mark_upwards(&mut self) {
        for frame in self.stack.iter().rev() {
            let idx = frame.group_start;
            let has_own_mark = bits::mark(self.table.group(idx).info);
            let any_marked_child = self.any_descendant_marked(idx);
            let rec = self.table.group_mut(idx);
            rec.info = bits::set_contains_mark(rec.info, has_own_mark || any_marked_child);
        }
    }

    fn any_descendant_marked(&self, index: usize) -> bool {
        let size = self.table.group(index).size as usize;
        let mut i = index + 1;
        let end = index + size;
        while i < end {
            let rec = self.table.group(i);
            if bits::mark(rec.info) || bits::contains_mark(rec.info) {
                return true;
            }
            i += rec.size as usize;
        }
        false
    }

    /// Moves the `offset`-th sibling after the cursor to
    /// immediately before the cursor, in a nine-step order chosen so every
    /// intermediate state keeps parent/data anchors consistent:
    /// 1. enlarge destination slot gap, 2. enlarge destination group gap,
    /// 3. bulk-copy group records, 4. fix data anchors (re-deriving each
    /// moved record's data anchor against its new slot position, and every
    /// moved record's parent_anchor: the block's root re-parents onto the
    /// destination cursor's parent, descendants re-derive relative to the
    /// new base exactly as `move_from` does for a cross-table transfer),
    /// 6-9. remove the vacated source copy and its now-empty slot range,
    /// 5. relocate owning anchors that pointed into the moved range (or
    /// into the siblings it displaced) to their final logical index, sized
    /// against the table's settled post-move state. Step 5 runs last in
    /// code (though it is numbered for the logical position it occupies in
    /// the algorithm) because its targets are only known once steps 6-9
    /// fix the final gap position.
    pub fn move_group(&mut self, offset: usize) -> Result<(), CoreError> {
        if self.is_inserting() {
            return Err(CoreError::ConcurrentMisuse("move_group called while inserting"));
        }
        let dest = self.cursor;
        let mut source = dest;
        for _ in 0..offset {
            source += self.table.group(source).size as usize;
        }
        if source == dest {
            return Ok(());
        }
        let size = self.table.group(source).size as usize;

        // 1/2: make room immediately before `dest`.
        self.ensure_group_gap_at(dest);

        // Snapshot which anchors need relocating and where they land,
        // using logical indices as they stand right now (before the bulk
        // copy below shifts anything): anchors into the moved block land
        // at `dest`-relative offsets; anchors into the siblings between
        // `dest` and `source` get pushed back by `size` since the moved
        // block now sits in front of them.
        let pre_logical = self.table.groups_logical_size();
        let mut relocations: Vec<(Anchor, usize)> = Vec::new();
        for a in &self.table.anchors {
            if !a.is_valid() {
                continue;
            }
            let idx = anchor::decode(a.location(), pre_logical);
            if idx >= source && idx < source + size {
                relocations.push((a.clone(), dest + (idx - source)));
            } else if idx >= dest && idx < source {
                relocations.push((a.clone(), idx + size));
            }
        }

        // Capture the moving records + their owned data ranges.
        let moved_records: Vec<GroupRecord> =
            (0..size).map(|i| *self.table.group(source + i)).collect();
        let data_start = self.table.decode_data_anchor(moved_records[0].data_anchor);
        let data_end = if source + size < self.table.groups_logical_size() {
            self.table
                .decode_data_anchor(self.table.group(source + size).data_anchor)
        } else {
            self.table.slots_logical_size()
        };
        let data_len = data_end - data_start;

        // 3/4: bulk copy slots to a staging area ahead of the destination
        // slot cursor, then the group records, re-deriving data anchors.
        self.ensure_slot_gap_at(self.slot_cursor);
        let new_data_start = self.slot_cursor;
        for i in 0..data_len {
            let addr = self.table.slot_address(data_start + i);
            let moved = std::mem::replace(&mut self.table.slots[addr], SlotCell::Null);
            let dest_addr = self.table.slot_address(new_data_start + i);
            self.table.slots[dest_addr] = moved;
        }
        self.table.slot_gap_start += data_len;
        self.table.slot_gap_len -= data_len;

        let mut rebased = moved_records;
        let delta = new_data_start as i64 - data_start as i64;
        let dest_parent = self.current_parent();
        for (i, rec) in rebased.iter_mut().enumerate() {
            let old_idx = self.table.decode_data_anchor(rec.data_anchor);
            let new_idx = (old_idx as i64 + delta) as usize;
            rec.data_anchor = self.table.encode_data_anchor(new_idx);
            if i == 0 {
                // The moved group's own parent becomes whatever the cursor's
                // current parent is at the destination.
                rec.parent_anchor = if dest_parent < 0 {
                    -1
                } else {
                    self.table.encode_group_anchor(dest_parent as usize)
                };
            } else {
                // Descendants' parent anchors point within the moved block;
                // re-derive relative to the new base the same way as the
                // data anchor above.
                let old_parent_idx = self.table.decode_group_anchor(rec.parent_anchor);
                let new_parent_idx = (old_parent_idx as i64 - source as i64 + dest as i64) as usize;
                rec.parent_anchor = self.table.encode_group_anchor(new_parent_idx);
            }
        }

        for (i, rec) in rebased.iter().enumerate() {
            self.table.groups[self.table.group_address(dest + i)] = *rec;
        }
        self.table.group_gap_start += size;
        self.table.group_gap_len -= size;

        // 6-9: remove the vacated source copy (now logically shifted ahead
        // by `size` to `source + size`) and its now-empty slot range.
        self.ensure_group_gap_at(source + size);
        self.table.group_gap_len += size;
        self.ensure_slot_gap_at(data_start);
        self.table.slot_gap_len += data_len;

        // 5: apply the relocations snapshotted above against the table's
        // final gap/logical state, actually moving each owning anchor from
        // its old index to the new one rather than just re-deriving its
        // front/end-relative encoding in place.
        let final_logical = self.table.groups_logical_size();
        let final_gap_start = self.table.group_gap_start;
        for (a, new_idx) in relocations {
            a.set_location(anchor::encode(new_idx, final_gap_start, final_logical));
        }

        Ok(())
    }

    /// Transfer a group and its descendants from another writer's table into
    /// this insert point. Rebinds ownership of the moved anchors.
    pub fn move_from(
        &mut self,
        source: &mut SlotWriter<'_>,
        index: usize,
        remove_source: bool,
    ) -> Result<(), CoreError> {
        if !self.is_inserting() {
            return Err(CoreError::ConcurrentMisuse("move_from requires insertion mode"));
        }
        let size = source.table.group(index).size as usize;
        let data_start = source
            .table
            .decode_data_anchor(source.table.group(index).data_anchor);
        let data_end = if index + size < source.table.groups_logical_size() {
            source
                .table
                .decode_data_anchor(source.table.group(index + size).data_anchor)
        } else {
            source.table.slots_logical_size()
        };

        self.ensure_group_gap_at(self.cursor);
        self.ensure_slot_gap_at(self.slot_cursor);

        let dest_group_start = self.cursor;
        let dest_data_start = self.slot_cursor;
        let delta = dest_data_start as i64 - data_start as i64;

        for i in 0..size {
            let mut rec = *source.table.group(index + i);
            let old_data_idx = source.table.decode_data_anchor(rec.data_anchor);
            let new_data_idx = (old_data_idx as i64 + delta) as usize;
            rec.data_anchor = self.table.encode_data_anchor(new_data_idx);
            if i == 0 {
                let parent = self.current_parent();
                rec.parent_anchor = if parent < 0 {
                    -1
                } else {
                    self.table.encode_group_anchor(parent as usize)
                };
            } else {
                // internal parent anchors are re-derived relative to the new base
                let old_parent_idx = source.table.decode_group_anchor(rec.parent_anchor);
                let new_parent_idx = (old_parent_idx as i64 - index as i64 + dest_group_start as i64) as usize;
                rec.parent_anchor = self.table.encode_group_anchor(new_parent_idx);
            }
            self.table.groups[self.table.group_address(dest_group_start + i)] = rec;
        }
        self.table.group_gap_start += size;
        self.table.group_gap_len -= size;

        for i in 0..(data_end - data_start) {
            let addr = source.table.slot_address(data_start + i);
            let moved = std::mem::replace(&mut source.table.slots[addr], SlotCell::Null);
            let dest_addr = self.table.slot_address(dest_data_start + i);
            self.table.slots[dest_addr] = moved;
        }
        self.table.slot_gap_start += data_end - data_start;
        self.table.slot_gap_len -= data_end - data_start;

        // Rebind owning anchors for the moved range to this table.
        let logical = source.table.groups_logical_size();
        for a in &source.table.anchors {
            if !a.is_valid() {
                continue;
            }
            let idx = anchor::decode(a.location(), logical);
            if idx >= index && idx < index + size {
                let new_idx = idx - index + dest_group_start;
                a.set_location(self.table.encode_group_anchor(new_idx));
                self.table.anchors.push(a.clone());
            }
        }

        if remove_source {
            source.cursor = index;
            source.remove_group()?;
        }
        self.cursor = dest_group_start + size;
        self.slot_cursor = dest_data_start + (data_end - data_start);
        Ok(())
    }

    /// Used for movable-content installation at a provider group; does not
    /// move the external cursor.
    pub fn move_into_group_from(
        &mut self,
        offset: usize,
        source: &mut SlotWriter<'_>,
        index: usize,
    ) -> Result<(), CoreError> {
        let saved_cursor = self.cursor;
        let saved_slot_cursor = self.slot_cursor;
        self.cursor = saved_cursor + offset;
        self.move_from(source, index, true)?;
        self.cursor = saved_cursor;
        self.slot_cursor = saved_slot_cursor;
        Ok(())
    }

    /// Overwrite the current group's key with the sentinel so the composer
    /// discards it on the next pass.
    pub fn bash_current_group(&mut self) {
        let idx = self.cursor;
        self.table.group_mut(idx).key = LIVE_EDIT_INVALID_KEY;
    }

    pub fn mark_group(&mut self, index: usize) {
        let rec = self.table.group_mut(index);
        rec.info = bits::set_mark(rec.info, true);
        self.propagate_contains_mark_from(index);
    }

    fn propagate_contains_mark_from(&mut self, index: usize) {
        let mut idx = index;
        loop {
            match self.find_parent_index(idx) {
                Some(p) => {
                    let rec = self.table.group_mut(p);
                    rec.info = bits::set_contains_mark(rec.info, true);
                    idx = p;
                }
                None => break,
            }
        }
    }

    fn find_parent_index(&self, index: usize) -> Option<usize> {
        let parent_anchor = self.table.group(index).parent_anchor;
        if parent_anchor == -1 {
            None
        } else {
            Some(self.table.decode_group_anchor(parent_anchor))
        }
    }

    /// Reads the [`RecomposeScope`] stored as `index`'s aux slot, if it has
    /// one. Restartable groups store their scope this way (the group-record
    /// `hasAux` bit, not a dedicated flag, since the bit layout is normative).
    fn group_scope(&self, index: usize) -> Option<RecomposeScope> {
        let rec = self.table.group(index);
        if !bits::has_aux(rec.info) {
            return None;
        }
        let base = self.table.decode_data_anchor(rec.data_anchor);
        let offset = bits::aux_slot_offset(rec.info);
        let addr = self.table.slot_address(base + offset);
        match &self.table.slots[addr] {
            SlotCell::Value(v) => v.downcast_ref::<RecomposeScope>().cloned(),
            _ => None,
        }
    }

    /// Walks from `index` (inclusive) up through parents until a group
    /// carries a scope, returning `None` once the walk reaches the root
    /// without finding one.
    fn scope_at_or_above(&self, mut index: usize) -> Option<RecomposeScope> {
        loop {
            if let Some(scope) = self.group_scope(index) {
                return Some(scope);
            }
            index = self.find_parent_index(index)?;
        }
    }

    /// Sweep for every group whose key matches `target_key` (or carries the
    /// live-edit sentinel key), collecting the nearest enclosing recompose
    /// scope for each. When the matched group is itself a scope root, the
    /// scope enclosing *that* scope is collected too — a structural edit at
    /// the scope root invalidates the scope containing it, not just the
    /// scope itself. Returns `None` as soon as any match has no recoverable
    /// restart boundary, telling the caller to fall back to full
    /// recomposition instead of a partial, and likely wrong, invalidation.
    pub fn invalidate_groups_with_key(&self, target_key: Key) -> Option<Vec<RecomposeScope>> {
        let mut out: Vec<RecomposeScope> = Vec::new();
        let mut push_unique = |scope: RecomposeScope| {
            if !out.contains(&scope) {
                out.push(scope);
            }
        };
        let n = self.table.groups_logical_size();
        for i in 0..n {
            let rec = self.table.group(i);
            if rec.key != target_key && rec.key != LIVE_EDIT_INVALID_KEY {
                continue;
            }
            let scope = self.scope_at_or_above(i)?;
            push_unique(scope);
            if self.group_scope(i).is_some() {
                let parent = self.find_parent_index(i)?;
                let parent_scope = self.scope_at_or_above(parent)?;
                push_unique(parent_scope);
            }
        }
        Some(out)
    }

    /// Reads back the [`NodeId`] recorded for a node group, or `None` if
    /// `index` isn't a node group or its node hasn't been recorded yet.
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        let rec = self.table.group(index);
        if !bits::is_node(rec.info) {
            return None;
        }
        let data_index = self.table.decode_data_anchor(rec.data_anchor);
        match &self.table.slots[self.table.slot_address(data_index)] {
            SlotCell::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Repositions onto an already-recorded group (outside insertion mode)
    /// without requiring the caller to hand back its key/object-key/aux
    /// payload — `start_group`'s non-inserting path reads all of that back
    /// off the existing record.
    pub fn ensure_group_started(&mut self, index: usize) -> Result<(), CoreError> {
        if self.is_inserting() {
            return Err(CoreError::ConcurrentMisuse(
                "ensure_group_started called while inserting",
            ));
        }
        self.cursor = index;
        self.start_group(0, None, false, None)?;
        Ok(())
    }

    /// Skips the writer's cursor to the end of the currently open group
    /// without ending it, for a composer that decides to bail out of
    /// recomposing a subtree partway through. The frame stays open; the
    /// matching `end_group` still has to run.
    pub fn skip_to_group_end(&mut self) -> Result<(), CoreError> {
        let frame = self
            .stack
            .last()
            .ok_or(CoreError::StructuralInvariant("skip_to_group_end without an open group".into()))?;
        if frame.inserting {
            return Ok(());
        }
        let start = frame.group_start;
        self.cursor = start + self.table.group(start).size as usize;
        Ok(())
    }

    /// Resets the slot cursor back to the start of the current group's data,
    /// for a composer that decides mid-group it needs to re-read slots it
    /// already walked past.
    pub fn reset_slots(&mut self) -> Result<(), CoreError> {
        let frame = self
            .stack
            .last()
            .ok_or(CoreError::StructuralInvariant("reset_slots without an open group".into()))?;
        let start = frame.group_start;
        let rec = self.table.group(start);
        let data_index = self.table.decode_data_anchor(rec.data_anchor);
        self.slot_cursor = data_index + bits::reserved_slot_count(rec.info);
        Ok(())
    }

    // -- slots --------------------------------------------------------

    pub fn slot_cursor(&self) -> usize {
        self.slot_cursor
    }

    /// Read the slot at the writer's current data cursor and advance it.
    pub fn next_slot(&mut self) -> Option<&dyn Any> {
        let addr = self.table.slot_address(self.slot_cursor);
        self.slot_cursor += 1;
        match &self.table.slots[addr] {
            SlotCell::Value(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    /// Write a value at the slot cursor (`UpdateValue`). If the cursor is
    /// not at `index`, the write is deferred into the enclosing group's
    /// queue and flushed at `end_group` to avoid thrashing the gap.
    pub fn update_value(&mut self, index: usize, value: Box<dyn Any>) {
        if index == self.slot_cursor {
            self.write_slot_now(index, value);
        } else if let Some(frame) = self.stack.last_mut() {
            frame.deferred_slot_writes.push((index, value));
        } else {
            self.write_slot_now(index, value);
        }
    }

    fn write_slot_now(&mut self, index: usize, value: Box<dyn Any>) {
        self.ensure_slot_gap_at(index.max(self.slot_cursor));
        let addr = self.table.slot_address(index);
        self.table.slots[addr] = SlotCell::Value(value);
    }

    pub fn append_value(&mut self, value: Box<dyn Any>) -> usize {
        self.ensure_slot_gap_at(self.slot_cursor);
        let idx = self.slot_cursor;
        let addr = self.table.slot_address(idx);
        self.table.slots[addr] = SlotCell::Value(value);
        self.slot_cursor += 1;
        idx
    }

    pub fn trim_parent_values(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let start = self.slot_cursor.saturating_sub(count);
        self.invalidate_slots_owned_by_range_raw(start, self.slot_cursor);
        self.slot_cursor = start;
    }

    fn invalidate_slots_owned_by_range_raw(&mut self, start: usize, end: usize) {
        if end <= start {
            return;
        }
        self.ensure_slot_gap_at(start);
        self.table.slot_gap_len += end - start;
    }

    pub fn record_node(&mut self, id: NodeId) {
        let idx = self.cursor.saturating_sub(1);
        if let Some(rec) = self.table.groups.get(self.table.group_address(idx)).copied() {
            let data_idx = self.table.decode_data_anchor(rec.data_anchor);
            self.write_slot_node(data_idx, id);
        }
    }

    fn write_slot_node(&mut self, index: usize, id: NodeId) {
        let addr = self.table.slot_address(index);
        self.table.slots[addr] = SlotCell::Node(id);
    }

    pub fn update_aux_data(&mut self, value: Box<dyn Any>) {
        if let Some(frame) = self.stack.last() {
            let idx = frame.group_start;
            let rec = self.table.group(idx);
            if bits::has_aux(rec.info) {
                let base = self.table.decode_data_anchor(rec.data_anchor);
                let offset = bits::aux_slot_offset(rec.info);
                self.write_slot_now(base + offset, value);
            }
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn table(&self) -> &SlotTable {
        self.table
    }
}

impl<'t> Drop for SlotWriter<'t> {
    fn drop(&mut self) {
        self.table.release_writer();
    }
}

#[cfg(test)]
#[path = "tests/slot_table_tests.rs"]
mod tests;
