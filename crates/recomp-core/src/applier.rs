//! The external applier contract and the recording mirror applier
//! used by pausable composition.

use crate::error::CoreError;
use crate::NodeId;
use std::any::Any;

/// Mutates the external node tree. Implementations choose either top-down
/// (insert before descending into children) or bottom-up (subtree built
/// first, then attached) semantics; the change list supports both.
pub trait Applier {
    /// Push a child onto the focus stack.
    fn down(&mut self, node: NodeId);
    /// Pop the focus stack.
    fn up(&mut self);
    /// Place `node` as the `index`-th child, discover-first order.
    fn insert_top_down(&mut self, index: usize, node: NodeId);
    /// Place `node` as the `index`-th child, subtree-first order.
    fn insert_bottom_up(&mut self, index: usize, node: NodeId);
    /// Remove `count` children starting at `index`.
    fn remove(&mut self, index: usize, count: usize);
    /// Move a contiguous range within the current parent.
    fn move_range(&mut self, from: usize, to: usize, count: usize);
    /// Remove all children under the root.
    fn clear(&mut self);
    /// Mark the current child as reusable.
    fn reuse(&mut self);
    /// Run a setter-like closure on the current child with a boxed value.
    fn apply_to_current(&mut self, apply: &dyn Fn(&mut dyn Any, &dyn Any), value: &dyn Any);
    fn on_begin_changes(&mut self) {}
    fn on_end_changes(&mut self) {}
}

/// An operation recorded by [`RecordingApplier`], played back in FIFO order.
enum RecordedOp {
    Down(NodeId),
    Up,
    InsertTopDown(usize, NodeId),
    InsertBottomUp(usize, NodeId),
    Remove(usize, usize),
    Move(usize, usize, usize),
    Clear,
    Reuse,
    /// An `apply_to_current` call the recorder could not capture: closures
    /// aren't `'static` and can't be replayed past their call lifetime, so
    /// this is recorded only to fail loudly on replay instead of silently
    /// dropping the mutation.
    Apply,
    /// Sentinel noting the paused composition that produced this recording
    /// was interrupted by an invalidation mid-stream.
    RecomposePending,
}

/// How many trailing operations a failed replay's error carries for
/// post-mortem.
const TRAILING_WINDOW: usize = 50;

fn recorded_op_label(op: &RecordedOp) -> String {
    match op {
        RecordedOp::Down(n) => format!("Down({n})"),
        RecordedOp::Up => "Up".to_string(),
        RecordedOp::InsertTopDown(i, n) => format!("InsertTopDown({i}, {n})"),
        RecordedOp::InsertBottomUp(i, n) => format!("InsertBottomUp({i}, {n})"),
        RecordedOp::Remove(i, c) => format!("Remove({i}, {c})"),
        RecordedOp::Move(f, t, c) => format!("Move({f}, {t}, {c})"),
        RecordedOp::Clear => "Clear".to_string(),
        RecordedOp::Reuse => "Reuse".to_string(),
        RecordedOp::Apply => "Apply".to_string(),
        RecordedOp::RecomposePending => "RecomposePending".to_string(),
    }
}

/// Mirror applier that buffers calls for later replay instead of touching
/// the real tree. Used by pausable composition so a cooperatively
/// suspended composition can resume without having partially mutated the
/// live applier.
#[derive(Default)]
pub struct RecordingApplier {
    ops: Vec<RecordedOp>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn note_recompose_pending(&mut self) {
        self.ops.push(RecordedOp::RecomposePending);
    }

    /// Replay the recording onto `real` in FIFO order. On failure, the
    /// returned error carries a printable trailing window of the last 50
    /// operations for post-mortem.
    pub fn play_to(&mut self, real: &mut dyn Applier) -> Result<(), CoreError> {
        let mut window: std::collections::VecDeque<String> = std::collections::VecDeque::with_capacity(TRAILING_WINDOW);
        for (i, op) in self.ops.drain(..).enumerate() {
            let label = recorded_op_label(&op);
            if let Err(e) = Self::play_one(real, op) {
                window.push_back(format!("#{i}: {label}"));
                let trailing: Vec<String> = window.into_iter().collect();
                return Err(CoreError::user_code(
                    "RecordingApplier::play_to",
                    vec![format!(
                        "failed at recorded op #{i}; last {} ops: [{}]",
                        trailing.len(),
                        trailing.join(", ")
                    )],
                    e,
                ));
            }
            if window.len() == TRAILING_WINDOW {
                window.pop_front();
            }
            window.push_back(format!("#{i}: {label}"));
        }
        Ok(())
    }

    fn play_one(real: &mut dyn Applier, op: RecordedOp) -> Result<(), String> {
        match op {
            RecordedOp::Down(n) => real.down(n),
            RecordedOp::Up => real.up(),
            RecordedOp::InsertTopDown(i, n) => real.insert_top_down(i, n),
            RecordedOp::InsertBottomUp(i, n) => real.insert_bottom_up(i, n),
            RecordedOp::Remove(i, c) => real.remove(i, c),
            RecordedOp::Move(f, t, c) => real.move_range(f, t, c),
            RecordedOp::Clear => real.clear(),
            RecordedOp::Reuse => real.reuse(),
            RecordedOp::Apply => {
                return Err(
                    "recorded apply_to_current cannot be replayed: the paused composition's \
                     closure did not survive past its original call"
                        .into(),
                )
            }
            RecordedOp::RecomposePending => return Err("composition was left incomplete".into()),
        }
        Ok(())
    }
}

impl Applier for RecordingApplier {
    fn down(&mut self, node: NodeId) {
        self.ops.push(RecordedOp::Down(node));
    }
    fn up(&mut self) {
        self.ops.push(RecordedOp::Up);
    }
    fn insert_top_down(&mut self, index: usize, node: NodeId) {
        self.ops.push(RecordedOp::InsertTopDown(index, node));
    }
    fn insert_bottom_up(&mut self, index: usize, node: NodeId) {
        self.ops.push(RecordedOp::InsertBottomUp(index, node));
    }
    fn remove(&mut self, index: usize, count: usize) {
        self.ops.push(RecordedOp::Remove(index, count));
    }
    fn move_range(&mut self, from: usize, to: usize, count: usize) {
        self.ops.push(RecordedOp::Move(from, to, count));
    }
    fn clear(&mut self) {
        self.ops.push(RecordedOp::Clear);
    }
    fn reuse(&mut self) {
        self.ops.push(RecordedOp::Reuse);
    }
    fn apply_to_current(&mut self, _apply: &dyn Fn(&mut dyn Any, &dyn Any), _value: &dyn Any) {
        self.ops.push(RecordedOp::Apply);
    }
}

/// A minimal in-memory applier, modelled as a flat `Vec<Vec<NodeId>>` tree,
/// used by the reference composer and the integration test harness.
#[derive(Default)]
pub struct MemoryApplier {
    children: Vec<Vec<NodeId>>,
    focus: Vec<NodeId>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children_of(&self, node: NodeId) -> &[NodeId] {
        self.children.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl Applier for MemoryApplier {
    fn down(&mut self, node: NodeId) {
        self.focus.push(node);
        while self.children.len() <= node {
            self.children.push(Vec::new());
        }
    }

    fn up(&mut self) {
        self.focus.pop();
    }

    fn insert_top_down(&mut self, index: usize, node: NodeId) {
        if let Some(&parent) = self.focus.last() {
            let kids = &mut self.children[parent];
            let at = index.min(kids.len());
            kids.insert(at, node);
        }
        while self.children.len() <= node {
            self.children.push(Vec::new());
        }
    }

    fn insert_bottom_up(&mut self, index: usize, node: NodeId) {
        self.insert_top_down(index, node);
    }

    fn remove(&mut self, index: usize, count: usize) {
        if let Some(&parent) = self.focus.last() {
            let kids = &mut self.children[parent];
            let end = (index + count).min(kids.len());
            if index < end {
                kids.drain(index..end);
            }
        }
    }

    fn move_range(&mut self, from: usize, to: usize, count: usize) {
        if let Some(&parent) = self.focus.last() {
            let kids = &mut self.children[parent];
            let moved: Vec<NodeId> = kids.drain(from..from + count).collect();
            let insert_at = if to > from { to - count } else { to };
            for (i, n) in moved.into_iter().enumerate() {
                kids.insert(insert_at + i, n);
            }
        }
    }

    fn clear(&mut self) {
        for kids in &mut self.children {
            kids.clear();
        }
    }

    fn reuse(&mut self) {}

    fn apply_to_current(&mut self, apply: &dyn Fn(&mut dyn Any, &dyn Any), value: &dyn Any) {
        let mut marker: Box<dyn Any> = Box::new(());
        apply(marker.as_mut(), value);
    }
}
