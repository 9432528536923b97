#![doc = r"Core incremental recomposition engine: slot table, operations VM,
and the scheduling types built on top of them."]
#![allow(clippy::missing_const_for_thread_local)]

pub mod anchor;
pub mod applier;
pub mod bits;
pub mod change_list;
pub mod collections;
pub mod composition;
pub mod error;
pub mod frame_clock;
pub mod hash;
pub mod movable_content;
pub mod observation;
pub mod owned;
pub mod platform;
pub mod recompose_scope;
pub mod recomposer;
pub mod remember;
pub mod retain;
pub mod slot_table;
pub mod snapshot;
pub mod snapshot_id_set;

pub use anchor::Anchor;
pub use applier::{Applier, MemoryApplier, RecordingApplier};
pub use change_list::{ChangeList, Op, OpContext};
pub use composition::{Composer, Composition, CompositionState};
pub use error::CoreError;
pub use frame_clock::{BroadcastFrameClock, NextFrameEndCallbackQueue};
pub use movable_content::{MovableContent, MovableContentState, StateReference};
pub use observation::{InvalidationCause, InvalidationResult, ObservableKey, ObservationMaps};
pub use owned::Owned;
pub use platform::{Clock, RuntimeScheduler};
pub use recompose_scope::{RecomposeScope, ScopeState, WeakRecomposeScope};
pub use recomposer::{
    CompositionId, ErrorState, FrameSummary, InlineExecutor, LabeledWorkerExecutor, PausedComposition,
    Recomposer, RecomposeExecutor, RecomposerConfig, SchedulerState,
};
pub use remember::{Holder, RememberEventDispatcher, RememberObserver};
pub use retain::{ControlledRetainScope, Forgetful, RetainKeys, RetainScope, Retainable};
pub use slot_table::{SlotReader, SlotTable, SlotWriter};
pub use snapshot::{ApplyObserver, MutableSnapshot, ObserverHandle, SnapshotHub};

/// Positional/user composition key. Negative values are reserved for
/// sentinels (see [`slot_table::LIVE_EDIT_INVALID_KEY`]).
pub type Key = i64;

/// Identifier for a node created by the [`Applier`]. The applier owns the
/// mapping from `NodeId` to its real node; this crate only threads the
/// identifier through.
pub type NodeId = usize;

/// Hashes a value the same way positional keys are hashed elsewhere in this
/// crate, truncated into a [`Key`].
pub fn hash_key<T: std::hash::Hash>(value: &T) -> Key {
    use std::hash::Hasher;
    let mut hasher = hash::default::new();
    value.hash(&mut hasher);
    hasher.finish() as i64
}

/// Combines a source location into a stable positional [`Key`], mirroring
/// how call-site groups are keyed without requiring the caller to hash
/// anything themselves.
pub fn location_key(file: &'static str, line: u32, column: u32) -> Key {
    use std::hash::{Hash, Hasher};
    let mut hasher = hash::default::new();
    file.hash(&mut hasher);
    line.hash(&mut hasher);
    column.hash(&mut hasher);
    hasher.finish() as i64
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

/// End-to-end scenarios exercising more than one module together, as
/// opposed to each module's own `#[cfg(test)]` unit coverage.
#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod scenario_tests;
