//! Wires a [`Recomposer`], one [`Composition`], and a [`MemoryApplier`]
//! together the way almost every integration test needs: one shell, one
//! content closure, a `settle`/`run_one_frame` step, scaled down to this
//! crate's headless, composer-agnostic core.

use recomp_core::{
    Composer, CompositionId, Composition, CoreError, FrameSummary, InlineExecutor, MemoryApplier,
    RecomposeExecutor, Recomposer, RecomposerConfig, SnapshotHub,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A single composition registered against its own recomposer, with an
/// in-memory applier it can be inspected through.
pub struct TestHarness {
    pub hub: Arc<SnapshotHub>,
    pub recomposer: Rc<Recomposer>,
    pub composition: Rc<RefCell<Composition>>,
    pub applier: Rc<RefCell<MemoryApplier>>,
    pub composition_id: CompositionId,
}

impl TestHarness {
    pub fn new(composer: Box<dyn Composer>) -> Self {
        Self::with_config(composer, RecomposerConfig::default())
    }

    pub fn with_config(composer: Box<dyn Composer>, config: RecomposerConfig) -> Self {
        let hub = SnapshotHub::new();
        let recomposer = Recomposer::new(config, Arc::clone(&hub));
        recomposer.start();
        let composition = Rc::new(RefCell::new(Composition::new(composer)));
        let applier: Rc<RefCell<MemoryApplier>> = Rc::new(RefCell::new(MemoryApplier::new()));
        let applier_dyn: Rc<RefCell<dyn recomp_core::Applier>> = applier.clone();
        let composition_id = recomposer.register_composition(Rc::clone(&composition), applier_dyn);
        Self {
            hub,
            recomposer,
            composition,
            applier,
            composition_id,
        }
    }

    /// Run frames with the default inline executor until no work remains.
    pub fn settle(&self, frame_time_nanos: u64) -> Result<usize, CoreError> {
        self.recomposer.pump_until_idle(frame_time_nanos, &InlineExecutor)
    }

    pub fn run_one_frame(&self, frame_time_nanos: u64) -> Result<FrameSummary, CoreError> {
        self.run_one_frame_with(frame_time_nanos, &InlineExecutor)
    }

    pub fn run_one_frame_with(
        &self,
        frame_time_nanos: u64,
        executor: &dyn RecomposeExecutor,
    ) -> Result<FrameSummary, CoreError> {
        self.recomposer.run_one_frame(frame_time_nanos, executor)
    }

    pub fn dispose(&self) {
        self.recomposer.dispose_composition(self.composition_id);
    }
}
