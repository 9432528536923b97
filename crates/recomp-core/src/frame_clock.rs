//! `BroadcastFrameClock` / `NextFrameEndCallbackQueue`: cooperative
//! suspension primitives the Recomposer's loop drives a frame through.
//!
//! The core treats real suspension (coroutines, parked threads) as a
//! collaborator concern (platform integration, coroutine contexts);
//! what belongs here is the *queue* of parked awaiters and the
//! broadcast/wake contract, expressed with plain callback queues the way a
//! runtime's `frame_callbacks` queue would (a `VecDeque` drained once per
//! `drain_frame_callbacks` call) rather than with an async runtime.

use std::cell::RefCell;

type FrameCallback = Box<dyn FnOnce(u64)>;
type FrameEndCallback = Box<dyn FnOnce()>;

/// Queue of callbacks parked on "the next time a frame is pushed", matching
/// `parentFrameClock.withFrameNanos` re-exposed to user
/// code through the broadcast clock.
#[derive(Default)]
pub struct BroadcastFrameClock {
    awaiters: RefCell<Vec<FrameCallback>>,
    cancelled: RefCell<bool>,
}

impl BroadcastFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_awaiters(&self) -> bool {
        !self.awaiters.borrow().is_empty()
    }

    /// Park `callback` until the next `broadcast`.
    pub fn with_frame_nanos(&self, callback: impl FnOnce(u64) + 'static) {
        if *self.cancelled.borrow() {
            return;
        }
        self.awaiters.borrow_mut().push(Box::new(callback));
    }

    /// Wake every currently-parked awaiter with `frame_time_nanos`
    /// ("if broadcast clock has awaiters: broadcast(t)").
    pub fn broadcast(&self, frame_time_nanos: u64) {
        let pending: Vec<_> = self.awaiters.borrow_mut().drain(..).collect();
        for cb in pending {
            cb(frame_time_nanos);
        }
    }

    /// Cancellation must propagate to parked awaiters as a failure; the
    /// reference implementation just drops them, since callers observe
    /// cancellation through the Recomposer's own error/shutdown state rather
    /// than a per-awaiter result here.
    pub fn cancel(&self) {
        *self.cancelled.borrow_mut() = true;
        self.awaiters.borrow_mut().clear();
    }
}

/// Queue of callbacks parked on "the end of the current frame's apply pass",
/// fired after `applyLateChanges`/`changesApplied` per the recomposer's main loop's
/// last step ("fire frame-end callbacks").
#[derive(Default)]
pub struct NextFrameEndCallbackQueue {
    callbacks: RefCell<Vec<FrameEndCallback>>,
}

impl NextFrameEndCallbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    pub fn push(&self, callback: impl FnOnce() + 'static) {
        self.callbacks.borrow_mut().push(Box::new(callback));
    }

    pub fn drain_and_run(&self) {
        let pending: Vec<_> = self.callbacks.borrow_mut().drain(..).collect();
        for cb in pending {
            cb();
        }
    }
}

#[cfg(test)]
#[path = "tests/frame_clock_tests.rs"]
mod tests;
