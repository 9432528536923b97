//! Testing utilities for recomp-core.
//!
//! The real front-end (the "composer") is out of scope for the core crate,
//! which leaves every integration test needing a stand-in that implements
//! [`recomp_core::Composer`]. This crate is that stand-in, plus a small
//! harness that wires a [`recomp_core::Recomposer`] and a composition
//! together the way a handful of near-duplicate test setups otherwise would.

pub mod composer;
pub mod harness;

pub use composer::{NoopComposer, ScriptedComposer};
pub use harness::TestHarness;
