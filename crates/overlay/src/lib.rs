//! Overlay engine crate.
//!
//! Drives batches of isochrone fetches over the live point/category set and
//! keeps the per-point result map consistent with it.

pub mod engine;

pub use engine::{BatchReport, BatchState, OverlayEngine, Progress, SKIPPED_MESSAGE};
