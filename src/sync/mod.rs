//! Change synchronization
//!
//! Implements:
//! - Per-feature change trackers with add/remove collapse for lists
//! - From-empty replay of features on attach
//! - The diff collection pass producing [`NodeChange`] records

mod change;
mod collector;
#[cfg(test)]
mod mirror;
mod tracker;

pub use change::*;

pub(crate) use tracker::FeatureTracker;
