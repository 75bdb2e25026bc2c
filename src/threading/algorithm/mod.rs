//! Thread building algorithm
//!
//! This module implements the JWZ (Jamie Zawinski) threading algorithm
//! for organizing messages into conversation threads.
//!
//! ## Main Entry Point
//!
//! Use `build_forest()` to thread a message index.

pub(crate) mod cycle_detection;
mod jwz_threading;
pub(crate) mod tree_traversal;

// Re-export the main threading function
pub use jwz_threading::{BuildOptions, BuildStats, build_forest};
