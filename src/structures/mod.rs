//! # structures
//!
//! Data structures shared by the dataset.

/// Per-frame annotations.
pub mod frame_table;
/// Per-access outputs.
pub mod sample;
