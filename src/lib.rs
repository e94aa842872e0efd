//! # cal_dataset
//!
//! Sequence-windowed driving affordance dataset.
//!
//! Frames from many recorded drives are concatenated into one table. The
//! dataset serves fixed-length windows of consecutive frames that never
//! cross from one drive into the next, paired with one-hot and normalized
//! affordance labels.

#![warn(missing_docs)]

pub mod augmentations;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod io;
pub mod labels;
pub mod structures;
pub mod transforms;
pub mod window;

pub use config::{DatasetConfig, Split, TransformConfig};
pub use dataset::{DatasetPair, SequenceWindowedDataset};
pub use error::{DatasetError, Result};
