//! # error
//!
//! Error types surfaced by dataset construction and access.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors raised while building or reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Invalid split selector or malformed construction parameters.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Annotation content that violates the dataset contract.
    #[error("invalid data: {0}")]
    Data(String),
    /// A window would start before the first frame of its sequence.
    #[error(
        "cannot fit a window of {seq_len} frames for index {index}: \
         sequence starting at frame {sequence_start} is too short"
    )]
    WindowUnderflow {
        /// Requested index after wraparound.
        index: usize,
        /// First frame of the sequence the index belongs to.
        sequence_start: usize,
        /// Window length.
        seq_len: usize,
    },
    /// Missing or unreadable file.
    #[error("cannot access {path:?}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Image that exists but cannot be decoded.
    #[error("cannot decode image {path:?}: {source}")]
    Image {
        /// Offending path.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },
    /// Malformed annotation table.
    #[error("annotation table error: {0}")]
    Table(#[from] polars::prelude::PolarsError),
    /// Malformed `.npy` mask.
    #[error("cannot read split mask {path:?}: {source}")]
    Npy {
        /// Offending path.
        path: PathBuf,
        /// Underlying reader error.
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    /// Frames of one window could not be stacked.
    #[error("cannot stack frames: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatasetError {
    /// Wrap an I/O error with the path that caused it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for contract violations in the data itself.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            DatasetError::Data(_) | DatasetError::WindowUnderflow { .. }
        )
    }
}
