//! # window
//!
//! Sequence boundaries and boundary-aware window resolution.

use std::ops::Range;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Rightmost insertion point of `value` in the ascending slice `sorted`.
///
/// Entries equal to `value` stay to the left of the returned position, so a
/// frame that is itself the first frame of a sequence resolves to the
/// position *after* that sequence's start.
pub fn insertion_point_right(sorted: &[usize], value: usize) -> usize {
    sorted.partition_point(|&start| start <= value)
}

/// Run of `len` consecutive frames starting at `start`, supervised by the
/// label at `label_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// First frame of the window.
    pub start: usize,
    /// Number of frames.
    pub len: usize,
    /// Frame whose labels supervise the window (`start + len`).
    pub label_index: usize,
}

impl Window {
    /// Frame indices covered by the window.
    pub fn frames(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// First-frame indices of every recorded sequence in a frame table.
///
/// Only built from sequence ids, so `starts` always begins with frame 0
/// when there are frames. Serializable for reports, never deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SequenceBoundaries {
    starts: Vec<usize>,
    total_frames: usize,
}

impl SequenceBoundaries {
    /// Derive boundaries from per-frame sequence ids: frame 0 plus every
    /// frame whose id differs from the previous frame's.
    pub fn from_sequence_ids(seq_ids: &[i64]) -> Self {
        let starts = if seq_ids.is_empty() {
            vec![]
        } else {
            std::iter::once(0)
                .chain(
                    seq_ids
                        .iter()
                        .tuple_windows()
                        .enumerate()
                        .filter(|(_, (previous, current))| previous != current)
                        .map(|(i, _)| i + 1),
                )
                .collect()
        };
        Self {
            starts,
            total_frames: seq_ids.len(),
        }
    }

    /// Ascending first-frame indices.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Total number of frames covered.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Number of sequences.
    pub fn num_sequences(&self) -> usize {
        self.starts.len()
    }

    /// Index of the sequence containing `frame`.
    pub fn sequence_of(&self, frame: usize) -> Option<usize> {
        if frame >= self.total_frames {
            return None;
        }
        insertion_point_right(&self.starts, frame).checked_sub(1)
    }

    /// Frame range of the sequence at `sequence`.
    pub fn sequence_range(&self, sequence: usize) -> Option<Range<usize>> {
        let start = *self.starts.get(sequence)?;
        let end = self
            .starts
            .get(sequence + 1)
            .copied()
            .unwrap_or(self.total_frames);
        Some(start..end)
    }

    /// Sequences in which at least one index fails to resolve.
    ///
    /// Inner sequences need `seq_len` frames. The final sequence is clamped
    /// against `total_frames - seq_len`, so it needs `2 * seq_len`.
    pub fn short_sequences(&self, seq_len: usize) -> Vec<Range<usize>> {
        let last = self.num_sequences().saturating_sub(1);
        (0..self.num_sequences())
            .filter_map(|sequence| self.sequence_range(sequence).map(|r| (sequence, r)))
            .filter(|(sequence, range)| {
                let required = if *sequence == last { 2 * seq_len } else { seq_len };
                range.len() < required
            })
            .map(|(_, range)| range)
            .collect()
    }

    /// Resolve a logical index into a window that never crosses a sequence
    /// boundary.
    ///
    /// `index` wraps modulo the number of frames (negative indices included).
    /// The next boundary after the wrapped index is either the next
    /// sequence's first frame or, past the last sequence, the synthetic
    /// boundary `total_frames - seq_len`. A window that would cross it is
    /// shifted back to end right before it. The label index is the frame
    /// right after the window.
    pub fn resolve(&self, index: i64, seq_len: usize) -> Result<Window> {
        if self.total_frames == 0 {
            return Err(DatasetError::Data("cannot index an empty dataset".into()));
        }
        if seq_len == 0 {
            return Err(DatasetError::Config("`seq_len` must be positive".into()));
        }
        let total = self.total_frames as i64;
        let len = seq_len as i64;
        let requested = index.rem_euclid(total) as usize;

        let position = insertion_point_right(&self.starts, requested);
        let sequence_start = position
            .checked_sub(1)
            .and_then(|previous| self.starts.get(previous).copied())
            .ok_or_else(|| {
                DatasetError::Data(format!("frame {requested} precedes every sequence start"))
            })?;
        let next_boundary = match self.starts.get(position) {
            Some(&start) => start as i64,
            None => total - len,
        };

        let mut start = requested as i64;
        if next_boundary < start + len {
            start = next_boundary - len;
        }
        let label_index = start + len;
        if start < sequence_start as i64 || label_index >= total {
            return Err(DatasetError::WindowUnderflow {
                index: requested,
                sequence_start,
                seq_len,
            });
        }

        let window = Window {
            start: start as usize,
            len: seq_len,
            label_index: label_index as usize,
        };
        debug!("Resolved index {index} to {window:?}.");
        Ok(window)
    }
}
