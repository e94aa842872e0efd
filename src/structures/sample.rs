//! # sample
//!
//! Output of a single dataset access.

use std::collections::BTreeMap;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::{labels::{EncodedLabel, LabelKey}, window::Window};

/// Model inputs for one window.
#[derive(Clone, Debug)]
pub struct Inputs {
    /// Stacked frames, `[seq_len, channels, height, width]`.
    pub sequence: Array4<f32>,
    /// Driving direction command at the label index.
    pub direction: f32,
    /// Window the frames were read from.
    pub window: Window,
}

/// Encoded labels of one frame, keyed by affordance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Labels(BTreeMap<LabelKey, EncodedLabel>);

impl Labels {
    /// Wrap encoded labels.
    pub fn new(labels: BTreeMap<LabelKey, EncodedLabel>) -> Self {
        Self(labels)
    }

    /// Encoded label of `key`.
    pub fn get(&self, key: LabelKey) -> Option<&EncodedLabel> {
        self.0.get(&key)
    }

    /// Number of label keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no label is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&LabelKey, &EncodedLabel)> {
        self.0.iter()
    }
}
