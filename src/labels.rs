//! # labels
//!
//! Affordance label encoding.
//!
//! Categorical affordances are one-hot encoded against a fixed vocabulary.
//! Continuous affordances are divided by the maximum absolute value observed
//! across the whole split, so every window shares the same normalizer.

use std::collections::BTreeMap;

use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    constants::{BOOLEAN_VOCABULARY, FLOAT_VOCABULARY_TOLERANCE, SPEED_SIGN_VOCABULARY},
    error::{DatasetError, Result},
    structures::{frame_table::FrameTable, sample::Labels},
};

/// Affordance label keys, in output order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LabelKey {
    /// Traffic light ahead is red.
    RedLight,
    /// Hazard requiring an immediate stop.
    HazardStop,
    /// Visible speed-limit sign.
    SpeedSign,
    /// Heading relative to the lane.
    RelativeAngle,
    /// Lateral distance to the lane center.
    CenterDistance,
    /// Distance to the vehicle ahead.
    VehDistance,
}

impl LabelKey {
    /// Annotation column the label is read from.
    pub fn column(&self) -> &str {
        self.as_ref()
    }

    /// Declared vocabulary for categorical keys, `None` for continuous keys.
    pub fn vocabulary(&self) -> Option<Vocabulary> {
        match self {
            LabelKey::RedLight | LabelKey::HazardStop => Some(Vocabulary::new(
                BOOLEAN_VOCABULARY.iter().copied().map(RawValue::Bool).collect(),
            )),
            LabelKey::SpeedSign => Some(Vocabulary::new(
                SPEED_SIGN_VOCABULARY
                    .iter()
                    .copied()
                    .map(RawValue::Int)
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Returns `true` for one-hot encoded keys.
    pub fn is_categorical(&self) -> bool {
        self.vocabulary().is_some()
    }
}

/// A raw categorical cell, before encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// Boolean cell.
    Bool(bool),
    /// Integer cell.
    Int(i64),
    /// Floating point cell.
    Float(f64),
    /// Anything else.
    Text(String),
}

impl RawValue {
    /// Parse a textual cell. Booleans are matched case-insensitively.
    pub fn parse(text: &str) -> RawValue {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            RawValue::Bool(true)
        } else if text.eq_ignore_ascii_case("false") {
            RawValue::Bool(false)
        } else if let Ok(value) = text.parse::<i64>() {
            RawValue::Int(value)
        } else if let Ok(value) = text.parse::<f64>() {
            RawValue::Float(value)
        } else {
            RawValue::Text(text.to_string())
        }
    }

    /// Numeric view of the cell. Booleans map to `0` and `1`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            RawValue::Int(value) => Some(*value as f64),
            RawValue::Float(value) => Some(*value),
            RawValue::Text(_) => None,
        }
    }
}

/// Ordered set of admissible values for a categorical affordance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    values: Vec<RawValue>,
}

impl Vocabulary {
    /// Build a vocabulary from its ordered entries.
    pub fn new(values: Vec<RawValue>) -> Self {
        Self { values }
    }

    /// Number of entries (one-hot width).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the vocabulary has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Float vocabularies match with a tolerance instead of exact equality.
    pub fn is_float(&self) -> bool {
        matches!(self.values.first(), Some(RawValue::Float(_)))
    }

    /// Position of the first entry matching `value`.
    pub fn position(&self, value: &RawValue) -> Option<usize> {
        let is_float = self.is_float();
        self.values
            .iter()
            .position(|entry| match (entry.as_f64(), value.as_f64()) {
                (Some(lhs), Some(rhs)) if is_float => {
                    (lhs - rhs).abs() < FLOAT_VOCABULARY_TOLERANCE
                }
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => entry == value,
            })
    }

    /// One-hot encode `values`, one row per value.
    /// Fails on the first value that matches no entry.
    pub fn one_hot(&self, key: LabelKey, values: &[RawValue]) -> Result<Array2<f32>> {
        let mut encoded = Array2::<f32>::zeros([values.len(), self.len()]);
        for (row, value) in values.iter().enumerate() {
            let column = self.position(value).ok_or_else(|| {
                DatasetError::Data(format!(
                    "`{key}` value {value:?} at row {row} is outside vocabulary {:?}",
                    self.values
                ))
            })?;
            encoded[[row, column]] = 1.0;
        }
        Ok(encoded)
    }
}

/// Divide `values` by their maximum absolute value.
/// Returns the normalized column and the normalizer. An all-zero column
/// stays zero.
pub fn normalize_max_abs(values: &[f64]) -> (Array1<f32>, f64) {
    let normalizer = values.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
    if normalizer == 0.0 {
        return (Array1::zeros(values.len()), normalizer);
    }
    let normalized = values
        .iter()
        .map(|value| (value / normalizer) as f32)
        .collect();
    (normalized, normalizer)
}

/// One encoded label column.
#[derive(Clone, Debug)]
pub enum EncodedColumn {
    /// `[num_frames, vocabulary_len]` one-hot rows.
    OneHot(Array2<f32>),
    /// `[num_frames]` normalized scalars.
    Scalar(Array1<f32>),
}

/// A single frame's encoded label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EncodedLabel {
    /// One-hot vector over the key's vocabulary.
    OneHot(Vec<f32>),
    /// Normalized scalar in `[-1, 1]`.
    Scalar(f32),
}

/// Pre-encoded labels for every frame of a split.
#[derive(Clone, Debug)]
pub struct LabelSet {
    columns: BTreeMap<LabelKey, EncodedColumn>,
    normalizers: BTreeMap<LabelKey, f64>,
    num_frames: usize,
}

impl LabelSet {
    /// Encode every label key of `table`.
    pub fn encode(table: &FrameTable) -> Result<Self> {
        let mut columns = BTreeMap::new();
        let mut normalizers = BTreeMap::new();
        for key in LabelKey::iter() {
            let column = match key.vocabulary() {
                Some(vocabulary) => {
                    EncodedColumn::OneHot(vocabulary.one_hot(key, table.categorical(key)?)?)
                }
                None => {
                    let (normalized, normalizer) = normalize_max_abs(table.continuous(key)?);
                    debug!("Normalizing `{key}` by {normalizer}.");
                    normalizers.insert(key, normalizer);
                    EncodedColumn::Scalar(normalized)
                }
            };
            columns.insert(key, column);
        }
        Ok(Self {
            columns,
            normalizers,
            num_frames: table.len(),
        })
    }

    /// Number of encoded frames.
    pub fn len(&self) -> usize {
        self.num_frames
    }

    /// Returns `true` if no frame is encoded.
    pub fn is_empty(&self) -> bool {
        self.num_frames == 0
    }

    /// Encoded column for `key`.
    pub fn column(&self, key: LabelKey) -> Option<&EncodedColumn> {
        self.columns.get(&key)
    }

    /// Split-wide normalizer of a continuous key.
    pub fn normalizer(&self, key: LabelKey) -> Option<f64> {
        self.normalizers.get(&key).copied()
    }

    /// Labels of the frame at `index`.
    pub fn at(&self, index: usize) -> Result<Labels> {
        if index >= self.num_frames {
            return Err(DatasetError::Data(format!(
                "label index {index} is out of range for {} frames",
                self.num_frames
            )));
        }
        let labels = self
            .columns
            .iter()
            .map(|(key, column)| {
                let label = match column {
                    EncodedColumn::OneHot(rows) => EncodedLabel::OneHot(rows.row(index).to_vec()),
                    EncodedColumn::Scalar(values) => EncodedLabel::Scalar(values[index]),
                };
                (*key, label)
            })
            .collect();
        Ok(Labels::new(labels))
    }
}
