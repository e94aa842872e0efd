//! # frame_table
//!
//! Column-oriented per-frame annotations of one split.

use std::collections::BTreeMap;

use log::warn;
use polars::prelude::{AnyValue, DataFrame, DataType, Series};
use strum::IntoEnumIterator;

use crate::{
    constants::{DIRECTION_COLUMN, IM_NAME_COLUMN, SEQ_ID_COLUMN},
    error::{DatasetError, Result},
    labels::{LabelKey, RawValue},
};

/// Annotations of every frame in a split, in acquisition order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTable {
    /// Image path of each frame, relative to the dataset root.
    pub im_names: Vec<String>,
    /// Driving direction command of each frame.
    pub directions: Vec<f32>,
    /// Recorded-drive identifier of each frame.
    pub seq_ids: Vec<i64>,
    /// Raw categorical affordances, keyed by label.
    pub categorical: BTreeMap<LabelKey, Vec<RawValue>>,
    /// Raw continuous affordances, keyed by label.
    pub continuous: BTreeMap<LabelKey, Vec<f64>>,
}

impl FrameTable {
    /// Extract a frame table from an annotation data-frame.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        let im_names = extract_strings(frame.column(IM_NAME_COLUMN)?)?;
        let directions = extract_f64(frame.column(DIRECTION_COLUMN)?)?
            .into_iter()
            .map(|direction| direction as f32)
            .collect();
        let seq_ids = extract_i64(frame.column(SEQ_ID_COLUMN)?)?;

        let mut categorical = BTreeMap::new();
        let mut continuous = BTreeMap::new();
        for key in LabelKey::iter() {
            let series = frame.column(key.column())?;
            if key.is_categorical() {
                categorical.insert(key, extract_raw(series)?);
            } else {
                continuous.insert(key, extract_f64(series)?);
            }
        }

        let table = Self {
            im_names,
            directions,
            seq_ids,
            categorical,
            continuous,
        };
        if !table.is_time_ordered() {
            warn!("`{SEQ_ID_COLUMN}` is not monotonic; drives are split at every id change.");
        }
        Ok(table)
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.im_names.len()
    }

    /// Returns `true` if the table has no frames.
    pub fn is_empty(&self) -> bool {
        self.im_names.is_empty()
    }

    /// Raw categorical values of `key`.
    pub fn categorical(&self, key: LabelKey) -> Result<&[RawValue]> {
        self.categorical
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| DatasetError::Data(format!("missing categorical label `{key}`")))
    }

    /// Raw continuous values of `key`.
    pub fn continuous(&self, key: LabelKey) -> Result<&[f64]> {
        self.continuous
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| DatasetError::Data(format!("missing continuous label `{key}`")))
    }

    /// Returns `true` if sequence ids never decrease.
    pub fn is_time_ordered(&self) -> bool {
        self.seq_ids.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Check that every column has one entry per frame.
    pub fn validate(&self) -> Result<()> {
        let num_frames = self.len();
        let lengths = [
            (DIRECTION_COLUMN.to_string(), self.directions.len()),
            (SEQ_ID_COLUMN.to_string(), self.seq_ids.len()),
        ]
        .into_iter()
        .chain(self.categorical.iter().map(|(k, v)| (k.to_string(), v.len())))
        .chain(self.continuous.iter().map(|(k, v)| (k.to_string(), v.len())));
        for (column, len) in lengths {
            if len != num_frames {
                return Err(DatasetError::Data(format!(
                    "column `{column}` has {len} entries, expected {num_frames}"
                )));
            }
        }
        Ok(())
    }
}

fn null_cell(series: &Series, row: usize) -> DatasetError {
    DatasetError::Data(format!("column `{}` is empty at row {row}", series.name()))
}

fn extract_strings(series: &Series) -> Result<Vec<String>> {
    let series = series.cast(&DataType::Utf8)?;
    series
        .utf8()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(str::to_string)
                .ok_or_else(|| null_cell(&series, row))
        })
        .collect()
}

fn extract_i64(series: &Series) -> Result<Vec<i64>> {
    let series = series.cast(&DataType::Int64)?;
    series
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or_else(|| null_cell(&series, row)))
        .collect()
}

fn extract_f64(series: &Series) -> Result<Vec<f64>> {
    let series = series.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(value) if value.is_finite() => Ok(value),
            Some(value) => Err(DatasetError::Data(format!(
                "column `{}` holds non-finite value {value} at row {row}",
                series.name()
            ))),
            None => Err(null_cell(&series, row)),
        })
        .collect()
}

fn extract_raw(series: &Series) -> Result<Vec<RawValue>> {
    (0..series.len())
        .map(|row| raw_value(series.get(row)?).ok_or_else(|| null_cell(series, row)))
        .collect()
}

/// Convert a cell into a raw categorical value; `None` for nulls.
fn raw_value(value: AnyValue) -> Option<RawValue> {
    match value {
        AnyValue::Null => None,
        AnyValue::Boolean(value) => Some(RawValue::Bool(value)),
        AnyValue::Utf8(text) => Some(RawValue::parse(text)),
        AnyValue::Float32(value) => Some(RawValue::Float(value as f64)),
        AnyValue::Float64(value) => Some(RawValue::Float(value)),
        other => match other.try_extract::<i64>() {
            Ok(value) => Some(RawValue::Int(value)),
            Err(_) => Some(RawValue::parse(&other.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::NamedFrom;

    use super::FrameTable;
    use crate::labels::{LabelKey, RawValue};

    fn annotation_frame() -> polars::prelude::DataFrame {
        polars::df!(
            "im_name" => vec!["a/0.png", "a/1.png", "b/0.png"],
            "direction" => vec![0.0, 1.0, 2.0],
            "seq_id" => vec![0_i64, 0, 1],
            "red_light" => vec![true, false, false],
            "hazard_stop" => vec!["False", "True", "False"],
            "speed_sign" => vec![-1_i64, 30, 90],
            "relative_angle" => vec![0.1, -0.2, 0.05],
            "center_distance" => vec![1.0, 0.5, -2.0],
            "veh_distance" => vec![50.0, 25.0, 10.0],
        )
        .unwrap()
    }

    #[test]
    fn test_from_frame() {
        let table = FrameTable::from_frame(&annotation_frame()).unwrap();
        table.validate().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.im_names[2], "b/0.png");
        assert_eq!(table.directions, vec![0.0, 1.0, 2.0]);
        assert_eq!(table.seq_ids, vec![0, 0, 1]);
        assert_eq!(
            table.categorical(LabelKey::HazardStop).unwrap(),
            &[RawValue::Bool(false), RawValue::Bool(true), RawValue::Bool(false)]
        );
        assert_eq!(
            table.categorical(LabelKey::SpeedSign).unwrap(),
            &[RawValue::Int(-1), RawValue::Int(30), RawValue::Int(90)]
        );
        assert_eq!(
            table.continuous(LabelKey::CenterDistance).unwrap(),
            &[1.0, 0.5, -2.0]
        );
        assert!(table.is_time_ordered());
    }

    #[test]
    fn test_missing_column_fails() {
        let frame = annotation_frame().drop("speed_sign").unwrap();
        assert!(FrameTable::from_frame(&frame).is_err());
    }
}
