//! # io
//!
//! Reading and writing operations.

use std::{
    ffi::OsString,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use image::{ImageError, RgbImage};
use log::info;
use ndarray::Array1;
use ndarray_npy::{read_npy, ReadNpyError};
use polars::{
    lazy::dsl::{col, cols},
    prelude::{CsvReader, DataFrame, IntoLazy, NamedFrom, SerReader},
    series::Series,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::Split,
    constants::{ANNOTATION_COLUMNS, IS_VAL_COLUMN},
    error::{DatasetError, Result},
};

/// Read the annotation table into a `polars` data-frame.
pub fn read_annotations(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(DatasetError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "annotation table not found"),
        ));
    }
    let frame = CsvReader::from_path(path)?.has_header(true).finish()?;
    info!("Read {} annotated frames from {:?}.", frame.height(), path);
    Ok(frame)
}

/// Read the per-row validation-membership mask.
pub fn read_split_mask(path: &Path) -> Result<Array1<bool>> {
    read_npy(path).map_err(|error| match error {
        ReadNpyError::Io(source) => DatasetError::io(path, source),
        source => DatasetError::Npy {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Keep the rows of `split`, densely re-indexed, capped to `subset_len` rows.
pub fn select_split(
    mut frame: DataFrame,
    is_val: &Array1<bool>,
    split: Split,
    subset_len: Option<usize>,
) -> Result<DataFrame> {
    if frame.height() != is_val.len() {
        return Err(DatasetError::Config(format!(
            "split mask has {} entries but the annotation table has {} rows",
            is_val.len(),
            frame.height()
        )));
    }
    frame.with_column(Series::new(IS_VAL_COLUMN, is_val.to_vec()))?;
    let predicate = if split.keeps_validation_rows() {
        col(IS_VAL_COLUMN)
    } else {
        col(IS_VAL_COLUMN).not()
    };
    let selected = frame
        .lazy()
        .filter(predicate)
        .select(&[cols(ANNOTATION_COLUMNS)])
        .collect()?;
    let selected = match subset_len {
        Some(subset_len) => selected.head(Some(subset_len)),
        None => selected,
    };
    info!("Selected {} frames for the `{split}` split.", selected.height());
    Ok(selected)
}

/// Read an image and convert it to 8-bit RGB.
pub fn read_image_rgb8(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|image| image.to_rgb8())
        .map_err(|error| match error {
            ImageError::IoError(source) => DatasetError::io(path, source),
            source => DatasetError::Image {
                path: path.to_path_buf(),
                source,
            },
        })
}

/// `<path>.json`, keeping any existing extension.
pub fn json_path(path: &Path) -> PathBuf {
    let mut file_name = OsString::from(path.as_os_str());
    file_name.push(".json");
    PathBuf::from(file_name)
}

/// Serialize `value` to `<path>.json`.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let path = json_path(path);
    let file = File::create(&path).map_err(|source| DatasetError::io(&path, source))?;
    serde_json::to_writer(BufWriter::new(file), value)?;
    Ok(())
}

/// Deserialize a value from `<path>.json`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let path = json_path(path);
    let file = File::open(&path).map_err(|source| DatasetError::io(&path, source))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ndarray::array;
    use polars::prelude::NamedFrom;

    use super::{
        json_path, load_json, read_image_rgb8, read_split_mask, save_json, select_split,
    };
    use crate::{config::Split, error::DatasetError};

    fn annotation_frame() -> polars::prelude::DataFrame {
        polars::df!(
            "extra" => vec![9, 9, 9, 9],
            "im_name" => vec!["0.png", "1.png", "2.png", "3.png"],
            "direction" => vec![0.0, 0.0, 0.0, 0.0],
            "seq_id" => vec![0_i64, 0, 1, 1],
            "red_light" => vec![false; 4],
            "hazard_stop" => vec![false; 4],
            "speed_sign" => vec![-1_i64; 4],
            "relative_angle" => vec![0.0; 4],
            "center_distance" => vec![0.0; 4],
            "veh_distance" => vec![0.0; 4],
        )
        .unwrap()
    }

    fn names(frame: &polars::prelude::DataFrame) -> Vec<String> {
        frame
            .column("im_name")
            .unwrap()
            .utf8()
            .unwrap()
            .into_iter()
            .map(|name| name.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_select_split() {
        let is_val = array![false, true, false, false];
        let train = select_split(annotation_frame(), &is_val, Split::Train, None).unwrap();
        assert_eq!(names(&train), vec!["0.png", "2.png", "3.png"]);
        assert!(train.column("extra").is_err());

        let val = select_split(annotation_frame(), &is_val, Split::Val, None).unwrap();
        assert_eq!(names(&val), vec!["1.png"]);

        let subset = select_split(annotation_frame(), &is_val, Split::Train, Some(2)).unwrap();
        assert_eq!(names(&subset), vec!["0.png", "2.png"]);
    }

    #[test]
    fn test_select_split_rejects_misaligned_mask() {
        let is_val = array![false, true];
        let error = select_split(annotation_frame(), &is_val, Split::Train, None).unwrap_err();
        assert!(matches!(error, DatasetError::Config(_)));
    }

    #[test]
    fn test_missing_image_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = read_image_rgb8(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(error, DatasetError::Io { .. }));
    }

    #[test]
    fn test_split_mask_errors() {
        let dir = tempfile::tempdir().unwrap();
        let error = read_split_mask(&dir.path().join("is_val.npy")).unwrap_err();
        assert!(matches!(error, DatasetError::Io { .. }));

        let path = dir.path().join("garbage.npy");
        std::fs::write(&path, b"not a numpy file").unwrap();
        let error = read_split_mask(&path).unwrap_err();
        assert!(matches!(error, DatasetError::Npy { .. }));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.v1");
        assert_eq!(json_path(&path), dir.path().join("stats.v1.json"));

        let stats = BTreeMap::from([
            ("frames".to_string(), 12_usize),
            ("sequences".to_string(), 3),
        ]);
        save_json(&stats, &path).unwrap();
        let loaded: BTreeMap<String, usize> = load_json(&path).unwrap();
        assert_eq!(loaded, stats);
        assert!(load_json::<BTreeMap<String, usize>>(&dir.path().join("absent")).is_err());
    }
}
