//! # config
//!
//! Dataset and image-pipeline configuration.

use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    augmentations::AugmentationConfig,
    constants::{
        ANNOTATIONS_FILE_NAME, DEFAULT_CROP_BOX, DEFAULT_RESCALE, IMAGENET_MEAN, IMAGENET_STD,
        IS_VAL_FILE_NAME,
    },
    error::{DatasetError, Result},
};

/// Train/validation partition of the frame table.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Rows not flagged in `is_val.npy`.
    Train,
    /// Rows flagged in `is_val.npy`.
    Val,
}

impl Split {
    /// Parse a split selector (`train` or `val`).
    pub fn parse(selector: &str) -> Result<Self> {
        Split::from_str(selector).map_err(|_| {
            DatasetError::Config(format!(
                "unknown split `{selector}`, expected `train` or `val`"
            ))
        })
    }

    /// Returns `true` if the split keeps rows flagged as validation.
    pub fn keeps_validation_rows(&self) -> bool {
        matches!(self, Split::Val)
    }
}

/// Deterministic image steps plus the augmentation applied to training frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Crop box `(left, upper, right, lower)`, in pixels.
    pub crop_box: [u32; 4],
    /// Scale factor applied after cropping.
    pub rescale: f32,
    /// Per-channel mean subtracted after scaling to `[0, 1]`.
    pub mean: [f32; 3],
    /// Per-channel standard deviation.
    pub std: [f32; 3],
    /// Randomized augmentation of training frames.
    pub augmentation: AugmentationConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            crop_box: DEFAULT_CROP_BOX,
            rescale: DEFAULT_RESCALE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TransformConfig {
    /// Reject empty crops, non-positive scales and zero deviations.
    pub fn validate(&self) -> Result<()> {
        let [left, upper, right, lower] = self.crop_box;
        if right <= left || lower <= upper {
            return Err(DatasetError::Config(format!(
                "empty crop box {:?}",
                self.crop_box
            )));
        }
        if !(self.rescale.is_finite() && self.rescale > 0.0) {
            return Err(DatasetError::Config(format!(
                "rescale must be positive, got {}",
                self.rescale
            )));
        }
        if self.std.iter().any(|std| !(std.is_finite() && *std > 0.0)) {
            return Err(DatasetError::Config(format!(
                "standard deviations must be positive, got {:?}",
                self.std
            )));
        }
        self.augmentation.validate()
    }
}

/// Parameters of a sequence-windowed dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root dataset directory holding the annotations, mask and images.
    pub root_dir: PathBuf,
    /// Split served by the dataset.
    pub split: Split,
    /// Frames per window.
    pub seq_len: usize,
    /// Keep only the first `subset_len` rows of the split.
    pub subset_len: Option<usize>,
    /// Image pipeline.
    pub transform: TransformConfig,
}

impl DatasetConfig {
    /// Build a configuration from a split selector string.
    pub fn new(root_dir: impl Into<PathBuf>, split: &str, seq_len: usize) -> Result<Self> {
        let config = Self {
            root_dir: root_dir.into(),
            split: Split::parse(split)?,
            seq_len,
            subset_len: None,
            transform: TransformConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Cap the number of usable rows. `0` means no cap.
    pub fn with_subset_len(mut self, subset_len: usize) -> Self {
        self.subset_len = (subset_len > 0).then_some(subset_len);
        self
    }

    /// Replace the image pipeline.
    pub fn with_transform(mut self, transform: TransformConfig) -> Self {
        self.transform = transform;
        self
    }

    /// Check construction parameters.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(DatasetError::Config("`root_dir` is empty".into()));
        }
        if self.seq_len == 0 {
            return Err(DatasetError::Config("`seq_len` must be positive".into()));
        }
        if self.subset_len == Some(0) {
            return Err(DatasetError::Config(
                "`subset_len` must be positive when set".into(),
            ));
        }
        self.transform.validate()
    }

    /// Annotation table path.
    /// E.g., `<root_dir>/annotations.csv`.
    pub fn annotations_path(&self) -> PathBuf {
        self.root_dir.join(ANNOTATIONS_FILE_NAME)
    }

    /// Validation-membership mask path.
    /// E.g., `<root_dir>/is_val.npy`.
    pub fn split_mask_path(&self) -> PathBuf {
        self.root_dir.join(IS_VAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::{DatasetConfig, Split, TransformConfig};

    #[test]
    fn test_split_selector() {
        assert_eq!(Split::parse("train").unwrap(), Split::Train);
        assert_eq!(Split::parse("val").unwrap(), Split::Val);
        assert_eq!(Split::Val.to_string(), "val");
        let error = Split::parse("test").unwrap_err();
        assert!(error.to_string().contains("unknown split `test`"));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(DatasetConfig::new("/data", "train", 0).is_err());
        assert!(DatasetConfig::new("", "train", 3).is_err());
        assert!(DatasetConfig::new("/data", "eval", 3).is_err());

        let config = DatasetConfig::new("/data", "val", 3).unwrap();
        assert_eq!(config.clone().with_subset_len(0).subset_len, None);
        assert_eq!(config.with_subset_len(40).subset_len, Some(40));
    }

    #[test]
    fn test_transform_validation() {
        let mut transform = TransformConfig::default();
        transform.validate().unwrap();
        transform.crop_box = [10, 0, 10, 5];
        assert!(transform.validate().is_err());

        let mut transform = TransformConfig::default();
        transform.rescale = 0.0;
        assert!(transform.validate().is_err());

        let mut transform = TransformConfig::default();
        transform.std[1] = 0.0;
        assert!(transform.validate().is_err());
    }

    #[test]
    fn test_paths() {
        let config = DatasetConfig::new("/data/cal", "train", 3).unwrap();
        assert_eq!(
            config.annotations_path().to_str(),
            Some("/data/cal/annotations.csv")
        );
        assert_eq!(config.split_mask_path().to_str(), Some("/data/cal/is_val.npy"));
    }
}
