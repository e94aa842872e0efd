//! # dataset
//!
//! Random-access dataset of boundary-aware frame windows.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::{stack, Array3, Axis};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    config::{DatasetConfig, Split},
    error::{DatasetError, Result},
    io::{read_annotations, read_image_rgb8, read_split_mask, select_split},
    labels::LabelSet,
    structures::{
        frame_table::FrameTable,
        sample::{Inputs, Labels},
    },
    transforms::ImagePipeline,
    window::{SequenceBoundaries, Window},
};

/// Fixed-length frame windows over concatenated recorded drives.
///
/// Immutable after construction; `get` may be called concurrently.
pub struct SequenceWindowedDataset {
    config: DatasetConfig,
    frame_paths: Vec<PathBuf>,
    directions: Vec<f32>,
    labels: LabelSet,
    boundaries: SequenceBoundaries,
    pipeline: ImagePipeline,
}

impl SequenceWindowedDataset {
    /// Load the split described by `config` from its root directory.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        let annotations = read_annotations(&config.annotations_path())?;
        let is_val = read_split_mask(&config.split_mask_path())?;
        let frame = select_split(annotations, &is_val, config.split, config.subset_len)?;
        let table = FrameTable::from_frame(&frame)?;
        Self::from_table(table, config)
    }

    /// Build a dataset from an already filtered frame table.
    pub fn from_table(table: FrameTable, config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        table.validate()?;
        let labels = LabelSet::encode(&table)?;
        let boundaries = SequenceBoundaries::from_sequence_ids(&table.seq_ids);
        info!(
            "Indexed {} frames in {} sequences for the `{}` split.",
            table.len(),
            boundaries.num_sequences(),
            config.split
        );
        if table.is_empty() {
            warn!("The `{}` split is empty.", config.split);
        }
        for range in boundaries.short_sequences(config.seq_len) {
            warn!(
                "Sequence at frames {range:?} is too short for windows of {} frames.",
                config.seq_len
            );
        }

        let frame_paths = table
            .im_names
            .iter()
            .map(|im_name| config.root_dir.join(im_name))
            .collect();
        let pipeline = ImagePipeline::new(config.split, &config.transform);
        Ok(Self {
            frame_paths,
            directions: table.directions,
            labels,
            boundaries,
            pipeline,
            config,
        })
    }

    /// Number of addressable frames.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.frame_paths.len()
    }

    /// Returns `true` if the split has no frames.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames per window.
    pub fn seq_len(&self) -> usize {
        self.config.seq_len
    }

    /// Split served by the dataset.
    pub fn split(&self) -> Split {
        self.config.split
    }

    /// Sequence boundaries of the split.
    pub fn boundaries(&self) -> &SequenceBoundaries {
        &self.boundaries
    }

    /// Pre-encoded labels of the split.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Resolved image path of every frame.
    pub fn frame_paths(&self) -> &[PathBuf] {
        &self.frame_paths
    }

    /// Resolve `index` (any integer, wrapped modulo [`len`](Self::len)) into a window.
    pub fn resolve_window(&self, index: i64) -> Result<Window> {
        self.boundaries.resolve(index, self.config.seq_len)
    }

    /// Window inputs and the labels at its label index.
    pub fn get(&self, index: i64) -> Result<(Inputs, Labels)> {
        let window = self.resolve_window(index)?;
        let sequence = self.load_sequence(&window)?;
        let direction = *self.directions.get(window.label_index).ok_or_else(|| {
            DatasetError::Data(format!("no direction at frame {}", window.label_index))
        })?;
        let labels = self.labels.at(window.label_index)?;
        Ok((
            Inputs {
                sequence,
                direction,
                window,
            },
            labels,
        ))
    }

    /// Load, transform and stack the frames of `window`, in order.
    fn load_sequence(&self, window: &Window) -> Result<ndarray::Array4<f32>> {
        let paths = &self.frame_paths[window.frames()];
        let frames = paths
            .par_iter()
            .map(|path| self.load_frame(path))
            .collect::<Result<Vec<Array3<f32>>>>()?;
        let views = frames.iter().map(|frame| frame.view()).collect::<Vec<_>>();
        debug!("Stacking {} frames from {:?}.", views.len(), window);
        Ok(stack(Axis(0), &views)?)
    }

    fn load_frame(&self, path: &Path) -> Result<Array3<f32>> {
        Ok(self.pipeline.run(read_image_rgb8(path)?))
    }
}

/// Train and validation datasets built from one root directory.
pub struct DatasetPair {
    /// Training dataset.
    pub train: SequenceWindowedDataset,
    /// Validation dataset.
    pub val: SequenceWindowedDataset,
}

impl DatasetPair {
    /// Full train and val splits.
    pub fn new(root_dir: impl Into<PathBuf>, seq_len: usize) -> Result<Self> {
        let root_dir = root_dir.into();
        Ok(Self {
            train: SequenceWindowedDataset::new(DatasetConfig::new(&root_dir, "train", seq_len)?)?,
            val: SequenceWindowedDataset::new(DatasetConfig::new(&root_dir, "val", seq_len)?)?,
        })
    }

    /// Two capped datasets over the first `subset_len` training frames, for
    /// checking that a model can overfit a small subset.
    pub fn mini(root_dir: impl Into<PathBuf>, seq_len: usize, subset_len: usize) -> Result<Self> {
        let config = DatasetConfig::new(root_dir, "train", seq_len)?.with_subset_len(subset_len);
        Ok(Self {
            train: SequenceWindowedDataset::new(config.clone())?,
            val: SequenceWindowedDataset::new(config)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use image::{Rgb, RgbImage};
    use ndarray::Array1;
    use rayon::prelude::{IntoParallelIterator, ParallelIterator};
    use tempfile::TempDir;

    use super::{DatasetPair, SequenceWindowedDataset};
    use crate::{
        augmentations::AugmentationConfig,
        config::{DatasetConfig, TransformConfig},
        error::DatasetError,
        labels::{EncodedLabel, LabelKey},
    };

    const WIDTH: u32 = 16;
    const HEIGHT: u32 = 12;

    /// Frames of the train split: drives of 5 and 8 frames.
    /// Validation rows are interleaved and must be filtered out.
    const TRAIN_SEQ_IDS: [i64; 13] = [0, 0, 0, 0, 0, 4, 4, 4, 4, 4, 4, 4, 4];
    const SPEED_SIGNS: [i64; 4] = [-1, 30, 60, 90];

    /// Write annotations, mask and one solid-gray PNG per frame. The gray
    /// level of train frame `i` is `10 * i`.
    fn write_fixture(speed_sign_override: Option<&str>) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("frames")).unwrap();

        let mut csv = String::from(
            "im_name,direction,seq_id,red_light,hazard_stop,speed_sign,\
             relative_angle,center_distance,veh_distance\n",
        );
        let mut is_val = vec![];
        for (i, seq_id) in TRAIN_SEQ_IDS.iter().enumerate() {
            let im_name = format!("frames/train_{i}.png");
            write_frame(&dir.path().join(&im_name), (10 * i) as u8);
            let speed_sign = match (i, speed_sign_override) {
                (3, Some(value)) => value.to_string(),
                _ => SPEED_SIGNS[i % 4].to_string(),
            };
            let red_light = if i % 2 == 0 { "True" } else { "False" };
            csv.push_str(&format!(
                "{im_name},{},{seq_id},{red_light},False,{speed_sign},{},{},{}\n",
                i % 3,
                i as f64 - 6.0,
                0.5 * i as f64,
                -(i as f64) * 2.0,
            ));
            is_val.push(false);

            if i % 4 == 1 {
                let im_name = format!("frames/val_{i}.png");
                write_frame(&dir.path().join(&im_name), 255);
                csv.push_str(&format!(
                    "{im_name},0,{},False,True,30,1.0,1.0,1.0\n",
                    100 + seq_id
                ));
                is_val.push(true);
            }
        }
        fs::write(dir.path().join("annotations.csv"), csv).unwrap();
        ndarray_npy::write_npy(dir.path().join("is_val.npy"), &Array1::from(is_val)).unwrap();
        dir
    }

    fn write_frame(path: &Path, gray: u8) {
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([gray, gray, gray]))
            .save(path)
            .unwrap();
    }

    fn config(root: &Path, split: &str, seq_len: usize) -> DatasetConfig {
        let transform = TransformConfig {
            crop_box: [0, 0, WIDTH, HEIGHT],
            rescale: 0.5,
            mean: [0.0; 3],
            std: [1.0; 3],
            augmentation: AugmentationConfig::disabled(),
        };
        DatasetConfig::new(root, split, seq_len)
            .unwrap()
            .with_transform(transform)
    }

    fn frame_gray(sequence: &ndarray::Array4<f32>, t: usize) -> u8 {
        (sequence[[t, 0, 0, 0]] * 255.0).round() as u8
    }

    #[test]
    fn test_construction_filters_split() {
        let dir = write_fixture(None);
        let train = SequenceWindowedDataset::new(config(dir.path(), "train", 3)).unwrap();
        assert_eq!(train.len(), 13);
        assert_eq!(train.boundaries().starts(), &[0, 5]);
        assert!(train.frame_paths()[12].ends_with("frames/train_12.png"));

        let val = SequenceWindowedDataset::new(config(dir.path(), "val", 1)).unwrap();
        assert_eq!(val.len(), 3);
        assert_eq!(val.boundaries().num_sequences(), 2);
    }

    #[test]
    fn test_get_shifts_window_before_boundary() {
        let dir = write_fixture(None);
        let dataset = SequenceWindowedDataset::new(config(dir.path(), "train", 3)).unwrap();
        let (inputs, labels) = dataset.get(4).unwrap();

        assert_eq!(inputs.window.start, 2);
        assert_eq!(inputs.sequence.shape(), &[3, 3, HEIGHT as usize / 2, WIDTH as usize / 2]);
        let grays: Vec<u8> = (0..3).map(|t| frame_gray(&inputs.sequence, t)).collect();
        assert_eq!(grays, vec![20, 30, 40]);

        // Labels come from the frame right after the window.
        assert_eq!(inputs.window.label_index, 5);
        assert_eq!(inputs.direction, (5 % 3) as f32);
        assert_eq!(
            labels.get(LabelKey::SpeedSign),
            Some(&EncodedLabel::OneHot(vec![0.0, 1.0, 0.0, 0.0]))
        );
        assert_eq!(
            labels.get(LabelKey::RedLight),
            Some(&EncodedLabel::OneHot(vec![1.0, 0.0]))
        );
        assert_eq!(labels.len(), 6);
    }

    #[test]
    fn test_continuous_labels_use_split_normalizer() {
        let dir = write_fixture(None);
        let dataset = SequenceWindowedDataset::new(config(dir.path(), "train", 3)).unwrap();
        assert_eq!(dataset.labels().normalizer(LabelKey::RelativeAngle), Some(6.0));
        assert_eq!(dataset.labels().normalizer(LabelKey::VehDistance), Some(24.0));

        let (_, labels) = dataset.get(0).unwrap();
        assert_eq!(
            labels.get(LabelKey::RelativeAngle),
            Some(&EncodedLabel::Scalar(-0.5))
        );
        for (_, label) in labels.iter() {
            match label {
                EncodedLabel::OneHot(values) => assert_eq!(values.iter().sum::<f32>(), 1.0),
                EncodedLabel::Scalar(value) => assert!((-1.0..=1.0).contains(value)),
            }
        }
    }

    #[test]
    fn test_wraparound_and_first_frame() {
        let dir = write_fixture(None);
        let dataset = SequenceWindowedDataset::new(config(dir.path(), "train", 3)).unwrap();
        let total = dataset.len() as i64;
        for index in 0..total {
            assert_eq!(
                dataset.resolve_window(index).unwrap(),
                dataset.resolve_window(index + total).unwrap()
            );
        }

        let (inputs, _) = dataset.get(5 + total).unwrap();
        assert_eq!(inputs.window.start, 5);
        assert_eq!(frame_gray(&inputs.sequence, 0), 50);
    }

    #[test]
    fn test_unknown_category_fails_at_construction() {
        let dir = write_fixture(Some("45"));
        let error = SequenceWindowedDataset::new(config(dir.path(), "train", 3))
            .err()
            .unwrap();
        assert!(error.is_data_error());
    }

    #[test]
    fn test_missing_frame_fails_window() {
        let dir = write_fixture(None);
        let dataset = SequenceWindowedDataset::new(config(dir.path(), "train", 3)).unwrap();
        fs::remove_file(dir.path().join("frames/train_1.png")).unwrap();
        assert!(matches!(dataset.get(0), Err(DatasetError::Io { .. })));
        assert!(dataset.get(6).is_ok());
    }

    #[test]
    fn test_missing_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let error = SequenceWindowedDataset::new(config(dir.path(), "train", 3))
            .err()
            .unwrap();
        assert!(matches!(error, DatasetError::Io { .. }));
    }

    #[test]
    fn test_missing_split_mask() {
        let dir = write_fixture(None);
        fs::remove_file(dir.path().join("is_val.npy")).unwrap();
        let error = SequenceWindowedDataset::new(config(dir.path(), "train", 3))
            .err()
            .unwrap();
        assert!(matches!(error, DatasetError::Io { .. }));
    }

    #[test]
    fn test_concurrent_access() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SequenceWindowedDataset>();

        let dir = write_fixture(None);
        let mut config = config(dir.path(), "train", 2);
        config.transform.augmentation = AugmentationConfig::default();
        let dataset = SequenceWindowedDataset::new(config).unwrap();
        let windows: Vec<_> = (0..64_i64)
            .into_par_iter()
            .map(|index| dataset.get(index).unwrap().0.window)
            .collect();
        for (index, window) in windows.into_iter().enumerate() {
            assert_eq!(window, dataset.resolve_window(index as i64).unwrap());
        }
    }

    #[test]
    fn test_mini_pair_uses_train_subset() {
        let dir = write_fixture(None);
        let pair = DatasetPair::mini(dir.path(), 2, 9).unwrap();
        assert_eq!(pair.train.len(), 9);
        assert_eq!(pair.val.len(), 9);
        assert_eq!(pair.val.split(), crate::config::Split::Train);

        let pair = DatasetPair::new(dir.path(), 1).unwrap();
        assert_eq!((pair.train.len(), pair.val.len()), (13, 3));
    }
}
