//! # transforms
//!
//! Image transforms and the per-split frame pipeline.

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{Array3, Axis};
use nshare::ToNdarray3;

use crate::{
    augmentations::{Augment, Augmenter},
    config::{Split, TransformConfig},
};

/// An operation mapping one image to another.
pub trait Transform: Send + Sync {
    /// Apply the transform.
    fn apply(&self, image: RgbImage) -> RgbImage;
}

/// Transforms applied in insertion order.
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    /// Compose `transforms`, first element applied first.
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    /// Append a transform.
    pub fn push(&mut self, transform: impl Transform + 'static) {
        self.transforms.push(Box::new(transform));
    }

    /// Number of composed transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns `true` if no transform is composed.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, image: RgbImage) -> RgbImage {
        self.transforms
            .iter()
            .fold(image, |image, transform| transform.apply(image))
    }
}

/// Crop to the box `(left, upper, right, lower)`.
/// Pixels of the box outside the image are black, so the output size is
/// always `(right - left, lower - upper)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crop {
    left: u32,
    upper: u32,
    right: u32,
    lower: u32,
}

impl Crop {
    /// Crop box `[left, upper, right, lower]`.
    pub fn new(crop_box: [u32; 4]) -> Self {
        let [left, upper, right, lower] = crop_box;
        Self {
            left,
            upper,
            right,
            lower,
        }
    }
}

impl Transform for Crop {
    fn apply(&self, image: RgbImage) -> RgbImage {
        let width = self.right.saturating_sub(self.left);
        let height = self.lower.saturating_sub(self.upper);
        let inside = imageops::crop_imm(&image, self.left, self.upper, width, height).to_image();
        if inside.dimensions() == (width, height) {
            return inside;
        }
        let mut cropped = RgbImage::new(width, height);
        imageops::replace(&mut cropped, &inside, 0, 0);
        cropped
    }
}

/// Resize both sides by a constant factor (bilinear).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    scalar: f32,
}

impl Rescale {
    /// Scale factor applied to width and height.
    pub fn new(scalar: f32) -> Self {
        Self { scalar }
    }
}

impl Transform for Rescale {
    fn apply(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let width = ((width as f32 * self.scalar) as u32).max(1);
        let height = ((height as f32 * self.scalar) as u32).max(1);
        imageops::resize(&image, width, height, FilterType::Triangle)
    }
}

/// Convert to a `[channels, height, width]` tensor in `[0, 1]`, then
/// standardize each channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalize {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Normalize {
    /// Per-channel statistics.
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// Convert `image` into a normalized tensor.
    pub fn to_tensor(&self, image: RgbImage) -> Array3<f32> {
        let mut tensor = image.into_ndarray3().mapv(|v| v as f32 / 255.0);
        for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            channel.mapv_inplace(|v| (v - mean) / std);
        }
        tensor
    }
}

/// Frame pipeline of one split: image transforms, then tensor conversion.
pub struct ImagePipeline {
    transforms: Compose,
    normalize: Normalize,
}

impl ImagePipeline {
    /// Training frames are augmented before cropping; validation frames
    /// only go through the deterministic steps.
    pub fn new(split: Split, config: &TransformConfig) -> Self {
        let mut transforms = Compose::default();
        if split == Split::Train && config.augmentation.max_augmenters > 0 {
            transforms.push(Augment::new(Augmenter::from_config(&config.augmentation)));
        }
        transforms.push(Crop::new(config.crop_box));
        transforms.push(Rescale::new(config.rescale));
        Self {
            transforms,
            normalize: Normalize::new(config.mean, config.std),
        }
    }

    /// Number of image transforms before tensor conversion.
    pub fn num_transforms(&self) -> usize {
        self.transforms.len()
    }

    /// Run a frame through the pipeline.
    pub fn run(&self, image: RgbImage) -> Array3<f32> {
        self.normalize.to_tensor(self.transforms.apply(image))
    }
}
