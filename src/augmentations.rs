//! # augmentations
//!
//! Randomized photometric augmentations for training frames.
//!
//! The pipeline is a tree of [`Augmenter`]s built from an explicit
//! [`AugmentationConfig`]. The default tree applies between zero and five
//! augmenters, picked without replacement and applied in random order.

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter;
use rand::{
    seq::{index, SliceRandom},
    Rng,
};
use rand_distr::{Bernoulli, Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DatasetError, Result},
    transforms::Transform,
};

/// Sampling ranges of the training augmentations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum number of augmenters applied to a frame. `0` disables augmentation.
    pub max_augmenters: usize,
    /// Gaussian blur sigma.
    pub blur_sigma: (f32, f32),
    /// Average blur kernel size.
    pub average_blur_kernel: (u32, u32),
    /// Median blur kernel size.
    pub median_blur_kernel: (u32, u32),
    /// Unsharp-mask sigma.
    pub sharpen_sigma: (f32, f32),
    /// Additive gaussian noise scale, in intensity units.
    pub noise_scale: (f64, f64),
    /// Per-pixel dropout probability.
    pub dropout: (f64, f64),
    /// Per-cell dropout probability of the coarse dropout.
    pub coarse_dropout: (f64, f64),
    /// Coarse dropout grid resolution, as a fraction of the image size.
    pub coarse_dropout_size: (f64, f64),
    /// Probability of sampling the coarse dropout mask per channel.
    pub coarse_per_channel: f64,
    /// Brightness offset, in intensity units.
    pub brightness: (i32, i32),
    /// Hue rotation, in degrees.
    pub hue: (i32, i32),
    /// Intensity multiplier.
    pub multiply: (f32, f32),
    /// Contrast normalization factor around mid-gray.
    pub contrast: (f32, f32),
    /// Probability of sampling noise, dropout, brightness, multiplier and
    /// contrast per channel instead of once for all channels.
    pub per_channel: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            max_augmenters: 5,
            blur_sigma: (0.0, 3.0),
            average_blur_kernel: (2, 7),
            median_blur_kernel: (3, 11),
            sharpen_sigma: (0.5, 2.0),
            noise_scale: (0.0, 0.05 * 255.0),
            dropout: (0.01, 0.1),
            coarse_dropout: (0.03, 0.15),
            coarse_dropout_size: (0.02, 0.05),
            coarse_per_channel: 0.2,
            brightness: (-10, 10),
            hue: (-20, 20),
            multiply: (0.5, 1.5),
            contrast: (0.5, 2.0),
            per_channel: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Configuration that leaves frames untouched.
    pub fn disabled() -> Self {
        Self {
            max_augmenters: 0,
            ..Self::default()
        }
    }

    /// Reject inverted ranges and invalid probabilities.
    pub fn validate(&self) -> Result<()> {
        let ordered = [
            ("blur_sigma", self.blur_sigma.0 as f64, self.blur_sigma.1 as f64),
            (
                "average_blur_kernel",
                self.average_blur_kernel.0 as f64,
                self.average_blur_kernel.1 as f64,
            ),
            (
                "median_blur_kernel",
                self.median_blur_kernel.0 as f64,
                self.median_blur_kernel.1 as f64,
            ),
            ("sharpen_sigma", self.sharpen_sigma.0 as f64, self.sharpen_sigma.1 as f64),
            ("noise_scale", self.noise_scale.0, self.noise_scale.1),
            ("dropout", self.dropout.0, self.dropout.1),
            ("coarse_dropout", self.coarse_dropout.0, self.coarse_dropout.1),
            ("coarse_dropout_size", self.coarse_dropout_size.0, self.coarse_dropout_size.1),
            ("brightness", self.brightness.0 as f64, self.brightness.1 as f64),
            ("hue", self.hue.0 as f64, self.hue.1 as f64),
            ("multiply", self.multiply.0 as f64, self.multiply.1 as f64),
            ("contrast", self.contrast.0 as f64, self.contrast.1 as f64),
        ];
        for (name, low, high) in ordered {
            if !(low.is_finite() && high.is_finite() && low <= high) {
                return Err(DatasetError::Config(format!(
                    "augmentation range `{name}` is invalid: ({low}, {high})"
                )));
            }
        }
        let probabilities = [
            ("dropout", self.dropout.0),
            ("dropout", self.dropout.1),
            ("coarse_dropout", self.coarse_dropout.0),
            ("coarse_dropout", self.coarse_dropout.1),
            ("coarse_per_channel", self.coarse_per_channel),
            ("per_channel", self.per_channel),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(DatasetError::Config(format!(
                    "augmentation probability `{name}` is outside [0, 1]: {p}"
                )));
            }
        }
        if self.blur_sigma.0 < 0.0 || self.noise_scale.0 < 0.0 || self.multiply.0 < 0.0 {
            return Err(DatasetError::Config(
                "blur, noise and multiply ranges must be non-negative".into(),
            ));
        }
        if self.average_blur_kernel.0 == 0 || self.median_blur_kernel.0 == 0 {
            return Err(DatasetError::Config("blur kernels must be positive".into()));
        }
        if !(self.coarse_dropout_size.0 > 0.0 && self.coarse_dropout_size.1 <= 1.0) {
            return Err(DatasetError::Config(format!(
                "coarse dropout size must lie in (0, 1]: {:?}",
                self.coarse_dropout_size
            )));
        }
        Ok(())
    }
}

/// A randomized image operation, or a combinator over other augmenters.
///
/// `per_channel` is the probability of sampling the operation's parameter
/// once per channel instead of once for the whole image.
#[derive(Clone, Debug, PartialEq)]
pub enum Augmenter {
    /// Gaussian blur with a uniformly sampled sigma.
    GaussianBlur {
        /// Sigma range.
        sigma: (f32, f32),
    },
    /// Mean over a square kernel.
    AverageBlur {
        /// Kernel size range.
        kernel: (u32, u32),
    },
    /// Median over a square kernel.
    MedianBlur {
        /// Kernel size range.
        kernel: (u32, u32),
    },
    /// Unsharp mask with a uniformly sampled sigma.
    Sharpen {
        /// Sigma range.
        sigma: (f32, f32),
    },
    /// Zero-mean gaussian noise.
    AdditiveGaussianNoise {
        /// Standard deviation range.
        scale: (f64, f64),
        /// Probability of independent noise per channel.
        per_channel: f64,
    },
    /// Set random pixels to black.
    Dropout {
        /// Per-pixel probability range.
        p: (f64, f64),
        /// Probability of an independent mask per channel.
        per_channel: f64,
    },
    /// Set random rectangular areas to black.
    CoarseDropout {
        /// Per-cell probability range.
        p: (f64, f64),
        /// Grid resolution range, relative to the image size.
        size_percent: (f64, f64),
        /// Probability of an independent mask per channel.
        per_channel: f64,
    },
    /// Add a constant offset.
    Add {
        /// Offset range.
        value: (i32, i32),
        /// Probability of one offset per channel.
        per_channel: f64,
    },
    /// Rotate the hue.
    AddToHue {
        /// Rotation range in degrees.
        degrees: (i32, i32),
    },
    /// Multiply intensities.
    Multiply {
        /// Factor range.
        factor: (f32, f32),
        /// Probability of one factor per channel.
        per_channel: f64,
    },
    /// Scale intensities around mid-gray.
    ContrastNormalization {
        /// Factor range.
        alpha: (f32, f32),
        /// Probability of one factor per channel.
        per_channel: f64,
    },
    /// Apply exactly one child, chosen uniformly.
    OneOf(Vec<Augmenter>),
    /// Apply between `min` and `max` distinct children in random order.
    SomeOf {
        /// Minimum number of children.
        min: usize,
        /// Maximum number of children.
        max: usize,
        /// Candidate children.
        children: Vec<Augmenter>,
    },
}

impl Augmenter {
    /// Build the training augmentation tree.
    pub fn from_config(config: &AugmentationConfig) -> Self {
        Augmenter::SomeOf {
            min: 0,
            max: config.max_augmenters,
            children: vec![
                Augmenter::OneOf(vec![
                    Augmenter::GaussianBlur {
                        sigma: config.blur_sigma,
                    },
                    Augmenter::AverageBlur {
                        kernel: config.average_blur_kernel,
                    },
                    Augmenter::MedianBlur {
                        kernel: config.median_blur_kernel,
                    },
                ]),
                Augmenter::Sharpen {
                    sigma: config.sharpen_sigma,
                },
                Augmenter::AdditiveGaussianNoise {
                    scale: config.noise_scale,
                    per_channel: config.per_channel,
                },
                Augmenter::OneOf(vec![
                    Augmenter::Dropout {
                        p: config.dropout,
                        per_channel: config.per_channel,
                    },
                    Augmenter::CoarseDropout {
                        p: config.coarse_dropout,
                        size_percent: config.coarse_dropout_size,
                        per_channel: config.coarse_per_channel,
                    },
                ]),
                Augmenter::Add {
                    value: config.brightness,
                    per_channel: config.per_channel,
                },
                Augmenter::AddToHue {
                    degrees: config.hue,
                },
                Augmenter::Multiply {
                    factor: config.multiply,
                    per_channel: config.per_channel,
                },
                Augmenter::ContrastNormalization {
                    alpha: config.contrast,
                    per_channel: config.per_channel,
                },
            ],
        }
    }

    /// Apply the augmenter with randomness drawn from `rng`.
    pub fn augment<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        match self {
            Augmenter::GaussianBlur { sigma } => {
                let sigma = sample_f32(*sigma, rng);
                if sigma < 0.01 {
                    image
                } else {
                    imageops::blur(&image, sigma)
                }
            }
            Augmenter::AverageBlur { kernel } => {
                let radius = Uniform::new_inclusive(kernel.0, kernel.1).sample(rng) / 2;
                if radius == 0 {
                    return image;
                }
                map_gray_channels(&image, |channel| filter::box_filter(channel, radius, radius))
            }
            Augmenter::MedianBlur { kernel } => {
                let radius = Uniform::new_inclusive(kernel.0, kernel.1).sample(rng) / 2;
                if radius == 0 {
                    image
                } else {
                    filter::median_filter(&image, radius, radius)
                }
            }
            Augmenter::Sharpen { sigma } => imageops::unsharpen(&image, sample_f32(*sigma, rng), 0),
            Augmenter::AdditiveGaussianNoise { scale, per_channel } => {
                let scale = Uniform::new_inclusive(scale.0, scale.1).sample(rng);
                let Ok(noise) = Normal::new(0.0, scale) else {
                    return image;
                };
                let independent = rng.gen_bool(per_channel.clamp(0.0, 1.0));
                let mut image = image;
                for pixel in image.pixels_mut() {
                    let shared = noise.sample(rng);
                    for channel in pixel.0.iter_mut() {
                        let offset = if independent { noise.sample(rng) } else { shared };
                        *channel = clamp_u8(*channel as f64 + offset);
                    }
                }
                image
            }
            Augmenter::Dropout { p, per_channel } => {
                let p = Uniform::new_inclusive(p.0, p.1).sample(rng);
                let Ok(dropout) = Bernoulli::new(p) else {
                    return image;
                };
                let independent = rng.gen_bool(per_channel.clamp(0.0, 1.0));
                let mut image = image;
                for pixel in image.pixels_mut() {
                    if independent {
                        for channel in pixel.0.iter_mut() {
                            if dropout.sample(rng) {
                                *channel = 0;
                            }
                        }
                    } else if dropout.sample(rng) {
                        *pixel = Rgb([0, 0, 0]);
                    }
                }
                image
            }
            Augmenter::CoarseDropout {
                p,
                size_percent,
                per_channel,
            } => {
                let p = Uniform::new_inclusive(p.0, p.1).sample(rng);
                let Ok(dropout) = Bernoulli::new(p) else {
                    return image;
                };
                let size = Uniform::new_inclusive(size_percent.0, size_percent.1).sample(rng);
                let (width, height) = image.dimensions();
                let grid_width = ((width as f64 * size).ceil() as u32).max(1);
                let grid_height = ((height as f64 * size).ceil() as u32).max(1);
                let num_cells = (grid_width * grid_height) as usize;
                let independent = rng.gen_bool(per_channel.clamp(0.0, 1.0));
                let masks: Vec<Vec<bool>> = if independent {
                    (0..3)
                        .map(|_| (0..num_cells).map(|_| dropout.sample(rng)).collect())
                        .collect()
                } else {
                    let mask: Vec<bool> = (0..num_cells).map(|_| dropout.sample(rng)).collect();
                    vec![mask; 3]
                };
                let mut image = image;
                for (x, y, pixel) in image.enumerate_pixels_mut() {
                    let cell_x = (x as u64 * grid_width as u64 / width as u64) as u32;
                    let cell_y = (y as u64 * grid_height as u64 / height as u64) as u32;
                    let cell = (cell_y * grid_width + cell_x) as usize;
                    for (channel, mask) in pixel.0.iter_mut().zip(&masks) {
                        if mask[cell] {
                            *channel = 0;
                        }
                    }
                }
                image
            }
            Augmenter::Add { value, per_channel } => {
                let range = Uniform::new_inclusive(value.0, value.1);
                let offsets = sample_channels(*per_channel, rng, |rng| range.sample(rng) as f64);
                map_channels(image, |c, v| v as f64 + offsets[c])
            }
            Augmenter::AddToHue { degrees } => {
                let degrees = Uniform::new_inclusive(degrees.0, degrees.1).sample(rng);
                imageops::huerotate(&image, degrees)
            }
            Augmenter::Multiply {
                factor,
                per_channel,
            } => {
                let factors =
                    sample_channels(*per_channel, rng, |rng| sample_f32(*factor, rng) as f64);
                map_channels(image, |c, v| v as f64 * factors[c])
            }
            Augmenter::ContrastNormalization { alpha, per_channel } => {
                let alphas =
                    sample_channels(*per_channel, rng, |rng| sample_f32(*alpha, rng) as f64);
                map_channels(image, |c, v| 128.0 + alphas[c] * (v as f64 - 128.0))
            }
            Augmenter::OneOf(children) => match children.choose(rng) {
                Some(child) => child.augment(image, rng),
                None => image,
            },
            Augmenter::SomeOf { min, max, children } => {
                let max = (*max).min(children.len());
                let min = (*min).min(max);
                let amount = rng.gen_range(min..=max);
                let mut picked = index::sample(rng, children.len(), amount).into_vec();
                picked.shuffle(rng);
                picked
                    .into_iter()
                    .fold(image, |image, i| children[i].augment(image, &mut *rng))
            }
        }
    }
}

/// [`Transform`] adapter applying an [`Augmenter`] with a thread-local RNG.
#[derive(Clone, Debug)]
pub struct Augment {
    augmenter: Augmenter,
}

impl Augment {
    /// Wrap an augmenter.
    pub fn new(augmenter: Augmenter) -> Self {
        Self { augmenter }
    }
}

impl Transform for Augment {
    fn apply(&self, image: RgbImage) -> RgbImage {
        self.augmenter.augment(image, &mut rand::thread_rng())
    }
}

fn sample_f32<R: Rng + ?Sized>(range: (f32, f32), rng: &mut R) -> f32 {
    Uniform::new_inclusive(range.0, range.1).sample(rng)
}

/// One value per channel with probability `per_channel`, otherwise one
/// value shared by all channels.
fn sample_channels<R, F>(per_channel: f64, rng: &mut R, mut sample: F) -> [f64; 3]
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> f64,
{
    if rng.gen_bool(per_channel.clamp(0.0, 1.0)) {
        [sample(&mut *rng), sample(&mut *rng), sample(&mut *rng)]
    } else {
        [sample(&mut *rng); 3]
    }
}

fn clamp_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn map_channels<F: FnMut(usize, u8) -> f64>(mut image: RgbImage, mut f: F) -> RgbImage {
    for pixel in image.pixels_mut() {
        for (c, channel) in pixel.0.iter_mut().enumerate() {
            *channel = clamp_u8(f(c, *channel));
        }
    }
    image
}

/// Run a single-channel filter on each channel of `image`.
fn map_gray_channels<F: Fn(&GrayImage) -> GrayImage>(image: &RgbImage, f: F) -> RgbImage {
    let (width, height) = image.dimensions();
    let channels: Vec<GrayImage> = (0..3)
        .map(|c| f(&GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[c]]))))
        .collect();
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            channels[0].get_pixel(x, y)[0],
            channels[1].get_pixel(x, y)[0],
            channels[2].get_pixel(x, y)[0],
        ])
    })
}
