//! Shared types for the superseg segmentation pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can reference pixel buffers
/// without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an in-memory image buffer.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Dense per-pixel region labels produced by a segmentation run.
///
/// Labels are row-major, one per pixel, with contiguous ids starting at 0.
/// `region_count` is the number of distinct labels; every value in `labels`
/// is strictly below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    labels: Vec<u32>,
    dimensions: Dimensions,
    region_count: usize,
}

impl LabelMap {
    pub(crate) fn new(labels: Vec<u32>, dimensions: Dimensions, region_count: usize) -> Self {
        debug_assert_eq!(labels.len(), dimensions.pixel_count());
        Self {
            labels,
            dimensions,
            region_count,
        }
    }

    /// The label of the pixel at `(x, y)`.
    ///
    /// Coordinates outside the image are a contract violation, checked in
    /// debug builds; release builds fall back to label 0.
    #[must_use]
    pub fn label(&self, x: u32, y: u32) -> u32 {
        let idx = y as usize * self.dimensions.width as usize + x as usize;
        debug_assert!(idx < self.labels.len());
        self.labels.get(idx).copied().unwrap_or(0)
    }

    /// All labels in row-major order.
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Consumes the map and returns the underlying label vector.
    #[must_use]
    pub fn into_labels(self) -> Vec<u32> {
        self.labels
    }

    /// Dimensions of the labeled image.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of distinct regions.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.region_count
    }
}

/// Configuration for a segmentation run.
///
/// All parameters have defaults matching the reference parameterization.
/// Fields are public; [`validate`](Self::validate) is the fail-fast
/// construction-time check every pipeline entry point runs before touching
/// pixel data. Out-of-range values are contract violations, not recoverable
/// runtime states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Luminance difference below which two pixels count as "similar" for
    /// the ternary texture codes. Range `[0, 255]`.
    pub ltp_threshold: u8,

    /// Length the longest circular run of "similar" directions must reach
    /// for a pixel's pattern to count as homogeneous. Range `[0, 8]`.
    pub ltp_uniform_threshold: u8,

    /// Fraction of homogeneous pixels at which a region itself counts as
    /// homogeneous (untextured). Range `[0, 1]`.
    pub untextured_threshold: f64,

    /// Acceptance threshold for both merge rules: a candidate neighbor is
    /// merged only when its distance falls strictly below this. Range
    /// `[0, 1]`; 0 disables merging entirely.
    pub similarity_threshold: f64,

    /// Multiplier on the mean live-region size defining the reference size
    /// that gates merge eligibility. Must be positive.
    pub regularity: f64,

    /// Target initial region size as a fraction of the image area.
    /// Range `[0, 1]`.
    pub partition_size_factor: f64,

    /// Floor on the target initial region size in pixels. Must be positive.
    pub partition_min_size: f64,

    /// Spatial-versus-color weight handed to the initial compact partition.
    /// Must be positive.
    pub partition_compactness: f64,

    /// Whether to compute the texture descriptor and route non-homogeneous
    /// regions through the texture merge rule.
    pub use_texture: bool,
}

impl SegmentationConfig {
    /// Default luminance similarity threshold.
    pub const DEFAULT_LTP_THRESHOLD: u8 = 19;
    /// Default homogeneity run-length threshold.
    pub const DEFAULT_LTP_UNIFORM_THRESHOLD: u8 = 8;
    /// Default untextured-region fraction threshold.
    pub const DEFAULT_UNTEXTURED_THRESHOLD: f64 = 0.8;
    /// Default merge acceptance threshold.
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.05;
    /// Default regularity multiplier.
    pub const DEFAULT_REGULARITY: f64 = 4.0;
    /// Default initial-region size factor.
    pub const DEFAULT_PARTITION_SIZE_FACTOR: f64 = 0.000_15;
    /// Default initial-region size floor in pixels.
    pub const DEFAULT_PARTITION_MIN_SIZE: f64 = 60.0;
    /// Default compactness for the initial partition.
    pub const DEFAULT_PARTITION_COMPACTNESS: f64 = 10.0;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        if self.ltp_uniform_threshold > 8 {
            return Err(SegmentationError::InvalidConfig(format!(
                "ltp_uniform_threshold must be at most 8, got {}",
                self.ltp_uniform_threshold,
            )));
        }
        if !(0.0..=1.0).contains(&self.untextured_threshold) {
            return Err(SegmentationError::InvalidConfig(format!(
                "untextured_threshold must be within [0, 1], got {}",
                self.untextured_threshold,
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SegmentationError::InvalidConfig(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold,
            )));
        }
        if !(self.regularity > 0.0 && self.regularity.is_finite()) {
            return Err(SegmentationError::InvalidConfig(format!(
                "regularity must be positive, got {}",
                self.regularity,
            )));
        }
        if !(0.0..=1.0).contains(&self.partition_size_factor) {
            return Err(SegmentationError::InvalidConfig(format!(
                "partition_size_factor must be within [0, 1], got {}",
                self.partition_size_factor,
            )));
        }
        if !(self.partition_min_size > 0.0 && self.partition_min_size.is_finite()) {
            return Err(SegmentationError::InvalidConfig(format!(
                "partition_min_size must be positive, got {}",
                self.partition_min_size,
            )));
        }
        if !(self.partition_compactness > 0.0 && self.partition_compactness.is_finite()) {
            return Err(SegmentationError::InvalidConfig(format!(
                "partition_compactness must be positive, got {}",
                self.partition_compactness,
            )));
        }
        Ok(())
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            ltp_threshold: Self::DEFAULT_LTP_THRESHOLD,
            ltp_uniform_threshold: Self::DEFAULT_LTP_UNIFORM_THRESHOLD,
            untextured_threshold: Self::DEFAULT_UNTEXTURED_THRESHOLD,
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
            regularity: Self::DEFAULT_REGULARITY,
            partition_size_factor: Self::DEFAULT_PARTITION_SIZE_FACTOR,
            partition_min_size: Self::DEFAULT_PARTITION_MIN_SIZE,
            partition_compactness: Self::DEFAULT_PARTITION_COMPACTNESS,
            use_texture: true,
        }
    }
}

/// Result of a segmentation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// Final dense per-pixel labels.
    pub label_map: LabelMap,

    /// Dimensions of the source image in pixels.
    pub dimensions: Dimensions,
}

impl SegmentationResult {
    /// Number of superpixels in the final segmentation.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.label_map.region_count()
    }
}

/// Errors that can occur while segmenting.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The decoded image has zero pixels.
    #[error("image has zero pixels")]
    EmptyImage,

    /// A configuration field is outside its documented range.
    #[error("invalid segmentation configuration: {0}")]
    InvalidConfig(String),

    /// The initial partition does not cover the image exactly.
    #[error("partition carries {actual} labels for {expected} pixels")]
    PartitionMismatch {
        /// Pixel count of the image.
        expected: usize,
        /// Length of the supplied label array.
        actual: usize,
    },

    /// A partition label falls outside the declared region range.
    #[error("partition label {label} is outside the declared range of {region_count} regions")]
    LabelOutOfRange {
        /// The offending label value.
        label: u32,
        /// The declared number of initial regions.
        region_count: usize,
    },
}
