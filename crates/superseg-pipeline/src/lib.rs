//! superseg-pipeline: Pure superpixel segmentation engine (sans-IO).
//!
//! Over-segments a color image into perceptually coherent regions by
//! aggregating a dense initial partition into a region adjacency graph and
//! iteratively merging adjacent regions whose color and/or texture are
//! statistically similar:
//! compact partition -> texture descriptor -> region graph -> merging ->
//! dense relabeling.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory pixel
//! buffers (or raw encoded bytes at the outermost entry point) and returns
//! structured data. Filesystem interaction lives in the `superseg` driver
//! binary.

pub mod boundary;
pub mod diagnostics;
pub mod merge;
pub mod partition;
pub mod region;
pub mod texture;
pub mod types;

pub use merge::{MAX_MERGE_PASSES, MIN_ACTIVE_REGIONS, MergeEngine, MergeOutcome};
pub use partition::{Partition, compact_partition};
pub use region::{Region, RegionGraph};
pub use texture::{TextureRecord, compute_texture};
pub use types::{
    Dimensions, LabelMap, RgbImage, SegmentationConfig, SegmentationError, SegmentationResult,
};

/// Run the full segmentation pipeline on raw encoded image bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration, then
/// produces a [`SegmentationResult`] holding the dense per-pixel label map
/// and the source dimensions.
///
/// # Errors
///
/// Returns [`SegmentationError::EmptyInput`] if `image_bytes` is empty,
/// [`SegmentationError::ImageDecode`] if the format is unrecognized, and
/// every error [`segment`] can produce.
pub fn process(
    image_bytes: &[u8],
    config: &SegmentationConfig,
) -> Result<SegmentationResult, SegmentationError> {
    if image_bytes.is_empty() {
        return Err(SegmentationError::EmptyInput);
    }
    let image = image::load_from_memory(image_bytes)?.to_rgb8();
    segment(&image, config)
}

/// Segment a decoded image, computing the initial partition internally.
///
/// # Pipeline steps
///
/// 1. Validate the configuration (fail fast)
/// 2. Compute the initial compact partition
/// 3. Compute per-pixel texture records (when enabled)
/// 4. Aggregate the region adjacency graph
/// 5. Merge regions to convergence
/// 6. Relabel pixels with dense final ids
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidConfig`] for out-of-range
/// configuration fields and [`SegmentationError::EmptyImage`] for a
/// zero-pixel image.
pub fn segment(
    image: &RgbImage,
    config: &SegmentationConfig,
) -> Result<SegmentationResult, SegmentationError> {
    config.validate()?;
    let dimensions = Dimensions::of(image);
    if dimensions.pixel_count() == 0 {
        return Err(SegmentationError::EmptyImage);
    }

    let target_size = initial_target_size(dimensions, config);
    let partition = compact_partition(image, target_size, config.partition_compactness);
    Ok(segment_prepared(image, &partition, config, dimensions))
}

/// Segment a decoded image against a caller-supplied initial partition.
///
/// The partition must cover the image exactly; it may come from any
/// oversegmentation source, not just [`compact_partition`].
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidConfig`] for out-of-range
/// configuration fields, [`SegmentationError::EmptyImage`] for a zero-pixel
/// image, and [`SegmentationError::PartitionMismatch`] when the partition
/// dimensions disagree with the image.
pub fn segment_with_partition(
    image: &RgbImage,
    partition: &Partition,
    config: &SegmentationConfig,
) -> Result<SegmentationResult, SegmentationError> {
    config.validate()?;
    let dimensions = Dimensions::of(image);
    if dimensions.pixel_count() == 0 {
        return Err(SegmentationError::EmptyImage);
    }
    if partition.dimensions() != dimensions {
        return Err(SegmentationError::PartitionMismatch {
            expected: dimensions.pixel_count(),
            actual: partition.dimensions().pixel_count(),
        });
    }
    Ok(segment_prepared(image, partition, config, dimensions))
}

/// Shared tail of the pipeline: texture, graph, merging, relabeling.
fn segment_prepared(
    image: &RgbImage,
    partition: &Partition,
    config: &SegmentationConfig,
    dimensions: Dimensions,
) -> SegmentationResult {
    let records = config
        .use_texture
        .then(|| compute_texture(image, config.ltp_threshold, config.ltp_uniform_threshold));

    let graph = RegionGraph::build(
        image,
        partition,
        records.as_deref(),
        config.untextured_threshold,
    );

    let mut engine = MergeEngine::new(graph, config);
    engine.run();
    let label_map = engine.into_label_map();

    SegmentationResult {
        label_map,
        dimensions,
    }
}

/// Target pixel size for the initial partition:
/// `max(area * partition_size_factor, partition_min_size)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn initial_target_size(dimensions: Dimensions, config: &SegmentationConfig) -> f64 {
    (dimensions.pixel_count() as f64 * config.partition_size_factor)
        .max(config.partition_min_size)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Encode an RGB image as PNG bytes.
    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &SegmentationConfig::default());
        assert!(matches!(result, Err(SegmentationError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00, 0x13], &SegmentationConfig::default());
        assert!(matches!(result, Err(SegmentationError::ImageDecode(_))));
    }

    #[test]
    fn process_decodes_and_segments() {
        let image = RgbImage::from_pixel(16, 16, Rgb([90, 140, 190]));
        let png = encode_png(&image);
        let result = process(&png, &SegmentationConfig::default()).unwrap();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 16,
                height: 16,
            },
        );
        assert_eq!(result.label_map.labels().len(), 256);
        assert!(result.region_count() >= 1);
    }

    #[test]
    fn segment_rejects_invalid_config() {
        let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let config = SegmentationConfig {
            similarity_threshold: 2.0,
            ..SegmentationConfig::default()
        };
        assert!(matches!(
            segment(&image, &config),
            Err(SegmentationError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn segment_rejects_empty_image() {
        let image = RgbImage::new(0, 0);
        let result = segment(&image, &SegmentationConfig::default());
        assert!(matches!(result, Err(SegmentationError::EmptyImage)));
    }

    #[test]
    fn segment_with_partition_rejects_mismatched_dimensions() {
        let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let partition = Partition::new(
            vec![0, 0, 0, 0],
            1,
            Dimensions {
                width: 2,
                height: 2,
            },
        )
        .unwrap();
        let result = segment_with_partition(&image, &partition, &SegmentationConfig::default());
        assert!(matches!(
            result,
            Err(SegmentationError::PartitionMismatch { .. }),
        ));
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn gradient_image_segments_deterministically() {
        let image = RgbImage::from_fn(24, 24, |x, y| Rgb([(x * 7) as u8, (y * 9) as u8, 60]));
        let config = SegmentationConfig {
            partition_min_size: 30.0,
            ..SegmentationConfig::default()
        };
        let a = segment(&image, &config).unwrap();
        let b = segment(&image, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn two_halves_with_quadrant_partition_merge_along_the_color_boundary() {
        // Left half red, right half blue, one initial region per 2x2
        // quadrant. A permissive threshold merges same-color quadrants and
        // nothing across the boundary.
        let image = RgbImage::from_fn(4, 4, |x, _y| {
            if x < 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let labels = (0u32..16)
            .map(|i| {
                let x = i % 4;
                let y = i / 4;
                (y / 2) * 2 + x / 2
            })
            .collect();
        let partition = Partition::new(
            labels,
            4,
            Dimensions {
                width: 4,
                height: 4,
            },
        )
        .unwrap();
        let config = SegmentationConfig {
            similarity_threshold: 0.5,
            use_texture: false,
            ..SegmentationConfig::default()
        };
        let result = segment_with_partition(&image, &partition, &config).unwrap();

        assert_eq!(result.region_count(), 2);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(result.label_map.label(x, y), u32::from(x >= 2));
            }
        }

        // The boundary render marks exactly the two middle columns.
        let rendered = boundary::draw_boundaries(&image, &result.label_map);
        for y in 0..4 {
            assert_eq!(*rendered.get_pixel(0, y), Rgb([255, 0, 0]));
            assert_eq!(*rendered.get_pixel(1, y), Rgb([255, 255, 255]));
            assert_eq!(*rendered.get_pixel(2, y), Rgb([255, 255, 255]));
            assert_eq!(*rendered.get_pixel(3, y), Rgb([0, 0, 255]));
        }
    }

    #[test]
    fn solid_image_collapses_to_one_region_and_unchanged_render() {
        let image = RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]));
        let labels = (0u32..64)
            .map(|i| {
                let x = i % 8;
                let y = i / 8;
                (y / 4) * 2 + x / 4
            })
            .collect();
        let partition = Partition::new(
            labels,
            4,
            Dimensions {
                width: 8,
                height: 8,
            },
        )
        .unwrap();
        let config = SegmentationConfig {
            similarity_threshold: 0.1,
            regularity: 8.0,
            use_texture: false,
            ..SegmentationConfig::default()
        };
        let result = segment_with_partition(&image, &partition, &config).unwrap();

        assert_eq!(result.region_count(), 1);
        let rendered = boundary::draw_boundaries(&image, &result.label_map);
        assert_eq!(rendered, image);
    }

    #[test]
    fn zero_similarity_threshold_preserves_the_initial_partition_count() {
        let image = RgbImage::from_pixel(6, 6, Rgb([10, 200, 30]));
        let labels = (0u32..36).map(|i| i % 6).collect();
        let partition = Partition::new(
            labels,
            6,
            Dimensions {
                width: 6,
                height: 6,
            },
        )
        .unwrap();
        let config = SegmentationConfig {
            similarity_threshold: 0.0,
            use_texture: false,
            ..SegmentationConfig::default()
        };
        let result = segment_with_partition(&image, &partition, &config).unwrap();
        assert_eq!(result.region_count(), 6);
    }
}
