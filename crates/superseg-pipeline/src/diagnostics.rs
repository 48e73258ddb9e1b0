//! Segmentation diagnostics: timing, counts, and other metrics per stage.
//!
//! Permanent instrumentation for parameter tuning: every stage of the
//! pipeline reports its wall-clock duration and the counts that explain its
//! output. Timestamps come from a caller-supplied [`Clock`] so the pure
//! pipeline crate stays free of platform time sources.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::merge::{MergeEngine, MergeOutcome};
use crate::partition::compact_partition;
use crate::region::RegionGraph;
use crate::texture::compute_texture;
use crate::types::{
    Dimensions, RgbImage, SegmentationConfig, SegmentationError, SegmentationResult,
};

/// Injected time source for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Initial compact partition metrics.
    Partition {
        /// Target region size handed to the partitioner, in pixels.
        target_size: f64,
        /// Number of initial regions produced.
        region_count: usize,
    },
    /// Texture descriptor metrics.
    Texture {
        /// Pixels whose pattern came out homogeneous.
        homogeneous_pixels: usize,
        /// Total pixels examined.
        pixel_count: usize,
    },
    /// Region graph construction metrics.
    GraphBuild {
        /// Live regions after aggregation.
        region_count: usize,
        /// Undirected adjacency edges.
        adjacency_edges: usize,
        /// Regions whose homogeneous flag is set.
        homogeneous_regions: usize,
    },
    /// Merge engine metrics.
    Merge {
        /// Pass and merge counters from the run.
        outcome: MergeOutcome,
    },
    /// Final relabeling metrics.
    Relabel {
        /// Number of superpixels in the output.
        region_count: usize,
    },
}

/// High-level summary of a segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: usize,
    /// Regions before merging.
    pub initial_regions: usize,
    /// Superpixels after merging.
    pub final_regions: usize,
    /// Merge passes executed.
    pub passes: usize,
}

/// Diagnostics collected from a single segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationDiagnostics {
    /// Stage 1: initial compact partition.
    pub partition: StageDiagnostics,
    /// Stage 2: texture descriptor (`None` when texture is disabled).
    pub texture: Option<StageDiagnostics>,
    /// Stage 3: region graph aggregation.
    pub graph: StageDiagnostics,
    /// Stage 4: iterative merging.
    pub merge: StageDiagnostics,
    /// Stage 5: dense relabeling.
    pub relabel: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: SegmentationSummary,
}

impl SegmentationDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Segmentation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);

        let stages: Vec<(&str, &StageDiagnostics)> = {
            let mut s = vec![("Partition", &self.partition)];
            if let Some(ref texture) = self.texture {
                s.push(("Texture", texture));
            }
            s.push(("Graph Build", &self.graph));
            s.push(("Merge", &self.merge));
            s.push(("Relabel", &self.relabel));
            s
        };

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {} -> {} in {} passes",
            self.summary.initial_regions, self.summary.final_regions, self.summary.passes,
        ));

        lines.join("\n")
    }
}

/// Run the full pipeline collecting per-stage diagnostics.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidConfig`] for out-of-range
/// configuration fields and [`SegmentationError::EmptyImage`] for a
/// zero-pixel image.
pub fn segment_with_diagnostics<C: Clock>(
    image: &RgbImage,
    config: &SegmentationConfig,
    clock: &C,
) -> Result<(SegmentationResult, SegmentationDiagnostics), SegmentationError> {
    config.validate()?;
    let dimensions = Dimensions::of(image);
    if dimensions.pixel_count() == 0 {
        return Err(SegmentationError::EmptyImage);
    }

    let run_start = clock.now();

    // Stage 1: initial compact partition.
    let start = clock.now();
    let target_size = crate::initial_target_size(dimensions, config);
    let partition = compact_partition(image, target_size, config.partition_compactness);
    let partition_stage = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Partition {
            target_size,
            region_count: partition.region_count(),
        },
    };

    // Stage 2: texture descriptor.
    let mut texture_stage = None;
    let records = if config.use_texture {
        let start = clock.now();
        let records = compute_texture(image, config.ltp_threshold, config.ltp_uniform_threshold);
        texture_stage = Some(StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Texture {
                homogeneous_pixels: records.iter().filter(|r| r.homogeneous).count(),
                pixel_count: records.len(),
            },
        });
        Some(records)
    } else {
        None
    };

    // Stage 3: region graph aggregation.
    let start = clock.now();
    let graph = RegionGraph::build(
        image,
        &partition,
        records.as_deref(),
        config.untextured_threshold,
    );
    let graph_stage = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::GraphBuild {
            region_count: graph.len(),
            adjacency_edges: graph.iter().map(|r| r.neighbors.len()).sum::<usize>() / 2,
            homogeneous_regions: graph.iter().filter(|r| r.homogeneous).count(),
        },
    };

    // Stage 4: iterative merging.
    let start = clock.now();
    let mut engine = MergeEngine::new(graph, config);
    let outcome = engine.run();
    let merge_stage = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Merge { outcome },
    };

    // Stage 5: dense relabeling.
    let start = clock.now();
    let label_map = engine.into_label_map();
    let relabel_stage = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Relabel {
            region_count: label_map.region_count(),
        },
    };

    let diagnostics = SegmentationDiagnostics {
        partition: partition_stage,
        texture: texture_stage,
        graph: graph_stage,
        merge: merge_stage,
        relabel: relabel_stage,
        total_duration: clock.elapsed(&run_start),
        summary: SegmentationSummary {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            initial_regions: outcome.initial_regions,
            final_regions: outcome.final_regions,
            passes: outcome.passes,
        },
    };

    let result = SegmentationResult {
        label_map,
        dimensions,
    };
    Ok((result, diagnostics))
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Partition {
            target_size,
            region_count,
        } => {
            format!("target={target_size:.1}px regions={region_count}")
        }
        StageMetrics::Texture {
            homogeneous_pixels,
            pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let share = if *pixel_count > 0 {
                *homogeneous_pixels as f64 / *pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("homogeneous={homogeneous_pixels} ({share:.1}%)")
        }
        StageMetrics::GraphBuild {
            region_count,
            adjacency_edges,
            homogeneous_regions,
        } => {
            format!(
                "regions={region_count} edges={adjacency_edges} homogeneous={homogeneous_regions}",
            )
        }
        StageMetrics::Merge { outcome } => {
            format!(
                "{} -> {} regions, {} merges in {} passes",
                outcome.initial_regions, outcome.final_regions, outcome.merges, outcome.passes,
            )
        }
        StageMetrics::Relabel { region_count } => format!("regions={region_count}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::Cell;

    /// Deterministic clock ticking one millisecond per `now()`.
    struct TickClock {
        ticks: Cell<u64>,
    }

    impl TickClock {
        fn new() -> Self {
            Self {
                ticks: Cell::new(0),
            }
        }
    }

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get() + 1;
            self.ticks.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.ticks.get().saturating_sub(*since))
        }
    }

    #[test]
    fn collects_metrics_for_every_stage() {
        let image = RgbImage::from_pixel(16, 16, Rgb([120, 130, 140]));
        let config = SegmentationConfig {
            partition_min_size: 16.0,
            ..SegmentationConfig::default()
        };
        let (result, diagnostics) =
            segment_with_diagnostics(&image, &config, &TickClock::new()).unwrap();

        assert_eq!(diagnostics.summary.pixel_count, 256);
        assert!(diagnostics.texture.is_some());
        assert_eq!(
            diagnostics.summary.final_regions,
            result.label_map.region_count(),
        );
        let StageMetrics::Merge { outcome } = diagnostics.merge.metrics else {
            unreachable!("merge stage carries merge metrics")
        };
        assert!(outcome.passes >= 1);
        assert_eq!(outcome.final_regions, result.region_count());
    }

    #[test]
    fn texture_stage_is_absent_when_disabled() {
        let image = RgbImage::from_pixel(8, 8, Rgb([50, 50, 50]));
        let config = SegmentationConfig {
            use_texture: false,
            partition_min_size: 16.0,
            ..SegmentationConfig::default()
        };
        let (_, diagnostics) =
            segment_with_diagnostics(&image, &config, &TickClock::new()).unwrap();
        assert!(diagnostics.texture.is_none());
    }

    #[test]
    fn empty_image_is_rejected() {
        let image = RgbImage::new(0, 0);
        let result =
            segment_with_diagnostics(&image, &SegmentationConfig::default(), &TickClock::new());
        assert!(matches!(result, Err(SegmentationError::EmptyImage)));
    }

    #[test]
    fn report_mentions_every_stage() {
        let image = RgbImage::from_pixel(12, 12, Rgb([200, 100, 50]));
        let config = SegmentationConfig {
            partition_min_size: 16.0,
            ..SegmentationConfig::default()
        };
        let (_, diagnostics) =
            segment_with_diagnostics(&image, &config, &TickClock::new()).unwrap();
        let report = diagnostics.report();
        assert!(report.contains("Segmentation Diagnostics Report"));
        assert!(report.contains("Partition"));
        assert!(report.contains("Texture"));
        assert!(report.contains("Graph Build"));
        assert!(report.contains("Merge"));
        assert!(report.contains("Relabel"));
    }

    #[test]
    fn diagnostics_serde_round_trip() {
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let config = SegmentationConfig {
            partition_min_size: 16.0,
            ..SegmentationConfig::default()
        };
        let (_, diagnostics) =
            segment_with_diagnostics(&image, &config, &TickClock::new()).unwrap();
        let json = serde_json::to_string(&diagnostics).unwrap();
        let deserialized: SegmentationDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(
            deserialized.summary.final_regions,
            diagnostics.summary.final_regions,
        );
    }
}
