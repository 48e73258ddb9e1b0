//! Iterative two-criterion region merging.
//!
//! The engine repeatedly scans all live regions. A homogeneous region looks
//! for the neighbor with the smallest normalized mean-color distance; a
//! textured region looks for the neighbor with the smallest combined
//! chi-square histogram distance plus color distance. In both rules a
//! neighbor is only eligible while it matches the scanned region's
//! homogeneity class and the combined pixel count stays below the reference
//! size, and a merge only happens when the winning distance falls strictly
//! below the similarity threshold.
//!
//! Passes iterate over a snapshot of the ids present at pass start, never a
//! live iterator: a merge removes its absorbed region from the graph, and
//! ids removed earlier in the same pass are simply skipped. Passes repeat
//! until a pass merges nothing, [`MAX_MERGE_PASSES`] passes have run, or the
//! region count drops below [`MIN_ACTIVE_REGIONS`].

use serde::{Deserialize, Serialize};

use crate::region::{Region, RegionGraph};
use crate::types::{LabelMap, SegmentationConfig};

/// Hard cap on merge passes; segmentation always terminates within this
/// many.
pub const MAX_MERGE_PASSES: usize = 10;

/// Region count below which no further pass is started.
pub const MIN_ACTIVE_REGIONS: usize = 500;

/// Counters describing one [`MergeEngine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Merge passes executed (at least 1, at most [`MAX_MERGE_PASSES`]).
    pub passes: usize,
    /// Total merges across all passes.
    pub merges: usize,
    /// Region count before the first pass.
    pub initial_regions: usize,
    /// Region count after the last pass.
    pub final_regions: usize,
}

/// Owns one region graph for the duration of one merging run.
#[derive(Debug)]
pub struct MergeEngine {
    graph: RegionGraph,
    similarity_threshold: f64,
    untextured_threshold: f64,
    regularity: f64,
    use_texture: bool,
    reference_size: f64,
}

impl MergeEngine {
    /// Take ownership of a freshly built graph and compute the initial
    /// reference size.
    #[must_use]
    pub fn new(graph: RegionGraph, config: &SegmentationConfig) -> Self {
        let mut engine = Self {
            graph,
            similarity_threshold: config.similarity_threshold,
            untextured_threshold: config.untextured_threshold,
            regularity: config.regularity,
            use_texture: config.use_texture,
            reference_size: 0.0,
        };
        engine.update_reference_size();
        engine
    }

    /// The current graph state.
    #[must_use]
    pub const fn graph(&self) -> &RegionGraph {
        &self.graph
    }

    /// Run merge passes until convergence.
    ///
    /// At least one pass always executes; the loop continues only while the
    /// previous pass changed the region count, fewer than
    /// [`MAX_MERGE_PASSES`] passes have run, and at least
    /// [`MIN_ACTIVE_REGIONS`] regions remain.
    pub fn run(&mut self) -> MergeOutcome {
        let initial_regions = self.graph.len();
        let mut passes = 0;
        let mut merges = 0;

        loop {
            let before = self.graph.len();
            merges += self.merge_pass();
            passes += 1;
            let after = self.graph.len();
            if after == before || passes >= MAX_MERGE_PASSES || after < MIN_ACTIVE_REGIONS {
                break;
            }
        }

        MergeOutcome {
            passes,
            merges,
            initial_regions,
            final_regions: self.graph.len(),
        }
    }

    /// Assign each live region a dense final id in ascending original-id
    /// order and write it to every member pixel.
    #[must_use]
    pub fn into_label_map(self) -> LabelMap {
        let dimensions = self.graph.dimensions();
        let width = dimensions.width as usize;
        let mut labels = vec![0u32; dimensions.pixel_count()];
        let mut next = 0u32;
        for region in self.graph.iter() {
            for &(x, y) in &region.pixels {
                labels[y as usize * width + x as usize] = next;
            }
            next += 1;
        }
        LabelMap::new(labels, dimensions, next as usize)
    }

    /// One pass over a snapshot of the ids present at pass start. Returns
    /// the number of merges performed. Recomputes the reference size at the
    /// end of the pass.
    fn merge_pass(&mut self) -> usize {
        let snapshot = self.graph.ids();
        let mut merges = 0;

        for id in snapshot {
            let Some(region) = self.graph.get(id) else {
                // Absorbed earlier in this same pass.
                continue;
            };
            let candidate = if region.homogeneous {
                self.color_candidate(region)
            } else {
                self.texture_candidate(region)
            };
            if let Some(absorbed) = candidate {
                self.merge(id, absorbed);
                merges += 1;
            }
        }

        self.update_reference_size();
        merges
    }

    /// Color rule: among homogeneous neighbors passing the size gate, find
    /// the global minimum normalized mean-color distance. Ties keep the
    /// first (lowest-id) neighbor. Returns the winner only when its
    /// distance beats the similarity threshold.
    fn color_candidate(&self, region: &Region) -> Option<u32> {
        let mean = region.mean_rgb();
        let mut best: Option<(u32, f64)> = None;

        for &id in &region.neighbors {
            let Some(neighbor) = self.graph.get(id) else {
                continue;
            };
            if !neighbor.homogeneous || !self.within_size_gate(region, neighbor) {
                continue;
            }
            let dc = color_distance(&mean, &neighbor.mean_rgb());
            if best.is_none_or(|(_, d)| dc < d) {
                best = Some((id, dc));
            }
        }

        match best {
            Some((id, d)) if d < self.similarity_threshold => Some(id),
            _ => None,
        }
    }

    /// Texture rule: among non-homogeneous neighbors passing the size gate,
    /// find the minimum of chi-square histogram distance plus normalized
    /// color distance, and accept it below the similarity threshold.
    fn texture_candidate(&self, region: &Region) -> Option<u32> {
        let mean = region.mean_rgb();
        let mut best: Option<(u32, f64)> = None;

        for &id in &region.neighbors {
            let Some(neighbor) = self.graph.get(id) else {
                continue;
            };
            if neighbor.homogeneous || !self.within_size_gate(region, neighbor) {
                continue;
            }
            let dt = texture_distance(region, neighbor) + color_distance(&mean, &neighbor.mean_rgb());
            if best.is_none_or(|(_, d)| dt < d) {
                best = Some((id, dt));
            }
        }

        match best {
            Some((id, d)) if d < self.similarity_threshold => Some(id),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn within_size_gate(&self, a: &Region, b: &Region) -> bool {
        ((a.pixel_count + b.pixel_count) as f64) < self.reference_size
    }

    /// Fold `absorbed` into `survivor`: statistics, coordinates, histograms,
    /// homogeneity, then adjacency. Every neighbor of the absorbed region is
    /// re-pointed at the survivor, preserving the symmetry invariant, and
    /// the absorbed region is deleted from the graph.
    fn merge(&mut self, survivor: u32, absorbed: u32) {
        if survivor == absorbed {
            return;
        }
        let Some(other) = self.graph.remove(absorbed) else {
            return;
        };

        if let Some(region) = self.graph.get_mut(survivor) {
            region.color_sum[0] += other.color_sum[0];
            region.color_sum[1] += other.color_sum[1];
            region.color_sum[2] += other.color_sum[2];
            region.pixel_count += other.pixel_count;
            region.pixels.extend_from_slice(&other.pixels);

            if self.use_texture {
                for (dst, src) in region.hist_neg.iter_mut().zip(&other.hist_neg) {
                    *dst += *src;
                }
                for (dst, src) in region.hist_pos.iter_mut().zip(&other.hist_pos) {
                    *dst += *src;
                }
                region.homogeneous_pixels += other.homogeneous_pixels;
                // Combined size is the denominator: the flag describes the
                // merged region, not the absorbed one.
                region.homogeneous = region.homogeneous_fraction() >= self.untextured_threshold;
            }

            debug_assert_eq!(region.pixels.len(), region.pixel_count);
            region.neighbors.remove(&absorbed);
        }

        let mut gained = Vec::with_capacity(other.neighbors.len());
        for &id in &other.neighbors {
            if id == survivor {
                continue;
            }
            let Some(neighbor) = self.graph.get_mut(id) else {
                continue;
            };
            neighbor.neighbors.remove(&absorbed);
            neighbor.neighbors.insert(survivor);
            gained.push(id);
        }
        if let Some(region) = self.graph.get_mut(survivor) {
            region.neighbors.extend(gained);
        }
    }

    /// Reference size = mean live-region pixel count times the regularity
    /// multiplier. An empty graph short-circuits to 0 instead of dividing
    /// by zero.
    #[allow(clippy::cast_precision_loss)]
    fn update_reference_size(&mut self) {
        let count = self.graph.len();
        if count == 0 {
            self.reference_size = 0.0;
            return;
        }
        let mean = self.graph.total_pixels() as f64 / count as f64;
        self.reference_size = mean * self.regularity;
    }
}

/// Euclidean distance between two mean RGB colors, normalized by the
/// maximal distance `sqrt(3 * 255^2)` into `[0, 1]`.
fn color_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt() / (3.0_f64 * 255.0 * 255.0).sqrt()
}

/// Chi-square distance between two regions' texture histograms.
///
/// Bins are normalized by each region's own pixel count; a bin contributes
/// `(h1 - h2)^2 / (h1 + h2)` whenever either normalized value is nonzero,
/// and the sum is averaged over the contributing bins (0 when none
/// contribute).
#[allow(clippy::cast_precision_loss)]
fn texture_distance(a: &Region, b: &Region) -> f64 {
    if a.pixel_count == 0 || b.pixel_count == 0 {
        return 0.0;
    }
    let an = a.pixel_count as f64;
    let bn = b.pixel_count as f64;
    let mut sum = 0.0;
    let mut active = 0u32;

    let bins = a
        .hist_neg
        .iter()
        .zip(&b.hist_neg)
        .chain(a.hist_pos.iter().zip(&b.hist_pos));
    for (&ha, &hb) in bins {
        let h1 = f64::from(ha) / an;
        let h2 = f64::from(hb) / bn;
        if h1 > 0.0 || h2 > 0.0 {
            let d = h1 - h2;
            sum += d * d / (h1 + h2);
            active += 1;
        }
    }

    if active == 0 {
        0.0
    } else {
        sum / f64::from(active)
    }
}
