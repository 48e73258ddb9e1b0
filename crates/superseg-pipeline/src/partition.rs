//! Initial compact partition.
//!
//! Produces the dense label array the region graph is aggregated from: a
//! SLIC-style clustering in combined CIELAB-and-position space, seeded on a
//! regular grid and refined by a fixed number of windowed assignment/update
//! iterations, followed by a connectivity pass that folds stray fragments
//! into an adjacent cluster and compacts the labels.
//!
//! The merging engine treats this module as a collaborator behind the
//! [`Partition`] type: any label array that covers the image with in-range
//! labels is accepted, whether it came from [`compact_partition`] or from
//! the caller.
//!
//! Everything here is deterministic; ties are broken by scan order and no
//! randomness is involved.

use image::RgbImage;

use crate::types::{Dimensions, SegmentationError};

/// Assignment/update iterations of the clustering loop.
const ITERATIONS: usize = 10;

/// Fragments smaller than this fraction of the target size are folded into
/// an adjacent cluster by the connectivity pass.
const MIN_FRAGMENT_FRACTION: f64 = 0.25;

/// A dense initial labeling of an image.
///
/// Labels are row-major, one per pixel, each strictly below `region_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    labels: Vec<u32>,
    region_count: usize,
    dimensions: Dimensions,
}

impl Partition {
    /// Wrap a caller-supplied label array after checking it covers the
    /// image exactly and every label is within the declared range.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::PartitionMismatch`] when the array
    /// length differs from the pixel count, and
    /// [`SegmentationError::LabelOutOfRange`] for any label at or above
    /// `region_count`.
    pub fn new(
        labels: Vec<u32>,
        region_count: usize,
        dimensions: Dimensions,
    ) -> Result<Self, SegmentationError> {
        if labels.len() != dimensions.pixel_count() {
            return Err(SegmentationError::PartitionMismatch {
                expected: dimensions.pixel_count(),
                actual: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l as usize >= region_count) {
            return Err(SegmentationError::LabelOutOfRange {
                label,
                region_count,
            });
        }
        Ok(Self {
            labels,
            region_count,
            dimensions,
        })
    }

    /// The label of the pixel at `(x, y)`.
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

    /// Number of initial regions.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.region_count
    }

    /// Dimensions of the labeled image.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// Cluster center in combined CIELAB-and-position space.
#[derive(Debug, Clone, Copy)]
struct Center {
    lab: [f64; 3],
    x: f64,
    y: f64,
}

/// Compute a compact partition with a target region size of `target_size`
/// pixels and the given spatial compactness weight.
///
/// Pixels are assigned to the center minimizing
/// `d_lab + (compactness / S) * d_xy` within a 2S-by-2S search window, where
/// `S` is the grid interval derived from the target size. Clusters the
/// windows never reach (possible only in degenerate geometries) fall back to
/// a full nearest-center scan.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn compact_partition(image: &RgbImage, target_size: f64, compactness: f64) -> Partition {
    let dimensions = Dimensions::of(image);
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    let pixel_count = width * height;
    if pixel_count == 0 {
        return Partition {
            labels: Vec::new(),
            region_count: 0,
            dimensions,
        };
    }

    let lab: Vec<[f64; 3]> = image.pixels().map(|p| rgb_to_lab(p.0)).collect();

    let interval = target_size.max(1.0).sqrt().round().max(1.0) as usize;
    let mut centers = seed_centers(&lab, width, height, interval);
    let ratio = compactness / interval as f64;

    let mut assignment = vec![0u32; pixel_count];
    for _ in 0..ITERATIONS {
        let mut best = vec![f64::INFINITY; pixel_count];
        let mut claimed = vec![u32::MAX; pixel_count];

        for (ci, center) in centers.iter().enumerate() {
            let cx = center.x.round() as i64;
            let cy = center.y.round() as i64;
            let reach = interval as i64;
            let x_min = (cx - reach).max(0) as usize;
            let x_max = ((cx + reach).min(width as i64 - 1)) as usize;
            let y_min = (cy - reach).max(0) as usize;
            let y_max = ((cy + reach).min(height as i64 - 1)) as usize;

            for y in y_min..=y_max {
                for x in x_min..=x_max {
                    let idx = y * width + x;
                    let d = lab_distance(lab[idx], center.lab)
                        + ratio * xy_distance(x as f64, y as f64, center);
                    if d < best[idx] {
                        best[idx] = d;
                        claimed[idx] = ci as u32;
                    }
                }
            }
        }

        for idx in 0..pixel_count {
            if claimed[idx] != u32::MAX {
                continue;
            }
            let x = (idx % width) as f64;
            let y = (idx / width) as f64;
            let mut nearest = 0u32;
            let mut nearest_d = f64::INFINITY;
            for (ci, center) in centers.iter().enumerate() {
                let d = lab_distance(lab[idx], center.lab) + ratio * xy_distance(x, y, center);
                if d < nearest_d {
                    nearest_d = d;
                    nearest = ci as u32;
                }
            }
            claimed[idx] = nearest;
        }

        update_centers(&mut centers, &claimed, &lab, width);
        assignment = claimed;
    }

    let (labels, region_count) =
        enforce_connectivity(&assignment, width, height, target_size * MIN_FRAGMENT_FRACTION);
    Partition {
        labels,
        region_count,
        dimensions,
    }
}

/// Seed one center per grid cell, perturbed to the lowest-gradient position
/// in its 3x3 neighborhood so seeds avoid sitting on edges.
#[allow(clippy::cast_precision_loss)]
fn seed_centers(lab: &[[f64; 3]], width: usize, height: usize, interval: usize) -> Vec<Center> {
    let mut centers = Vec::new();
    for cy in (interval / 2..height).step_by(interval.max(1)) {
        for cx in (interval / 2..width).step_by(interval.max(1)) {
            let (sx, sy) = lowest_gradient_position(lab, width, height, cx, cy);
            centers.push(Center {
                lab: lab[sy * width + sx],
                x: sx as f64,
                y: sy as f64,
            });
        }
    }
    if centers.is_empty() {
        // Image smaller than one grid cell: a single center suffices.
        let sx = width / 2;
        let sy = height / 2;
        centers.push(Center {
            lab: lab[sy * width + sx],
            x: sx as f64,
            y: sy as f64,
        });
    }
    centers
}

/// The position within the 3x3 neighborhood of `(cx, cy)` with the smallest
/// color gradient. Candidates needing out-of-image samples are skipped; if
/// no candidate qualifies the original position is kept.
fn lowest_gradient_position(
    lab: &[[f64; 3]],
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
) -> (usize, usize) {
    let mut best = (cx.min(width - 1), cy.min(height - 1));
    let mut best_gradient = f64::INFINITY;

    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let x = cx as i64 + dx;
            let y = cy as i64 + dy;
            // Gradient needs all four axis neighbors in range.
            if x < 1 || y < 1 || x as usize >= width - 1 || y as usize >= height - 1 {
                continue;
            }
            #[allow(clippy::cast_sign_loss)]
            let (x, y) = (x as usize, y as usize);
            let idx = y * width + x;
            let gradient = lab_distance(lab[idx + 1], lab[idx - 1])
                + lab_distance(lab[idx + width], lab[idx - width]);
            if gradient < best_gradient {
                best_gradient = gradient;
                best = (x, y);
            }
        }
    }

    best
}

/// Move every center to the mean of its assigned pixels. Clusters that lost
/// all pixels this iteration keep their previous position.
#[allow(clippy::cast_precision_loss)]
fn update_centers(centers: &mut [Center], assignment: &[u32], lab: &[[f64; 3]], width: usize) {
    let mut sums = vec![([0.0f64; 3], 0.0f64, 0.0f64, 0usize); centers.len()];
    for (idx, &cluster) in assignment.iter().enumerate() {
        let entry = &mut sums[cluster as usize];
        let color = lab[idx];
        entry.0[0] += color[0];
        entry.0[1] += color[1];
        entry.0[2] += color[2];
        entry.1 += (idx % width) as f64;
        entry.2 += (idx / width) as f64;
        entry.3 += 1;
    }
    for (center, (color_sum, x_sum, y_sum, count)) in centers.iter_mut().zip(sums) {
        if count == 0 {
            continue;
        }
        let n = count as f64;
        center.lab = [color_sum[0] / n, color_sum[1] / n, color_sum[2] / n];
        center.x = x_sum / n;
        center.y = y_sum / n;
    }
}

/// Relabel 4-connected components of the raw assignment with sequential
/// labels, folding components smaller than `min_size` into a previously
/// labeled adjacent component. The result is dense: every label below the
/// returned count owns at least one pixel.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn enforce_connectivity(
    assignment: &[u32],
    width: usize,
    height: usize,
    min_size: f64,
) -> (Vec<u32>, usize) {
    let pixel_count = width * height;
    let min_size = min_size.max(1.0) as usize;
    let mut labels = vec![u32::MAX; pixel_count];
    let mut next = 0u32;
    let mut component = Vec::new();

    for start in 0..pixel_count {
        if labels[start] != u32::MAX {
            continue;
        }

        let x = start % width;
        let y = start / width;
        let adjacent = if x > 0 && labels[start - 1] != u32::MAX {
            Some(labels[start - 1])
        } else if y > 0 && labels[start - width] != u32::MAX {
            Some(labels[start - width])
        } else {
            None
        };

        component.clear();
        labels[start] = next;
        component.push(start);
        let mut cursor = 0;
        while cursor < component.len() {
            let idx = component[cursor];
            cursor += 1;
            let x = idx % width;
            let y = idx / width;

            let mut visit = |nidx: usize| {
                if labels[nidx] == u32::MAX && assignment[nidx] == assignment[start] {
                    labels[nidx] = next;
                    component.push(nidx);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        if component.len() < min_size
            && let Some(adjacent) = adjacent
        {
            for &idx in &component {
                labels[idx] = adjacent;
            }
        } else {
            next += 1;
        }
    }

    (labels, next as usize)
}

/// sRGB (D65) to CIELAB.
fn rgb_to_lab(rgb: [u8; 3]) -> [f64; 3] {
    fn linearize(c: f64) -> f64 {
        if c <= 0.040_45 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    fn f(t: f64) -> f64 {
        if t > 0.008_856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let r = linearize(f64::from(rgb[0]) / 255.0);
    let g = linearize(f64::from(rgb[1]) / 255.0);
    let b = linearize(f64::from(rgb[2]) / 255.0);

    let x = (0.4124 * r + 0.3576 * g + 0.1805 * b) / 0.950_47;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = (0.0193 * r + 0.1192 * g + 0.9505 * b) / 1.088_83;

    let fx = f(x);
    let fy = f(y);
    let fz = f(z);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn lab_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    (dl * dl + da * da + db * db).sqrt()
}

fn xy_distance(x: f64, y: f64, center: &Center) -> f64 {
    let dx = x - center.x;
    let dy = y - center.y;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn new_rejects_wrong_length() {
        let result = Partition::new(vec![0, 0, 0], 1, dims(2, 2));
        assert!(matches!(
            result,
            Err(SegmentationError::PartitionMismatch {
                expected: 4,
                actual: 3,
            }),
        ));
    }

    #[test]
    fn new_rejects_out_of_range_labels() {
        let result = Partition::new(vec![0, 3, 0, 1], 3, dims(2, 2));
        assert!(matches!(
            result,
            Err(SegmentationError::LabelOutOfRange {
                label: 3,
                region_count: 3,
            }),
        ));
    }

    #[test]
    fn label_accessor_is_row_major() {
        let partition = Partition::new(vec![0, 1, 2, 3], 4, dims(2, 2)).unwrap();
        assert_eq!(partition.label(0, 0), 0);
        assert_eq!(partition.label(1, 0), 1);
        assert_eq!(partition.label(0, 1), 2);
        assert_eq!(partition.label(1, 1), 3);
    }

    #[test]
    fn partition_covers_image_with_dense_labels() {
        let image = RgbImage::from_pixel(20, 20, Rgb([90, 120, 150]));
        let partition = compact_partition(&image, 25.0, 10.0);

        assert_eq!(partition.labels().len(), 400);
        assert!(partition.region_count() > 1);
        let mut counts = vec![0usize; partition.region_count()];
        for &label in partition.labels() {
            assert!((label as usize) < partition.region_count());
            counts[label as usize] += 1;
        }
        assert!(
            counts.iter().all(|&c| c > 0),
            "every label must own at least one pixel",
        );
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn partition_is_deterministic() {
        let image = RgbImage::from_fn(24, 16, |x, y| Rgb([(x * 10) as u8, (y * 12) as u8, 200]));
        let a = compact_partition(&image, 30.0, 10.0);
        let b = compact_partition(&image, 30.0, 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn regions_are_connected() {
        let image = RgbImage::from_fn(24, 16, |x, _y| {
            if x < 12 {
                Rgb([20, 20, 20])
            } else {
                Rgb([230, 230, 230])
            }
        });
        let partition = compact_partition(&image, 30.0, 10.0);

        // Flood fill every region and check it is a single 4-connected
        // component.
        let width = 24usize;
        let height = 16usize;
        let labels = partition.labels();
        let mut seen = vec![false; labels.len()];
        let mut components = 0usize;
        for start in 0..labels.len() {
            if seen[start] {
                continue;
            }
            components += 1;
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(idx) = stack.pop() {
                let x = idx % width;
                let y = idx / width;
                let mut visit = |nidx: usize| {
                    if !seen[nidx] && labels[nidx] == labels[start] {
                        seen[nidx] = true;
                        stack.push(nidx);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < width {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - width);
                }
                if y + 1 < height {
                    visit(idx + width);
                }
            }
        }
        assert_eq!(
            components,
            partition.region_count(),
            "each label must form exactly one connected component",
        );
    }

    #[test]
    fn image_smaller_than_one_cell_yields_single_region() {
        let image = RgbImage::from_pixel(2, 2, Rgb([50, 60, 70]));
        let partition = compact_partition(&image, 60.0, 10.0);
        assert_eq!(partition.region_count(), 1);
        assert!(partition.labels().iter().all(|&l| l == 0));
    }

    #[test]
    fn empty_image_yields_empty_partition() {
        let image = RgbImage::new(0, 0);
        let partition = compact_partition(&image, 60.0, 10.0);
        assert_eq!(partition.region_count(), 0);
        assert!(partition.labels().is_empty());
    }

    #[test]
    fn lab_conversion_orders_lightness() {
        let black = rgb_to_lab([0, 0, 0]);
        let gray = rgb_to_lab([128, 128, 128]);
        let white = rgb_to_lab([255, 255, 255]);
        assert!(black[0] < gray[0] && gray[0] < white[0]);
        // Neutral colors carry no chroma.
        assert!(gray[1].abs() < 1e-6 && gray[2].abs() < 1e-6);
    }
}
