//! Local ternary pattern texture descriptor.
//!
//! For every pixel, compares its luminance against its 8 neighbors under a
//! similarity threshold and packs the outcomes into a pair of 8-bit codes:
//! brighter neighbors set bits in the positive code, darker neighbors in the
//! negative code, similar neighbors in neither. The directions whose
//! comparison came out "similar" form a circular sequence of 8 flags; a pixel
//! whose longest circular run of similar directions reaches the homogeneity
//! threshold is marked homogeneous.
//!
//! Border pixels evaluate a full 8-neighborhood against an edge-clamped
//! padded luminance plane, so every pixel produces a complete code pair.

use image::RgbImage;

/// Texture codes for a single pixel. Immutable once computed; consumed only
/// while building the region graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRecord {
    /// Bit per direction whose neighbor is brighter than the pixel.
    pub positive: u8,
    /// Bit per direction whose neighbor is darker than the pixel.
    pub negative: u8,
    /// Whether the longest circular run of similar directions reached the
    /// homogeneity threshold.
    pub homogeneous: bool,
}

/// Neighbor offsets in fixed clockwise order starting at North:
/// N, NE, E, SE, S, SW, W, NW. Bit weight for direction `i` is `1 << i`.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Compute a [`TextureRecord`] for every pixel, in row-major order.
///
/// `similar_threshold` is the luminance difference below which two pixels
/// count as similar; `homogeneity_threshold` is the circular run length
/// (0 to 8) at which a pixel's pattern counts as homogeneous.
#[must_use]
pub fn compute_texture(
    image: &RgbImage,
    similar_threshold: u8,
    homogeneity_threshold: u8,
) -> Vec<TextureRecord> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    // Luminance plane padded by one pixel on every side, edge-clamped, so the
    // 8-neighborhood of border pixels never leaves the buffer.
    let padded_w = width + 2;
    let padded_h = height + 2;
    let mut luminance = Vec::with_capacity(padded_w * padded_h);
    for y in 0..padded_h {
        for x in 0..padded_w {
            let u = x.saturating_sub(1).min(width - 1);
            let v = y.saturating_sub(1).min(height - 1);
            #[allow(clippy::cast_possible_truncation)]
            let pixel = image.get_pixel(u as u32, v as u32);
            luminance.push(pixel_luminance(pixel.0));
        }
    }

    let threshold = i32::from(similar_threshold);
    let run_threshold = usize::from(homogeneity_threshold);
    let mut records = Vec::with_capacity(width * height);

    for y in 1..=height {
        for x in 1..=width {
            let center = luminance[x + y * padded_w];
            let mut positive = 0u8;
            let mut negative = 0u8;
            let mut similar = [false; 8];

            for (direction, (dx, dy)) in NEIGHBOR_OFFSETS.iter().enumerate() {
                #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
                let neighbor = {
                    let nx = (x as i64 + dx) as usize;
                    let ny = (y as i64 + dy) as usize;
                    luminance[nx + ny * padded_w]
                };

                if (center - neighbor).abs() < threshold {
                    similar[direction] = true;
                } else if neighbor > center {
                    positive |= 1 << direction;
                } else {
                    negative |= 1 << direction;
                }
            }

            records.push(TextureRecord {
                positive,
                negative,
                homogeneous: longest_circular_run(&similar) >= run_threshold,
            });
        }
    }

    records
}

/// Integer-truncated Rec. 709 luminance.
#[allow(clippy::cast_possible_truncation)]
fn pixel_luminance(rgb: [u8; 3]) -> i32 {
    let [r, g, b] = rgb;
    (0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b)) as i32
}

/// Longest run of consecutive `true` flags, wrapping from the last slot back
/// to the first.
fn longest_circular_run(flags: &[bool; 8]) -> usize {
    if flags.iter().all(|&f| f) {
        return flags.len();
    }
    // Not all set, so scanning the doubled sequence covers every wrap-around
    // run exactly once.
    let mut longest = 0;
    let mut run = 0;
    for i in 0..flags.len() * 2 {
        if flags[i % flags.len()] {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}
