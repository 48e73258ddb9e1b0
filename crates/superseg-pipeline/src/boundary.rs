//! Region boundary visualization.
//!
//! Paints a copy of the source image with white pixels wherever the final
//! label map changes within a pixel's 3×3 neighborhood. Purely a consumer of
//! the segmentation output; the engine never depends on it.

use image::{Rgb, RgbImage};

use crate::types::LabelMap;

/// Color used for boundary pixels.
const BOUNDARY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Return a copy of `image` with every boundary pixel painted white.
///
/// A pixel is a boundary pixel when any pixel in its clamped 3×3
/// neighborhood carries a different label. Interiors of regions are copied
/// through unchanged, so a single-region segmentation reproduces the input
/// exactly.
#[must_use]
pub fn draw_boundaries(image: &RgbImage, labels: &LabelMap) -> RgbImage {
    let mut result = image.clone();
    let width = image.width();
    let height = image.height();
    if width == 0 || height == 0 {
        return result;
    }

    for y in 0..height {
        for x in 0..width {
            let label = labels.label(x, y);
            let v_min = y.saturating_sub(1);
            let v_max = (y + 1).min(height - 1);
            let u_min = x.saturating_sub(1);
            let u_max = (x + 1).min(width - 1);

            'neighborhood: for v in v_min..=v_max {
                for u in u_min..=u_max {
                    if labels.label(u, v) != label {
                        result.put_pixel(x, y, BOUNDARY_COLOR);
                        break 'neighborhood;
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    fn label_map(labels: Vec<u32>, width: u32, height: u32, region_count: usize) -> LabelMap {
        LabelMap::new(
            labels,
            Dimensions { width, height },
            region_count,
        )
    }

    #[test]
    fn single_region_leaves_image_unchanged() {
        let image = RgbImage::from_pixel(8, 8, Rgb([40, 80, 120]));
        let labels = label_map(vec![0; 64], 8, 8, 1);
        let rendered = draw_boundaries(&image, &labels);
        assert_eq!(rendered, image);
    }

    #[test]
    fn vertical_split_marks_the_two_middle_columns() {
        let image = RgbImage::from_fn(4, 4, |x, _y| {
            if x < 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let labels: Vec<u32> = (0u32..16).map(|i| u32::from(i % 4 >= 2)).collect();
        let rendered = draw_boundaries(&image, &label_map(labels, 4, 4, 2));

        for y in 0..4 {
            assert_eq!(*rendered.get_pixel(0, y), Rgb([255, 0, 0]));
            assert_eq!(*rendered.get_pixel(1, y), Rgb([255, 255, 255]));
            assert_eq!(*rendered.get_pixel(2, y), Rgb([255, 255, 255]));
            assert_eq!(*rendered.get_pixel(3, y), Rgb([0, 0, 255]));
        }
    }

    #[test]
    fn isolated_pixel_region_marks_its_whole_neighborhood() {
        let image = RgbImage::from_pixel(3, 3, Rgb([10, 10, 10]));
        let mut labels = vec![0u32; 9];
        labels[4] = 1;
        let rendered = draw_boundaries(&image, &label_map(labels, 3, 3, 2));
        // Every pixel sees the differing center within its 3x3 window.
        for pixel in rendered.pixels() {
            assert_eq!(*pixel, Rgb([255, 255, 255]));
        }
    }

    #[test]
    fn empty_image_round_trips() {
        let image = RgbImage::new(0, 0);
        let labels = label_map(Vec::new(), 0, 0, 0);
        let rendered = draw_boundaries(&image, &labels);
        assert_eq!(rendered.dimensions(), (0, 0));
    }
}
