//! Height-band terrain texture blending.
//!
//! Each texel picks a position on a 0..3 layer scale from the local elevation
//! relative to the start height and height range, both interpolated
//! bilinearly between the four region corners. The texel color is a linear
//! blend of the two detail textures on either side of that position.

use image::{Rgb, RgbImage};

use super::{HeightField, REGION_WIDTH, TerrainSplatter};
use crate::assets::image::DecodedImage;

#[derive(Debug, Default, Clone, Copy)]
pub struct HeightBandSplatter;

/// Bilinear interpolation between corner values `[00, 01, 10, 11]`, where the
/// first digit selects x and the second y.
fn bilinear(corners: &[f32; 4], fx: f32, fy: f32) -> f32 {
    let [v00, v01, v10, v11] = *corners;
    let bottom = v00 + (v10 - v00) * fx;
    let top = v01 + (v11 - v01) * fx;
    bottom + (top - bottom) * fy
}

/// Detail texture sampled so that it spans the whole region once.
fn sample(detail: &DecodedImage, x: usize, y: usize) -> [f32; 3] {
    let px = (x * detail.width as usize / REGION_WIDTH) as u32;
    let py = (y * detail.height as usize / REGION_WIDTH) as u32;
    let [r, g, b, _] = detail.pixel(px, py);
    [r as f32, g as f32, b as f32]
}

impl TerrainSplatter for HeightBandSplatter {
    fn splat(
        &self,
        heights: &HeightField,
        detail: &[DecodedImage; 4],
        start_heights: &[f32; 4],
        height_ranges: &[f32; 4],
    ) -> Option<RgbImage> {
        if detail.iter().any(|d| d.width == 0 || d.height == 0) {
            return None;
        }

        let size = REGION_WIDTH as u32;
        let mut out = RgbImage::new(size, size);
        let edge = (REGION_WIDTH - 1) as f32;
        for y in 0..REGION_WIDTH {
            for x in 0..REGION_WIDTH {
                let fx = x as f32 / edge;
                let fy = y as f32 / edge;
                let start = bilinear(start_heights, fx, fy);
                let range = bilinear(height_ranges, fx, fy);

                let layer = if range.abs() > f32::EPSILON {
                    ((heights.get(x, y) - start) / range * 4.0).clamp(0.0, 3.0)
                } else {
                    0.0
                };
                let layer = if layer.is_finite() { layer } else { 0.0 };

                let lower = (layer.floor() as usize).min(3);
                let upper = (lower + 1).min(3);
                let t = layer - lower as f32;

                let a = sample(&detail[lower], x, y);
                let b = sample(&detail[upper], x, y);
                let px = std::array::from_fn(|i| (a[i] + (b[i] - a[i]) * t).round() as u8);
                // Image rows run top to bottom; region y runs south to north.
                out.put_pixel(x as u32, size - 1 - y as u32, Rgb(px));
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> [DecodedImage; 4] {
        [
            DecodedImage::solid(4, 4, [0, 0, 0, 255], false),
            DecodedImage::solid(4, 4, [100, 100, 100, 255], false),
            DecodedImage::solid(8, 8, [200, 200, 200, 255], true),
            DecodedImage::solid(2, 2, [255, 0, 0, 255], false),
        ]
    }

    #[test]
    fn bilinear_corners() {
        let c = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(bilinear(&c, 0.0, 0.0), 1.0);
        assert_eq!(bilinear(&c, 0.0, 1.0), 2.0);
        assert_eq!(bilinear(&c, 1.0, 0.0), 3.0);
        assert_eq!(bilinear(&c, 1.0, 1.0), 4.0);
        assert_eq!(bilinear(&c, 0.5, 0.5), 2.5);
    }

    #[test]
    fn low_ground_uses_first_layer_high_ground_the_last() {
        let starts = [10.0; 4];
        let ranges = [40.0; 4];

        let low = HeightBandSplatter
            .splat(&HeightField::flat(0.0), &details(), &starts, &ranges)
            .unwrap();
        assert_eq!(low.dimensions(), (256, 256));
        assert_eq!(low.get_pixel(0, 0), &Rgb([0, 0, 0]));

        let high = HeightBandSplatter
            .splat(&HeightField::flat(100.0), &details(), &starts, &ranges)
            .unwrap();
        assert_eq!(high.get_pixel(128, 128), &Rgb([255, 0, 0]));

        // (25 - 10) / 40 * 4 = 1.5: halfway between layers 1 and 2
        let mid = HeightBandSplatter
            .splat(&HeightField::flat(25.0), &details(), &starts, &ranges)
            .unwrap();
        assert_eq!(mid.get_pixel(5, 5), &Rgb([150, 150, 150]));
    }

    #[test]
    fn empty_detail_texture_fails() {
        let mut d = details();
        d[2] = DecodedImage::solid(0, 0, [0; 4], false);
        assert!(
            HeightBandSplatter
                .splat(&HeightField::flat(0.0), &d, &[0.0; 4], &[1.0; 4])
                .is_none()
        );
    }
}
