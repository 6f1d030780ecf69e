//! Decoded texture buffers and the codec seam.

use image::{DynamicImage, RgbaImage};
use thiserror::Error;

use crate::types::Color4;

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("unsupported or corrupt image data: {0}")]
    Codec(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
}

/// Raw planar channel buffers, row-major, one byte per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub red: Vec<u8>,
    pub green: Vec<u8>,
    pub blue: Vec<u8>,
    /// Present only if the source had an alpha channel.
    pub alpha: Option<Vec<u8>>,
}

impl DecodedImage {
    pub fn from_rgba(image: &RgbaImage, has_alpha: bool) -> Self {
        let n = (image.width() * image.height()) as usize;
        let mut red = Vec::with_capacity(n);
        let mut green = Vec::with_capacity(n);
        let mut blue = Vec::with_capacity(n);
        let mut alpha = Vec::with_capacity(if has_alpha { n } else { 0 });
        for px in image.pixels() {
            let [r, g, b, a] = px.0;
            red.push(r);
            green.push(g);
            blue.push(b);
            if has_alpha {
                alpha.push(a);
            }
        }
        Self {
            width: image.width(),
            height: image.height(),
            red,
            green,
            blue,
            alpha: has_alpha.then_some(alpha),
        }
    }

    /// Single-color image, handy for tests and placeholder detail textures.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], has_alpha: bool) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            red: vec![rgba[0]; n],
            green: vec![rgba[1]; n],
            blue: vec![rgba[2]; n],
            alpha: has_alpha.then(|| vec![rgba[3]; n]),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.red.len()
    }

    /// RGBA at `(x, y)`; alpha reads as 255 when the image has none.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y * self.width + x) as usize;
        let a = self.alpha.as_ref().map_or(255, |a| a[i]);
        [self.red[i], self.green[i], self.blue[i], a]
    }

    /// Per-channel mean with truncating integer division. Images without an
    /// alpha channel report fully opaque. `None` for an empty image.
    pub fn mean_color(&self) -> Option<Color4> {
        let n = self.pixel_count() as u64;
        if n == 0 {
            return None;
        }
        let mean = |channel: &[u8]| (channel.iter().map(|&v| v as u64).sum::<u64>() / n) as u8;

        let a = self.alpha.as_deref().map_or(255, mean);
        Some(Color4::from_bytes(
            mean(&self.red),
            mean(&self.green),
            mean(&self.blue),
            a,
        ))
    }
}

/// Turns compressed texture payloads into channel buffers.
pub trait ImageCodec {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, ImageDecodeError>;
}

/// Codec for the raster formats the `image` crate is built with (PNG, JPEG).
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, ImageDecodeError> {
        let img: DynamicImage = image::load_from_memory(data)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(ImageDecodeError::Empty);
        }
        let has_alpha = img.color().has_alpha();
        Ok(DecodedImage::from_rgba(&img.to_rgba8(), has_alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn mean_truncates() {
        let img = DecodedImage {
            width: 2,
            height: 1,
            red: vec![0, 255],
            green: vec![10, 11],
            blue: vec![1, 2],
            alpha: None,
        };
        // 127.5 -> 127, 10.5 -> 10, 1.5 -> 1
        assert_eq!(
            img.mean_color(),
            Some(Color4::from_bytes(127, 10, 1, 255))
        );
    }

    #[test]
    fn mean_uses_alpha_when_present() {
        let mut img = DecodedImage::solid(2, 2, [255, 255, 255, 0], true);
        img.alpha = Some(vec![0, 0, 255, 255]);
        assert_eq!(
            img.mean_color(),
            Some(Color4::from_bytes(255, 255, 255, 127))
        );
    }

    #[test]
    fn empty_image_has_no_mean() {
        let img = DecodedImage::solid(0, 0, [0; 4], false);
        assert_eq!(img.mean_color(), None);
    }

    #[test]
    fn raster_codec_tracks_alpha() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            3,
            2,
            image::Rgb([10, 20, 30]),
        ));
        let decoded = RasterCodec.decode(&encode_png(rgb)).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert!(decoded.alpha.is_none());
        assert_eq!(decoded.pixel(2, 1), [10, 20, 30, 255]);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4])));
        let decoded = RasterCodec.decode(&encode_png(rgba)).unwrap();
        assert_eq!(decoded.alpha.as_deref(), Some(&[4u8][..]));
    }

    #[test]
    fn raster_codec_rejects_garbage() {
        assert!(RasterCodec.decode(&[0, 1, 2, 3]).is_err());
    }
}
