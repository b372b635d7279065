use crate::bitmap::Bitmap;
use crate::error::DownloaderResult;

use super::{decode_any, Codec, LosslessCodec, LossyCodec};

/// Tries lossless first; if the resulting byte length exceeds
/// `threshold_bytes`, re-encodes with lossy at `fallback_quality` and
/// persists the smaller result. Deterministic given the same bitmap and
/// threshold.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveCodec {
    threshold_bytes: usize,
    fallback_quality: f32,
}

impl AdaptiveCodec {
    pub fn new(threshold_bytes: usize, fallback_quality: f32) -> Self {
        Self {
            threshold_bytes,
            fallback_quality,
        }
    }
}

impl Default for AdaptiveCodec {
    fn default() -> Self {
        Self::new(512 * 1024, 0.8)
    }
}

impl Codec for AdaptiveCodec {
    fn encode(&self, bitmap: &Bitmap) -> DownloaderResult<Vec<u8>> {
        let lossless = LosslessCodec.encode(bitmap)?;
        if lossless.len() <= self.threshold_bytes {
            return Ok(lossless);
        }
        let lossy = LossyCodec::new(self.fallback_quality).encode(bitmap)?;
        if lossy.len() < lossless.len() {
            Ok(lossy)
        } else {
            Ok(lossless)
        }
    }

    fn decode(&self, bytes: &[u8]) -> DownloaderResult<Bitmap> {
        decode_any(bytes)
    }

    fn file_extension(&self) -> &'static str {
        "img"
    }

    fn display_name(&self) -> &'static str {
        "adaptive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Bitmap {
        Bitmap::new(image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            w, h, Rgba(px),
        )))
    }

    #[test]
    fn small_bitmap_stays_lossless() {
        let codec = AdaptiveCodec::new(1_000_000, 0.8);
        let bitmap = solid(4, 4, [1, 2, 3, 255]);
        let encoded = codec.encode(&bitmap).expect("encode");
        let decoded = codec.decode(&encoded).expect("decode");
        assert!(bitmap.pixels_equal(&decoded));
    }

    #[test]
    fn deterministic_given_same_threshold() {
        let codec = AdaptiveCodec::new(16, 0.5);
        let bitmap = solid(16, 16, [9, 9, 9, 255]);
        let a = codec.encode(&bitmap).expect("encode a");
        let b = codec.encode(&bitmap).expect("encode b");
        assert_eq!(a, b);
    }
}
