use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use crate::bitmap::Bitmap;
use crate::error::DownloaderResult;

use super::{decode_any, Codec};

/// JPEG encoding parametrized by quality in `[0.0, 1.0]`, `1.0` = best.
#[derive(Debug, Clone, Copy)]
pub struct LossyCodec {
    quality: f32,
}

impl LossyCodec {
    pub fn new(quality: f32) -> Self {
        Self {
            quality: quality.clamp(0.0, 1.0),
        }
    }

    fn quality_u8(&self) -> u8 {
        (self.quality * 100.0).round() as u8
    }
}

impl Default for LossyCodec {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl Codec for LossyCodec {
    fn encode(&self, bitmap: &Bitmap) -> DownloaderResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        let rgb = bitmap.inner().to_rgb8();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality_u8());
        encoder.encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(buf.into_inner())
    }

    fn decode(&self, bytes: &[u8]) -> DownloaderResult<Bitmap> {
        decode_any(bytes)
    }

    fn file_extension(&self) -> &'static str {
        "jpg"
    }

    fn display_name(&self) -> &'static str {
        "lossy"
    }
}
