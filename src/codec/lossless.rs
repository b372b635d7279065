use std::io::Cursor;

use image::ImageFormat;

use crate::bitmap::Bitmap;
use crate::error::DownloaderResult;

use super::{decode_any, Codec};

/// Fully round-trippable PNG encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct LosslessCodec;

impl Codec for LosslessCodec {
    fn encode(&self, bitmap: &Bitmap) -> DownloaderResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        bitmap.inner().write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    fn decode(&self, bytes: &[u8]) -> DownloaderResult<Bitmap> {
        decode_any(bytes)
    }

    fn file_extension(&self) -> &'static str {
        "png"
    }

    fn display_name(&self) -> &'static str {
        "lossless"
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
    fn round_trip_is_bit_identical() {
        let codec = LosslessCodec;
        let original = solid(4, 4, [10, 20, 30, 255]);
        let bytes = codec.encode(&original).expect("encode");
        let decoded = codec.decode(&bytes).expect("decode");
        assert!(original.pixels_equal(&decoded));
    }

    #[test]
    fn extension_is_png() {
        assert_eq!(LosslessCodec.file_extension(), "png");
    }
}
