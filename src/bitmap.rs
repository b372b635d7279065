//! The decoded, in-memory image value shared between the cache, the
//! dispatcher, and callers.

use image::DynamicImage;

/// A fully decoded image. Immutable once produced; cheap to clone since the
/// pixel buffer lives behind an `Arc` internally via [`DynamicImage`]'s own
/// reference-counted storage is not guaranteed, so callers are expected to
/// wrap `Bitmap` in `Arc` themselves where sharing matters (the cache does).
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: DynamicImage,
}

impl Bitmap {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn inner(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_inner(self) -> DynamicImage {
        self.image
    }

    /// Byte-for-byte pixel equality, ignoring color-type metadata that does
    /// not affect sample values. Used by round-trip tests for the lossless
    /// codec.
    pub fn pixels_equal(&self, other: &Bitmap) -> bool {
        self.image.to_rgba8() == other.image.to_rgba8()
    }
}
