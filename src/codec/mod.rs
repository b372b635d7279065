//! Encodes a [`Bitmap`] to bytes and decodes bytes back to a [`Bitmap`].

pub mod adaptive;
pub mod lossless;
pub mod lossy;

pub use adaptive::AdaptiveCodec;
pub use lossless::LosslessCodec;
pub use lossy::LossyCodec;

use crate::bitmap::Bitmap;
use crate::error::DownloaderResult;

/// Duck-typed provider contract for byte encoding. Must never panic; all
/// failures surface as [`crate::error::DownloaderError::DecodeFailed`].
pub trait Codec: Send + Sync {
    fn encode(&self, bitmap: &Bitmap) -> DownloaderResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> DownloaderResult<Bitmap>;
    fn file_extension(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
}

pub(crate) fn decode_any(bytes: &[u8]) -> DownloaderResult<Bitmap> {
    let img = image::load_from_memory(bytes)?;
    Ok(Bitmap::new(img))
}
