//! Storage backends for finished thumbnails, plus the output record
//! returned to callers.

mod cloudinary;
mod local;

pub use cloudinary::CloudinaryStore;
pub use local::LocalStore;

use serde::Serialize;

use crate::error::ThumbsmithError;
use crate::render::EncodedThumbnail;

/// Where finished thumbnails are persisted; chosen once at startup.
#[derive(Clone, Debug)]
pub enum ThumbnailStore {
    /// Hosted on Cloudinary.
    Cloudinary(CloudinaryStore),
    /// Written to the local output directory.
    Local(LocalStore),
}

impl ThumbnailStore {
    /// Persists the encoded thumbnail and returns its public URL.
    pub async fn put(&self, thumbnail: &EncodedThumbnail) -> Result<StoredImage, ThumbsmithError> {
        match self {
            Self::Cloudinary(store) => store.put(thumbnail).await,
            Self::Local(store) => store.put(thumbnail).await,
        }
    }
}

/// Handle to a stored thumbnail.
#[derive(Clone, Debug)]
pub struct StoredImage {
    /// Public URL the thumbnail can be fetched from.
    pub url: String,
}

/// Facts about the final encoded image, read back from its bytes.
#[derive(Clone, Debug, Serialize)]
pub struct ImageMetadata {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Encoding label, eg `jpeg`.
    pub format: String,
    /// Encoded size in bytes.
    pub size: u64,
}

/// The per-request output record: one URL plus pixel metadata.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    /// Where the finished thumbnail lives.
    pub thumbnail_url: String,
    /// Metadata read back from the encoded bytes.
    pub metadata: ImageMetadata,
}

/// Short label for an image format, eg `jpeg`.
pub fn format_label(format: image::ImageFormat) -> &'static str {
    match format {
        image::ImageFormat::Jpeg => "jpeg",
        image::ImageFormat::Png => "png",
        image::ImageFormat::Gif => "gif",
        image::ImageFormat::WebP => "webp",
        _ => "unknown",
    }
}

/// Reads pixel metadata back from encoded bytes rather than trusting the
/// configuration that produced them.
pub fn read_metadata(bytes: &[u8]) -> Result<ImageMetadata, ThumbsmithError> {
    let format = image::guess_format(bytes)
        .map(format_label)
        .unwrap_or("unknown")
        .to_string();
    let decoded = image::load_from_memory(bytes)?;
    Ok(ImageMetadata {
        width: decoded.width(),
        height: decoded.height(),
        format,
        size: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn metadata_comes_from_the_encoded_bytes() {
        let mut cursor = Cursor::new(Vec::new());
        let canvas = RgbaImage::from_pixel(32, 16, Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .expect("encode png");
        let bytes = cursor.into_inner();

        let metadata = read_metadata(&bytes).expect("read metadata");
        assert_eq!(metadata.width, 32);
        assert_eq!(metadata.height, 16);
        assert_eq!(metadata.format, "png");
        assert_eq!(metadata.size, bytes.len() as u64);
    }

    #[test]
    fn unreadable_bytes_are_an_error() {
        assert!(read_metadata(b"definitely not an image").is_err());
    }
}
