//! Uploaded image decoding and annotated-image references.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image validation errors.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("no image provided")]
    Empty,
    #[error("image is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    ZeroSized,
}

/// A decoded upload together with its pixel extents.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

/// Decode raster bytes, enforcing a size limit first.
pub fn decode_image(bytes: &[u8], max_bytes: usize) -> Result<DecodedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes)?;
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ImageError::ZeroSized);
    }
    Ok(DecodedImage {
        image,
        width,
        height,
        format,
    })
}

/// Opaque URI pointing at an annotated image (usually a `data:` URI).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatedImageRef(String);

impl AnnotatedImageRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Build a `data:<mime>;base64,...` reference from encoded bytes.
    pub fn data_uri(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
    }

    /// Wrap an already base64-encoded JPEG payload.
    pub fn from_base64_jpeg(payload: &str) -> Self {
        Self(format!("data:image/jpeg;base64,{payload}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotatedImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([200, 200, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn decodes_png_and_reports_extents() {
        let decoded = decode_image(&png_bytes(64, 48), 1 << 20).expect("decode");
        assert_eq!((decoded.width, decoded.height), (64, 48));
        assert_eq!(decoded.format, Some(ImageFormat::Png));
    }

    #[test]
    fn rejects_empty_oversized_and_garbage() {
        assert!(matches!(decode_image(&[], 10), Err(ImageError::Empty)));
        let bytes = png_bytes(8, 8);
        assert!(matches!(
            decode_image(&bytes, 4),
            Err(ImageError::TooLarge { limit: 4, .. })
        ));
        assert!(matches!(
            decode_image(b"definitely not an image", 1 << 20),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn data_uri_prefix() {
        let r = AnnotatedImageRef::data_uri("image/png", &[1, 2, 3]);
        assert_eq!(r.as_str(), "data:image/png;base64,AQID");
    }
}
