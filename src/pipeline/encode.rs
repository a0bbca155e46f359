//! Image encoding for extracted PDF images.
//!
//! Two directions: a decoded `DynamicImage` from pdfium is written to disk as
//! PNG, and a file on disk is base64-wrapped into an `ImageData` attachment
//! for the vision model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// File extension used for extracted images.
pub const EXTRACTED_IMAGE_EXT: &str = "png";

/// Encode an extracted image as PNG bytes.
///
/// ## Why PNG?
/// PDF images arrive in many internal encodings (Flate, DCT, JBIG2, CCITT).
/// pdfium hands back decoded pixels, and PNG stores them losslessly in a
/// format every browser shows.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap raw image bytes for a vision request.
pub fn image_data(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime)
}

/// Read an image file and wrap it for a vision request.
pub async fn image_data_from_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    let mime = mime_guess::from_path(path).first_or(mime_guess::mime::IMAGE_PNG);
    Ok(image_data(&bytes, mime.essence_str()))
}
