pub mod image;
pub mod ocr;

use std::path::Path;

pub use image::{EncodedImage, ImageEncoder};
pub use ocr::OcrEngine;

/// File extensions accepted as batch input. HEIC/HEIF are accepted even
/// though they cannot be decoded locally; they ride through as raw base64.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif",
];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// MIME type for a path, normalizing `jpg` to `image/jpeg`. HEIC/HEIF are
/// mapped explicitly since registries lag behind on them.
pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "heic" => "image/heic".to_string(),
        "heif" => "image/heif".to_string(),
        _ => mime_guess::from_path(path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}
