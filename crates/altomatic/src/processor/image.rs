//! Image preparation for transport.
//!
//! Large photos are downscaled and re-encoded before base64 encoding so the
//! request payload stays small while text in the image remains legible.
//! Formats the `image` crate cannot decode (notably HEIC/HEIF) fall back to
//! raw-bytes encoding and let the provider deal with the original file.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::warn;

use crate::error::ProcessError;
use crate::processor::mime_for_path;

/// An image encoded as a `data:` URL, ready for a chat-completions payload.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data_url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ImageEncoder {
    max_edge: u32,
    max_pixels: u64,
    target_bytes: usize,
    jpeg_quality: u8,
    min_quality: u8,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self {
            max_edge: 1600,
            max_pixels: 1_300_000,
            target_bytes: 900 * 1024,
            jpeg_quality: 90,
            min_quality: 75,
        }
    }
}

impl ImageEncoder {
    /// Reads and encodes an image for upload. Only the initial file read is
    /// fatal; decode or re-encode failures degrade to raw passthrough.
    pub fn encode_for_upload(&self, path: &Path) -> Result<EncodedImage, ProcessError> {
        let _span = tracing::info_span!("processor.encode").entered();

        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadImage {
            path: path.to_path_buf(),
            source: e,
        })?;

        match self.reencode(&bytes) {
            Ok(encoded) => Ok(encoded),
            Err(e) => {
                warn!(
                    "Falling back to raw upload for {}: {}",
                    path.display(),
                    e
                );
                Ok(raw_data_url(&bytes, &mime_for_path(path)))
            }
        }
    }

    fn reencode(&self, bytes: &[u8]) -> Result<EncodedImage, ProcessError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ProcessError::ImageEncoding(format!("decode failed: {}", e)))?;

        let has_alpha = img.color().has_alpha();
        let mime_type = if has_alpha { "image/png" } else { "image/jpeg" };

        let mut current = self.resize_if_needed(img);
        let mut quality = self.jpeg_quality;
        let mut encoded = self.save(&current, has_alpha, quality)?;

        while encoded.len() > self.target_bytes {
            if !has_alpha && quality > self.min_quality {
                quality = quality.saturating_sub(5).max(self.min_quality);
            } else {
                let (width, height) = current.dimensions();
                if width.max(height) <= 720 {
                    break;
                }
                current = current.resize_exact(
                    (width * 9 / 10).max(1),
                    (height * 9 / 10).max(1),
                    FilterType::Lanczos3,
                );
            }
            encoded = self.save(&current, has_alpha, quality)?;
        }

        Ok(EncodedImage {
            data_url: data_url(&encoded, mime_type),
            mime_type: mime_type.to_string(),
        })
    }

    fn resize_if_needed(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let mut factor = 1.0f64;

        let longest = width.max(height);
        if longest > self.max_edge {
            factor = factor.min(self.max_edge as f64 / longest as f64);
        }

        let total_pixels = width as u64 * height as u64;
        if total_pixels > self.max_pixels {
            factor = factor.min((self.max_pixels as f64 / total_pixels as f64).sqrt());
        }

        if factor < 1.0 {
            let new_width = ((width as f64 * factor) as u32).max(1);
            let new_height = ((height as f64 * factor) as u32).max(1);
            img.resize_exact(new_width, new_height, FilterType::Lanczos3)
        } else {
            img
        }
    }

    fn save(
        &self,
        img: &DynamicImage,
        has_alpha: bool,
        quality: u8,
    ) -> Result<Vec<u8>, ProcessError> {
        let mut buffer = Vec::new();
        if has_alpha {
            img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| ProcessError::ImageEncoding(format!("PNG encode failed: {}", e)))?;
        } else {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder
                .encode_image(&img.to_rgb8())
                .map_err(|e| ProcessError::ImageEncoding(format!("JPEG encode failed: {}", e)))?;
        }
        Ok(buffer)
    }
}

fn data_url(bytes: &[u8], mime_type: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime_type, encoded)
}

fn raw_data_url(bytes: &[u8], mime_type: &str) -> EncodedImage {
    EncodedImage {
        data_url: data_url(bytes, mime_type),
        mime_type: mime_type.to_string(),
    }
}
