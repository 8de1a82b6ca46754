//! Optional OCR pass over the input image.
//!
//! OCR output only enriches the prompt, so nothing here is allowed to fail
//! a job: engine errors and timeouts degrade to an empty string. The
//! Tesseract call runs on its own thread bounded by `recv_timeout` so a
//! hung engine cannot stall a worker indefinitely.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use log::warn;

use crate::config::schema::OcrSettings;
use crate::error::ProcessError;

#[derive(Clone)]
pub struct OcrEngine {
    enabled: bool,
    languages: String,
    timeout: Duration,
}

impl OcrEngine {
    pub fn from_settings(settings: &OcrSettings) -> Self {
        let languages = if settings.languages.is_empty() {
            "eng".to_string()
        } else {
            settings.languages.join("+")
        };

        Self {
            enabled: settings.enabled,
            languages,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            languages: "eng".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Extracts text from the image at `path`. Returns an empty string when
    /// OCR is disabled, the file or engine misbehaves, or the timeout hits.
    pub fn extract_text(&self, path: &Path) -> String {
        if !self.enabled {
            return String::new();
        }

        let _span = tracing::info_span!("processor.ocr").entered();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("OCR skipped, cannot read {}: {}", path.display(), e);
                return String::new();
            }
        };

        match self.run_with_timeout(bytes) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("OCR failed for {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    fn run_with_timeout(&self, bytes: Vec<u8>) -> Result<String, ProcessError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let languages = self.languages.clone();

        // Detached on purpose: if the engine hangs past the timeout the
        // thread finishes on its own and the send into the dropped channel
        // is ignored.
        std::thread::spawn(move || {
            let _ = tx.send(run_tesseract(&bytes, &languages));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(ProcessError::OcrTimeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

fn run_tesseract(image_data: &[u8], languages: &str) -> Result<String, ProcessError> {
    // Normalize to PNG in memory; leptess handles PNG reliably across
    // the input formats we accept.
    let img = image::load_from_memory(image_data)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    let mut cursor = Cursor::new(&mut png_data);
    img.write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to convert image: {}", e)))?;

    let mut lt = leptess::LepTess::new(None, languages)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e)))?;

    lt.set_image_from_mem(&png_data)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

    lt.get_utf8_text()
        .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))
}
