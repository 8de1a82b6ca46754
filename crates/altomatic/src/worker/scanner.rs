use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::processor::is_supported_image;

/// Expands a batch input (single file or directory) into image paths.
pub struct ImageScanner {
    root: PathBuf,
    recursive: bool,
}

impl ImageScanner {
    pub fn new<P: AsRef<Path>>(root: P, recursive: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            recursive,
        }
    }

    pub fn scan(&self) -> Result<Vec<PathBuf>, WorkerError> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut images = Vec::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| !is_session_dir(e.path()));

        for entry in walker {
            let entry = entry.map_err(|e| WorkerError::ScanFailed {
                path: self.root.clone(),
                source: e,
            })?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            if is_supported_image(path) {
                debug!("Found image: {}", path.display());
                images.push(path.to_path_buf());
            }
        }

        // Stable submission order regardless of directory iteration order.
        images.sort();

        info!("Scanned {} images in {}", images.len(), self.root.display());
        Ok(images)
    }
}

/// Session folders created by earlier runs must not be re-ingested when the
/// output root sits inside the input directory.
fn is_session_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("session-"))
            .unwrap_or(false)
}

/// Resolves a user-supplied input into the list of images to process.
pub fn expand_input(input: &Path, recursive: bool) -> Result<Vec<PathBuf>, WorkerError> {
    if !input.exists() {
        return Err(WorkerError::InputNotFound(input.to_path_buf()));
    }

    if input.is_file() {
        // An explicitly chosen file is taken as-is.
        return Ok(vec![input.to_path_buf()]);
    }

    ImageScanner::new(input, recursive).scan()
}
