//! End-of-batch report files.
//!
//! The summary mirrors what the results table shows; `failed.log` exists
//! only when something actually failed.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::broadcast::job_progress::JobStatus;
use crate::error::StorageError;
use crate::session::ResultRow;
use crate::storage::filesystem::{short_id, timestamp_prefix};

/// Writes the human-readable summary of succeeded jobs into the session
/// folder. Returns the summary path.
pub fn write_summary(session_dir: &Path, rows: &[ResultRow]) -> Result<PathBuf, StorageError> {
    let path = session_dir.join(format!(
        "altomatic-output-{}-{}.txt",
        timestamp_prefix(),
        short_id(4)
    ));

    let mut contents = String::new();
    for row in rows {
        if row.status != JobStatus::Succeeded {
            continue;
        }
        let name = row
            .new_filename
            .as_deref()
            .map(strip_extension)
            .unwrap_or_default();

        // Writing into a String cannot fail.
        let _ = writeln!(contents, "[Original: {}]", row.original_filename);
        let _ = writeln!(contents, "Name: {}", name);
        let _ = writeln!(contents, "Alt: {}", row.alt_text.as_deref().unwrap_or(""));
        let _ = writeln!(contents);
    }

    std::fs::write(&path, contents).map_err(|e| StorageError::WriteReport {
        path: path.clone(),
        source: e,
    })?;

    Ok(path)
}

/// Writes `failed.log` listing failed jobs, or nothing when the batch was
/// clean. Returns the log path when written.
pub fn write_failures(
    session_dir: &Path,
    rows: &[ResultRow],
) -> Result<Option<PathBuf>, StorageError> {
    let failed: Vec<&ResultRow> = rows
        .iter()
        .filter(|row| row.status == JobStatus::Failed)
        .collect();

    if failed.is_empty() {
        return Ok(None);
    }

    let path = session_dir.join("failed.log");
    let mut contents = String::new();
    for row in failed {
        let _ = writeln!(
            contents,
            "{} :: {}",
            row.original_path.display(),
            row.error.as_deref().unwrap_or("unknown error")
        );
    }

    std::fs::write(&path, contents).map_err(|e| StorageError::WriteReport {
        path: path.clone(),
        source: e,
    })?;

    Ok(Some(path))
}

fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => &filename[..dot_pos],
        _ => filename,
    }
}
