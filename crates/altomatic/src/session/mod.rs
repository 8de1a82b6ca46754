//! Batch session state and orchestration.

pub mod backoff;
pub mod orchestrator;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::job_progress::{BatchTotals, JobStatus};

pub use backoff::{RetryClass, RetryPolicy, RetryQueue};
pub use orchestrator::BatchOrchestrator;

/// Cooperative cancellation signal. Cancelling stops new dispatches and
/// retry waits; in-flight requests run to completion.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One row of the results table shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub job_id: String,
    pub original_path: PathBuf,
    pub original_filename: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// The analysis succeeded but the file could not be moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRow {
    pub(crate) fn new(job_id: &str, original_path: &std::path::Path) -> Self {
        Self {
            job_id: job_id.to_string(),
            original_path: original_path.to_path_buf(),
            original_filename: original_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            status: JobStatus::Pending,
            title: None,
            new_filename: None,
            new_path: None,
            alt_text: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            rename_error: None,
            error: None,
        }
    }
}

/// Everything a caller learns about a finished batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub rows: Vec<ResultRow>,
    pub totals: BatchTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_log_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}
