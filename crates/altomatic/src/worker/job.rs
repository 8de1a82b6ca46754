use std::path::{Path, PathBuf};

use crate::config::schema::{Config, DetailLevel, VisionDetail};
use crate::pipeline::error::AttemptError;
use crate::provider::Analysis;

/// Per-job knobs. Seeded from the batch config; a shell may override
/// individual jobs before submission.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub filename_language: String,
    pub alttext_language: String,
    pub detail_level: DetailLevel,
    pub vision_detail: VisionDetail,
    pub ocr_enabled: bool,
    pub context: Option<String>,
    pub prompt_key: String,
}

impl JobOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            filename_language: config.batch.filename_language.clone(),
            alttext_language: config.batch.alttext_language.clone(),
            detail_level: config.batch.detail_level,
            vision_detail: config.batch.vision_detail,
            ocr_enabled: config.ocr.enabled,
            context: config.batch.context.clone(),
            prompt_key: config.batch.prompt.clone(),
        }
    }
}

/// One dispatchable unit of work: a single attempt at a single image.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source_path: PathBuf,
    pub mime_type: Option<String>,
    /// 0 for the first attempt, incremented on each redispatch.
    pub attempt: u32,
    pub options: JobOptions,
}

impl Job {
    pub fn new(source_path: PathBuf, options: JobOptions) -> Self {
        let mime_type = Self::detect_mime_type(&source_path);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_path,
            mime_type,
            attempt: 0,
            options,
        }
    }

    /// Clone for redispatch after a retryable failure.
    pub fn next_attempt(&self) -> Self {
        let mut job = self.clone();
        job.attempt += 1;
        job
    }

    pub fn filename(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn detect_mime_type(path: &Path) -> Option<String> {
        let mime = crate::processor::mime_for_path(path);
        if mime == "application/octet-stream" {
            None
        } else {
            Some(mime)
        }
    }
}

/// What a worker hands back to the orchestrator for one attempt.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub job_id: String,
    pub attempt: u32,
    pub outcome: Result<Analysis, AttemptError>,
}
