//! Drives one batch run from input paths to a finished session.
//!
//! Single-writer design: workers only ever return attempt outcomes over a
//! channel; every job state change, counter update and filesystem rename
//! happens on the thread running [`BatchOrchestrator::run`]. That makes the
//! session-unique-filename invariant and the monotonic totals free of
//! locking.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};

use crate::broadcast::job_progress::{
    BatchEvent, BatchSummary, BatchTotals, JobPhase, JobProgressBroadcaster, JobProgressEvent,
    JobStatus,
};
use crate::config::schema::Config;
use crate::error::Result;
use crate::pipeline::PipelineConfig;
use crate::provider::VisionProvider;
use crate::slug::{fallback_stem, slugify, SlugAllocator};
use crate::storage::{write_failures, write_summary, ResultSink};
use crate::worker::job::{AttemptOutcome, Job, JobOptions};
use crate::worker::scanner::expand_input;
use crate::worker::WorkerPool;

use super::backoff::{RetryClass, RetryPolicy, RetryQueue};
use super::{CancelToken, ResultRow, SessionReport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct JobRecord {
    job: Job,
    status: JobStatus,
    rate_limit_retries: u32,
    network_retries: u32,
    row: ResultRow,
}

impl JobRecord {
    fn new(job: Job) -> Self {
        let row = ResultRow::new(&job.id, &job.source_path);
        Self {
            job,
            status: JobStatus::Pending,
            rate_limit_retries: 0,
            network_retries: 0,
            row,
        }
    }

    fn retries_used(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::RateLimit => self.rate_limit_retries,
            RetryClass::Network => self.network_retries,
        }
    }

    fn bump_retries(&mut self, class: RetryClass) {
        match class {
            RetryClass::RateLimit => self.rate_limit_retries += 1,
            RetryClass::Network => self.network_retries += 1,
        }
    }

    fn retries_total(&self) -> u32 {
        self.rate_limit_retries + self.network_retries
    }
}

pub struct BatchOrchestrator {
    config: Config,
    provider: Arc<dyn VisionProvider>,
    broadcaster: JobProgressBroadcaster,
    cancel: CancelToken,
    policy: RetryPolicy,
}

impl BatchOrchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn VisionProvider>,
        broadcaster: JobProgressBroadcaster,
        cancel: CancelToken,
    ) -> Self {
        let policy = RetryPolicy::from_settings(&config.retry);
        Self {
            config,
            provider,
            broadcaster,
            cancel,
            policy,
        }
    }

    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }

    /// Expands `input` (file or folder) and processes everything found.
    pub fn run(&self, input: &Path) -> Result<SessionReport> {
        let paths = expand_input(input, self.config.batch.include_subdirectories)?;
        let output_root = resolve_output_root(&self.config, input);
        self.run_paths(paths, &output_root)
    }

    /// Processes an explicit list of image paths.
    pub fn run_paths(&self, paths: Vec<PathBuf>, output_root: &Path) -> Result<SessionReport> {
        let started_at = Utc::now();
        let mut totals = BatchTotals {
            total: paths.len(),
            ..Default::default()
        };

        if paths.is_empty() {
            warn!("No valid image files found");
            return Ok(self.finish(Vec::new(), totals, None, None, None, started_at));
        }

        let sink = ResultSink::create(output_root)?;
        info!("Session folder: {}", sink.session_dir().display());

        let options = JobOptions::from_config(&self.config);
        let mut records: Vec<JobRecord> = paths
            .into_iter()
            .map(|path| JobRecord::new(Job::new(path, options.clone())))
            .collect();
        let index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.job.id.clone(), i))
            .collect();

        for record in &records {
            self.emit(record, JobPhase::Queued, "Queued", totals);
        }

        let pipeline_config = Arc::new(PipelineConfig::from_config(&self.config));
        let pool = WorkerPool::with_progress_sender(
            pipeline_config,
            Arc::clone(&self.provider),
            self.config.batch.worker_count,
            Some(self.broadcaster.sender()),
        );

        let mut pending: VecDeque<usize> = (0..records.len()).collect();
        let mut retry_queue = RetryQueue::new();
        let mut allocator = SlugAllocator::new();
        let mut in_flight = 0usize;
        let mut cancel_drained = false;

        loop {
            let now = Instant::now();

            if self.cancel.is_cancelled() && !cancel_drained {
                for idx in pending.drain(..) {
                    self.cancel_record(&mut records[idx], &mut totals);
                }
                for job in retry_queue.drain() {
                    let idx = index[&job.id];
                    self.cancel_record(&mut records[idx], &mut totals);
                }
                cancel_drained = true;
            }

            // Retries whose delay has elapsed jump the queue.
            while let Some(job) = retry_queue.pop_due(now) {
                pending.push_front(index[&job.id]);
            }

            while in_flight < self.config.batch.worker_count {
                let Some(idx) = pending.pop_front() else { break };
                let record = &mut records[idx];
                record.status = JobStatus::Running;

                let (phase, message) = if record.job.attempt == 0 {
                    (JobPhase::Queued, "Dispatched to worker".to_string())
                } else {
                    (
                        JobPhase::Retrying,
                        format!("Redispatched (attempt {})", record.job.attempt + 1),
                    )
                };
                self.emit(&records[idx], phase, &message, totals);

                pool.submit(records[idx].job.clone())?;
                in_flight += 1;
            }

            if in_flight == 0 && pending.is_empty() && retry_queue.is_empty() {
                break;
            }

            if let Some(outcome) = pool.recv_result_timeout(POLL_INTERVAL) {
                in_flight -= 1;
                let idx = index[&outcome.job_id];
                self.apply_outcome(
                    outcome,
                    &mut records[idx],
                    idx + 1,
                    &mut totals,
                    &mut allocator,
                    &sink,
                    &mut retry_queue,
                );
            }
        }

        pool.shutdown();
        pool.wait();

        let rows: Vec<ResultRow> = records.into_iter().map(|r| r.row).collect();

        let mut summary_path = None;
        let mut failed_log_path = None;
        if self.config.output.write_summary {
            match write_summary(sink.session_dir(), &rows) {
                Ok(path) => summary_path = Some(path),
                Err(e) => warn!("Failed to write summary: {}", e),
            }
            match write_failures(sink.session_dir(), &rows) {
                Ok(path) => failed_log_path = path,
                Err(e) => warn!("Failed to write failure log: {}", e),
            }
        }

        info!(
            "Processed {} image(s). Session folder: {} | Token usage this run: {}",
            totals.total,
            sink.session_dir().display(),
            totals.total_tokens()
        );

        Ok(self.finish(
            rows,
            totals,
            Some(sink.session_dir().to_path_buf()),
            summary_path,
            failed_log_path,
            started_at,
        ))
    }

    fn apply_outcome(
        &self,
        outcome: AttemptOutcome,
        record: &mut JobRecord,
        job_number: usize,
        totals: &mut BatchTotals,
        allocator: &mut SlugAllocator,
        sink: &ResultSink,
        retry_queue: &mut RetryQueue,
    ) {
        match outcome.outcome {
            Ok(analysis) => {
                totals.prompt_tokens += analysis.prompt_tokens;
                totals.completion_tokens += analysis.completion_tokens;

                let stem = slugify(&analysis.title)
                    .unwrap_or_else(|_| fallback_stem(job_number));
                let stem = allocator.claim(&stem);
                let filename = match record
                    .job
                    .source_path
                    .extension()
                    .and_then(|e| e.to_str())
                {
                    Some(ext) => format!("{}.{}", stem, ext.to_ascii_lowercase()),
                    None => stem,
                };

                record.row.title = Some(analysis.title);
                record.row.alt_text = Some(analysis.alt_text);
                record.row.prompt_tokens = analysis.prompt_tokens;
                record.row.completion_tokens = analysis.completion_tokens;

                match sink.place(&record.job.source_path, &filename) {
                    Ok(path) => {
                        record.row.new_filename = path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string());
                        record.row.new_path = Some(path);
                    }
                    Err(e) => {
                        // The analysis stands even though the move failed.
                        warn!(
                            "Rename failed for {}: {}",
                            record.job.source_path.display(),
                            e
                        );
                        record.row.new_filename = Some(filename);
                        record.row.rename_error = Some(e.to_string());
                    }
                }

                record.status = JobStatus::Succeeded;
                record.row.status = JobStatus::Succeeded;
                totals.succeeded += 1;
                self.emit(record, JobPhase::Completed, "Processing completed", *totals);
            }
            Err(error) => {
                let class = self.policy.classify(&error);
                let can_retry = class
                    .map(|c| record.retries_used(c) < self.policy.max_retries(c))
                    .unwrap_or(false);

                if can_retry && self.cancel.is_cancelled() {
                    // Cancellation is checked between retry attempts: the
                    // job is abandoned rather than re-queued.
                    record.row.error = Some(error.to_string());
                    self.cancel_record(record, totals);
                } else if can_retry {
                    let class = class.expect("can_retry implies a retry class");
                    let used = record.retries_used(class);
                    record.bump_retries(class);

                    let delay = self
                        .policy
                        .delay(used, RetryPolicy::retry_after_hint(&error));
                    record.job = record.job.next_attempt();
                    retry_queue.push(record.job.clone(), Instant::now() + delay);

                    record.status = JobStatus::Running;
                    self.emit(
                        record,
                        JobPhase::Retrying,
                        &format!(
                            "{}; retrying in {:.1}s (retry {} of {})",
                            error,
                            delay.as_secs_f64(),
                            record.retries_used(class),
                            self.policy.max_retries(class)
                        ),
                        *totals,
                    );
                } else {
                    record.status = JobStatus::Failed;
                    record.row.status = JobStatus::Failed;
                    record.row.error = Some(error.to_string());
                    totals.failed += 1;
                    warn!(
                        "FAIL: {} :: {}",
                        record.job.source_path.display(),
                        error
                    );
                    self.emit(record, JobPhase::Failed, "Processing failed", *totals);
                }
            }
        }
    }

    fn cancel_record(&self, record: &mut JobRecord, totals: &mut BatchTotals) {
        record.status = JobStatus::Cancelled;
        record.row.status = JobStatus::Cancelled;
        totals.cancelled += 1;
        self.emit(record, JobPhase::Cancelled, "Cancelled", *totals);
    }

    fn emit(&self, record: &JobRecord, phase: JobPhase, message: &str, totals: BatchTotals) {
        let mut event = JobProgressEvent::transition(
            &record.job.id,
            &record.job.filename(),
            record.status,
            phase,
            message,
            record.retries_total(),
            totals,
        );

        if record.status == JobStatus::Succeeded {
            if let (Some(name), Some(alt)) =
                (record.row.new_filename.as_deref(), record.row.alt_text.as_deref())
            {
                event = event.with_result(name, alt);
            }
        }
        if let Some(error) = record.row.error.as_deref() {
            event = event.with_error(error);
        }

        self.broadcaster.send(BatchEvent::Job(event));
    }

    fn finish(
        &self,
        rows: Vec<ResultRow>,
        totals: BatchTotals,
        session_dir: Option<PathBuf>,
        summary_path: Option<PathBuf>,
        failed_log_path: Option<PathBuf>,
        started_at: chrono::DateTime<Utc>,
    ) -> SessionReport {
        let finished_at = Utc::now();
        let cancelled = self.cancel.is_cancelled();

        self.broadcaster.send(BatchEvent::Summary(BatchSummary {
            totals,
            session_dir: session_dir.as_ref().map(|p| p.display().to_string()),
            started_at,
            finished_at,
            cancelled,
        }));

        SessionReport {
            rows,
            totals,
            session_dir,
            summary_path,
            failed_log_path,
            started_at,
            finished_at,
            cancelled,
        }
    }
}

/// Sessions land in the configured output root, or next to the input when
/// none is configured.
fn resolve_output_root(config: &Config, input: &Path) -> PathBuf {
    if let Some(dir) = &config.output.directory {
        return dir.clone();
    }

    if input.is_file() {
        input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        input.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{OutputSettings, ProviderKind, ProviderSettings};
    use tempfile::TempDir;

    fn config_with_output(directory: Option<PathBuf>) -> Config {
        Config {
            version: "1.0".to_string(),
            provider: ProviderSettings {
                kind: ProviderKind::OpenAi,
                model: "gpt-5-nano".to_string(),
                api_key: Some("sk-test".to_string()),
                api_key_file: None,
                api_key_env: None,
                base_url: None,
                proxy: None,
            },
            batch: Default::default(),
            ocr: Default::default(),
            retry: Default::default(),
            output: OutputSettings {
                directory,
                write_summary: true,
            },
            prompts: Default::default(),
        }
    }

    #[test]
    fn test_output_root_prefers_configured_directory() {
        let config = config_with_output(Some(PathBuf::from("/srv/renamed")));
        let root = resolve_output_root(&config, Path::new("/photos"));
        assert_eq!(root, PathBuf::from("/srv/renamed"));
    }

    #[test]
    fn test_output_root_for_file_input_is_parent() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("pic.jpg");
        std::fs::write(&file, b"x").unwrap();

        let config = config_with_output(None);
        assert_eq!(resolve_output_root(&config, &file), tmp.path());
    }

    #[test]
    fn test_output_root_for_folder_input_is_folder() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_output(None);
        assert_eq!(resolve_output_root(&config, tmp.path()), tmp.path());
    }
}
