//! Batch progress broadcasting for UI consumers.
//!
//! The orchestrator is the only writer of status transitions; workers only
//! contribute intermediate phase updates. Both ride the same broadcast
//! channel, so a subscriber sees transitions in the order they occurred.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Fine-grained activity within a job, mostly for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Preprocessing,
    Ocr,
    Analyzing,
    Retrying,
    Renaming,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Preprocessing => write!(f, "Preprocessing"),
            JobPhase::Ocr => write!(f, "Running OCR"),
            JobPhase::Analyzing => write!(f, "Analyzing"),
            JobPhase::Retrying => write!(f, "Waiting to retry"),
            JobPhase::Renaming => write!(f, "Renaming"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
            JobPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Lifecycle state of a job. Succeeded, Failed and Cancelled are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Running counters for a session. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchTotals {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl BatchTotals {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    /// Original filename being processed.
    pub filename: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub message: String,
    /// Retries consumed so far (all classes combined).
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session counters. Present on status transitions, absent on
    /// worker-side phase updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<BatchTotals>,
}

impl JobProgressEvent {
    /// Worker-side phase update; carries no counters.
    pub fn phase(job_id: &str, filename: &str, phase: JobPhase, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            status: JobStatus::Running,
            phase,
            message: message.to_string(),
            retries: 0,
            timestamp: Utc::now(),
            new_filename: None,
            alt_text: None,
            error: None,
            totals: None,
        }
    }

    /// Orchestrator-side status transition with a totals snapshot.
    pub fn transition(
        job_id: &str,
        filename: &str,
        status: JobStatus,
        phase: JobPhase,
        message: &str,
        retries: u32,
        totals: BatchTotals,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            status,
            phase,
            message: message.to_string(),
            retries,
            timestamp: Utc::now(),
            new_filename: None,
            alt_text: None,
            error: None,
            totals: Some(totals),
        }
    }

    pub fn with_result(mut self, new_filename: &str, alt_text: &str) -> Self {
        self.new_filename = Some(new_filename.to_string());
        self.alt_text = Some(alt_text.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Final event of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub totals: BatchTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Job(JobProgressEvent),
    Summary(BatchSummary),
}

/// Broadcasts batch events for streaming to a UI or log consumer.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<BatchEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers. No active receivers is fine.
    pub fn send(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn sender(&self) -> Arc<broadcast::Sender<BatchEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Worker-side handle for emitting phase updates for one job.
pub struct JobProgressTracker {
    job_id: String,
    filename: String,
    sender: Arc<broadcast::Sender<BatchEvent>>,
}

impl JobProgressTracker {
    pub fn new(job_id: &str, filename: &str, sender: Arc<broadcast::Sender<BatchEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            sender,
        }
    }

    pub fn phase(&self, phase: JobPhase, message: &str) {
        let event = JobProgressEvent::phase(&self.job_id, &self.filename, phase, message);
        let _ = self.sender.send(BatchEvent::Job(event));
    }
}
