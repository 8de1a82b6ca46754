use crate::broadcast::job_progress::{JobPhase, JobProgressTracker};

/// Reports worker-side activity for one job. Decouples the pipeline from
/// the broadcast transport so tests run without a channel.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase: JobPhase, message: &str);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _phase: JobPhase, _message: &str) {}
}

/// Bridges pipeline phase updates onto the batch event channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: JobProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, phase: JobPhase, message: &str) {
        self.tracker.phase(phase, message);
    }
}
