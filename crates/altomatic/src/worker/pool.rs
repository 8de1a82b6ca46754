use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};
use tokio::sync::broadcast;

use crate::broadcast::job_progress::{BatchEvent, JobPhase, JobProgressTracker};
use crate::pipeline::{BroadcastProgress, NoopProgress, Pipeline, PipelineConfig, ProgressReporter};
use crate::provider::VisionProvider;
use crate::worker::job::{AttemptOutcome, Job};

pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<AttemptOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        config: Arc<PipelineConfig>,
        provider: Arc<dyn VisionProvider>,
        worker_count: usize,
    ) -> Self {
        Self::with_progress_sender(config, provider, worker_count, None)
    }

    /// Creates a worker pool, optionally wired to a batch event channel for
    /// worker-side phase updates.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn with_progress_sender(
        config: Arc<PipelineConfig>,
        provider: Arc<dyn VisionProvider>,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<BatchEvent>>>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<AttemptOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let worker_provider = Arc::clone(&provider);
            let sender = progress_sender.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    job_rx,
                    result_tx,
                    shutdown_flag,
                    worker_config,
                    worker_provider,
                    sender,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: Job) -> Result<(), crate::error::WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(crate::error::WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| crate::error::WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<AttemptOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<AttemptOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<AttemptOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<AttemptOutcome>,
    shutdown: Arc<AtomicBool>,
    config: Arc<PipelineConfig>,
    provider: Arc<dyn VisionProvider>,
    progress_sender: Option<Arc<broadcast::Sender<BatchEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    let pipeline = Pipeline::from_config(&config, provider);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!(
                    "Worker {} processing job {} (attempt {})",
                    worker_id, job.id, job.attempt
                );

                let reporter: Box<dyn ProgressReporter> = match &progress_sender {
                    Some(sender) => {
                        let tracker =
                            JobProgressTracker::new(&job.id, &job.filename(), Arc::clone(sender));
                        if job.attempt == 0 {
                            tracker.phase(JobPhase::Queued, "Job picked up by worker");
                        }
                        Box::new(BroadcastProgress::new(tracker))
                    }
                    None => Box::new(NoopProgress),
                };

                let outcome = pipeline.run(&job, reporter.as_ref());
                let result = AttemptOutcome {
                    job_id: job.id,
                    attempt: job.attempt,
                    outcome,
                };

                if result_sender.send(result).is_err() {
                    error!("Worker {} failed to send result", worker_id);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
