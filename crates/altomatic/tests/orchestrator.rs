//! End-to-end batch runs against stub providers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use altomatic::broadcast::{BatchEvent, JobStatus};
use altomatic::config::schema::{
    Config, OutputSettings, ProviderKind, ProviderSettings, RetrySettings,
};
use altomatic::provider::{Analysis, AnalysisRequest, ProviderError, VisionProvider};
use altomatic::session::{BatchOrchestrator, CancelToken};
use altomatic::JobProgressBroadcaster;
use tempfile::TempDir;

fn test_config(output_dir: &Path, workers: usize) -> Config {
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
        batch: altomatic::config::schema::BatchSettings {
            worker_count: workers,
            ..Default::default()
        },
        ocr: Default::default(),
        retry: RetrySettings {
            max_rate_limit_retries: 3,
            max_network_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 20,
            jitter: false,
        },
        output: OutputSettings {
            directory: Some(output_dir.to_path_buf()),
            write_summary: true,
        },
        prompts: Default::default(),
    }
}

fn write_image(dir: &Path, name: &str) -> PathBuf {
    let img = image::RgbImage::from_pixel(6, 6, image::Rgb([10u8, 20, 30]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn analysis(title: &str) -> Analysis {
    Analysis {
        title: title.to_string(),
        alt_text: format!("Alt text for {}.", title),
        prompt_tokens: 100,
        completion_tokens: 20,
    }
}

fn orchestrator(
    config: Config,
    provider: Arc<dyn VisionProvider>,
) -> (BatchOrchestrator, CancelToken) {
    let cancel = CancelToken::new();
    let orchestrator = BatchOrchestrator::new(
        config,
        provider,
        JobProgressBroadcaster::default(),
        cancel.clone(),
    );
    (orchestrator, cancel)
}

/// Always succeeds with a fixed title.
struct FixedTitleProvider {
    title: String,
    calls: AtomicUsize,
}

impl FixedTitleProvider {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl VisionProvider for FixedTitleProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(analysis(&self.title))
    }
}

/// Fails the first `failures` calls with the produced error, then succeeds.
struct FailNProvider<F: Fn() -> ProviderError + Send + Sync> {
    failures: usize,
    make_error: F,
    calls: AtomicUsize,
}

impl<F: Fn() -> ProviderError + Send + Sync> VisionProvider for FailNProvider<F> {
    fn name(&self) -> &'static str {
        "fail-n"
    }

    fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err((self.make_error)())
        } else {
            Ok(analysis("recovered title"))
        }
    }
}

#[test]
fn single_file_gets_slugged_filename() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "cat.jpg");

    let provider = Arc::new(FixedTitleProvider::new(
        "A fluffy orange cat sitting on a windowsill",
    ));
    let (orchestrator, _) = orchestrator(test_config(&output, 2), provider);
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.succeeded, 1);
    assert_eq!(report.totals.failed, 0);

    let row = &report.rows[0];
    assert_eq!(row.status, JobStatus::Succeeded);
    assert_eq!(
        row.new_filename.as_deref(),
        Some("a-fluffy-orange-cat-sitting-on-a-windowsill.jpg")
    );
    let new_path = row.new_path.as_ref().unwrap();
    assert!(new_path.exists());
    assert!(!input.join("cat.jpg").exists());

    // Summary file records the rename.
    let summary = std::fs::read_to_string(report.summary_path.as_ref().unwrap()).unwrap();
    assert!(summary.contains("[Original: cat.jpg]"));
    assert!(summary.contains("Name: a-fluffy-orange-cat-sitting-on-a-windowsill"));
    assert!(report.failed_log_path.is_none());
}

#[test]
fn duplicate_titles_get_numeric_suffix() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "one.jpg");
    write_image(&input, "two.jpg");

    let provider = Arc::new(FixedTitleProvider::new("sunset beach"));
    let (orchestrator, _) = orchestrator(test_config(&output, 2), provider);
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.succeeded, 2);

    let mut names: Vec<String> = report
        .rows
        .iter()
        .map(|r| r.new_filename.clone().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["sunset-beach-2.jpg", "sunset-beach.jpg"]);

    for row in &report.rows {
        assert!(row.new_path.as_ref().unwrap().exists());
    }
}

#[test]
fn network_errors_beyond_cap_end_failed_terminal() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "pic.jpg");

    let provider = Arc::new(FailNProvider {
        failures: usize::MAX,
        make_error: || ProviderError::Network("connection reset".to_string()),
        calls: AtomicUsize::new(0),
    });
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider.clone());
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.failed, 1);
    assert_eq!(report.rows[0].status, JobStatus::Failed);
    assert!(report.rows[0].error.as_ref().unwrap().contains("network"));
    // Initial attempt + max_network_retries.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let failed_log = std::fs::read_to_string(report.failed_log_path.as_ref().unwrap()).unwrap();
    assert!(failed_log.contains("pic.jpg"));
}

#[test]
fn rate_limit_recovers_after_retry() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "pic.jpg");

    let provider = Arc::new(FailNProvider {
        failures: 1,
        make_error: || ProviderError::RateLimited {
            retry_after: Some(Duration::from_millis(30)),
        },
        calls: AtomicUsize::new(0),
    });
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider.clone());
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.succeeded, 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        report.rows[0].new_filename.as_deref(),
        Some("recovered-title.jpg")
    );
}

#[test]
fn client_error_is_terminal_without_retry() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "pic.jpg");

    let provider = Arc::new(FailNProvider {
        failures: usize::MAX,
        make_error: || ProviderError::Http {
            status: 400,
            message: "image too large".to_string(),
        },
        calls: AtomicUsize::new(0),
    });
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider.clone());
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.failed, 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_response_is_terminal_without_retry() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "pic.jpg");

    let provider = Arc::new(FailNProvider {
        failures: usize::MAX,
        make_error: || ProviderError::MalformedResponse("no 'alt' field".to_string()),
        calls: AtomicUsize::new(0),
    });
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider.clone());
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.rows[0].status, JobStatus::Failed);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

/// Cancels the batch from inside the second provider call.
struct CancelOnSecondCall {
    cancel: CancelToken,
    calls: AtomicUsize,
}

impl VisionProvider for CancelOnSecondCall {
    fn name(&self) -> &'static str {
        "cancel-trigger"
    }

    fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 1 {
            self.cancel.cancel();
        }
        // Give the orchestrator time to observe the flag while this job is
        // still in flight.
        std::thread::sleep(Duration::from_millis(20));
        Ok(analysis(&format!("photo number {}", call + 1)))
    }
}

#[test]
fn cancellation_marks_pending_jobs_cancelled() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    for i in 0..5 {
        write_image(&input, &format!("img{}.jpg", i));
    }

    let cancel = CancelToken::new();
    let provider = Arc::new(CancelOnSecondCall {
        cancel: cancel.clone(),
        calls: AtomicUsize::new(0),
    });

    let orchestrator = BatchOrchestrator::new(
        test_config(&output, 1),
        provider,
        JobProgressBroadcaster::default(),
        cancel,
    );
    let report = orchestrator.run(&input).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.totals.succeeded, 2);
    assert_eq!(report.totals.cancelled, 3);
    assert_eq!(report.totals.failed, 0);
    assert_eq!(
        report
            .rows
            .iter()
            .filter(|r| r.status == JobStatus::Cancelled)
            .count(),
        3
    );
}

#[test]
fn empty_title_falls_back_to_sequence_name() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "pic.jpg");

    let provider = Arc::new(FixedTitleProvider::new("???"));
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider);
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.succeeded, 1);
    assert_eq!(report.rows[0].new_filename.as_deref(), Some("image-1.jpg"));
}

/// Deletes the source file during analysis so the rename must fail. The
/// pipeline has already encoded the image by the time the provider runs.
struct SourceStealingProvider {
    path: PathBuf,
}

impl VisionProvider for SourceStealingProvider {
    fn name(&self) -> &'static str {
        "stealer"
    }

    fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let _ = std::fs::remove_file(&self.path);
        Ok(analysis("vanished file"))
    }
}

#[test]
fn rename_failure_keeps_succeeded_status() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    let path = write_image(&input, "pic.jpg");

    let (orchestrator, _) = orchestrator(
        test_config(&output, 1),
        Arc::new(SourceStealingProvider { path }),
    );
    let report = orchestrator.run(&input).unwrap();

    let row = &report.rows[0];
    assert_eq!(row.status, JobStatus::Succeeded);
    assert!(row.rename_error.is_some());
    assert!(row.alt_text.is_some());
    assert_eq!(report.totals.succeeded, 1);
}

#[test]
fn empty_input_folder_yields_empty_report() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();

    let provider = Arc::new(FixedTitleProvider::new("unused"));
    let (orchestrator, _) = orchestrator(test_config(&output, 1), provider.clone());
    let report = orchestrator.run(&input).unwrap();

    assert_eq!(report.totals.total, 0);
    assert!(report.rows.is_empty());
    assert!(report.session_dir.is_none());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn token_totals_accumulate_across_jobs() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "a.jpg");
    write_image(&input, "b.jpg");
    write_image(&input, "c.jpg");

    let provider = Arc::new(FixedTitleProvider::new("some photo"));
    let (orchestrator, _) = orchestrator(test_config(&output, 2), provider);
    let report = orchestrator.run(&input).unwrap();

    // 3 jobs x (100 prompt + 20 completion) from the stub.
    assert_eq!(report.totals.prompt_tokens, 300);
    assert_eq!(report.totals.completion_tokens, 60);
    assert_eq!(report.totals.total_tokens(), 360);
}

#[test]
fn progress_events_reach_terminal_state_with_monotonic_totals() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "a.jpg");
    write_image(&input, "b.jpg");

    let broadcaster = JobProgressBroadcaster::default();
    let mut rx = broadcaster.subscribe();
    let cancel = CancelToken::new();
    let orchestrator = BatchOrchestrator::new(
        test_config(&output, 2),
        Arc::new(FixedTitleProvider::new("two photos")),
        broadcaster,
        cancel,
    );
    let report = orchestrator.run(&input).unwrap();
    assert_eq!(report.totals.succeeded, 2);

    let mut last_completed = 0usize;
    let mut saw_summary = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            BatchEvent::Job(event) => {
                if let Some(totals) = event.totals {
                    assert!(totals.completed() >= last_completed);
                    last_completed = totals.completed();
                }
            }
            BatchEvent::Summary(summary) => {
                saw_summary = true;
                assert_eq!(summary.totals.succeeded, 2);
            }
        }
    }
    assert!(saw_summary);
    assert_eq!(last_completed, 2);
}
