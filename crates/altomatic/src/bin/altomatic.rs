//! Headless CLI driver for the Altomatic engine.
//!
//! Stands in for a desktop shell: loads the config, applies flag overrides,
//! streams progress to stderr and prints the results table to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::info;
use tokio::sync::broadcast::error::TryRecvError;

use altomatic::broadcast::{BatchEvent, JobStatus};
use altomatic::config::{load_config, Config};
use altomatic::provider::build_provider;
use altomatic::session::{BatchOrchestrator, CancelToken};
use altomatic::JobProgressBroadcaster;

#[derive(Parser)]
#[command(name = "altomatic", version, about = "AI-powered image renaming and alt text")]
struct Cli {
    /// Image file or folder to process
    input: PathBuf,

    /// Path to the JSON config file
    #[arg(short, long, default_value = "altomatic.json")]
    config: PathBuf,

    /// Output root directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker count (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Recurse into subdirectories
    #[arg(long)]
    recursive: bool,

    /// Enable the OCR pass
    #[arg(long)]
    ocr: bool,

    /// Extra context handed to the model
    #[arg(long)]
    context: Option<String>,

    /// Prompt template key (default, concise, product, or a config key)
    #[arg(long)]
    prompt: Option<String>,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> altomatic::Result<usize> {
    let mut config = load_config(&cli.config)?;
    apply_overrides(&mut config, &cli);

    let provider = build_provider(&config.provider)?;
    info!(
        "Using {} model '{}'",
        config.provider.kind.label(),
        config.provider.model
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nCancellation requested, letting running jobs finish...");
        handler_token.cancel();
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let broadcaster = JobProgressBroadcaster::default();
    let printer = spawn_event_printer(&broadcaster);

    let orchestrator = BatchOrchestrator::new(config, provider, broadcaster, cancel);
    let report = orchestrator.run(&cli.input)?;

    // Dropping the orchestrator releases the last event sender so the
    // printer sees the channel close.
    drop(orchestrator);
    let _ = printer.join();

    for row in &report.rows {
        match row.status {
            JobStatus::Succeeded => println!(
                "{} -> {}  ({})",
                row.original_filename,
                row.new_filename.as_deref().unwrap_or("-"),
                row.alt_text.as_deref().unwrap_or("")
            ),
            _ => println!(
                "{} [{:?}] {}",
                row.original_filename,
                row.status,
                row.error.as_deref().unwrap_or("")
            ),
        }
    }

    if let Some(summary) = &report.summary_path {
        println!("Summary: {}", summary.display());
    }
    println!(
        "Done: {} succeeded, {} failed, {} cancelled, {} tokens",
        report.totals.succeeded,
        report.totals.failed,
        report.totals.cancelled,
        report.totals.total_tokens()
    );

    Ok(report.totals.failed)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(output) = &cli.output {
        config.output.directory = Some(output.clone());
    }
    if let Some(workers) = cli.workers {
        config.batch.worker_count = workers.clamp(1, 16);
    }
    if cli.recursive {
        config.batch.include_subdirectories = true;
    }
    if cli.ocr {
        config.ocr.enabled = true;
    }
    if let Some(context) = &cli.context {
        config.batch.context = Some(context.clone());
    }
    if let Some(prompt) = &cli.prompt {
        config.batch.prompt = prompt.clone();
    }
}

fn spawn_event_printer(broadcaster: &JobProgressBroadcaster) -> std::thread::JoinHandle<()> {
    let mut rx = broadcaster.subscribe();
    std::thread::spawn(move || loop {
        match rx.try_recv() {
            Ok(BatchEvent::Job(event)) => {
                let progress = event
                    .totals
                    .map(|t| format!(" [{}/{}]", t.completed(), t.total))
                    .unwrap_or_default();
                eprintln!("{}{}: {}", event.filename, progress, event.message);
            }
            Ok(BatchEvent::Summary(summary)) => {
                eprintln!(
                    "Batch finished: {} ok, {} failed, {} cancelled",
                    summary.totals.succeeded, summary.totals.failed, summary.totals.cancelled
                );
            }
            Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_millis(50)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => break,
        }
    })
}

fn init_tracing() {
    let _ = tracing_log::LogTracer::init();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
