//! mediacast-send - Publish media jobs through the dispatch worker
//!
//! Reads job specs as JSON, queues them, and drains the queue with the
//! configured concurrency cap and retry policy.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use libmediacast::logging;
use libmediacast::publisher::DryRunPublisher;
use libmediacast::queue::JobQueue;
use libmediacast::worker::AttemptOutcome;
use libmediacast::{
    Config, Dispatcher, Job, JobStatus, MediacastError, NewJob, PublisherRegistry, Result,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mediacast-send")]
#[command(version)]
#[command(about = "Publish media jobs through the Mediacast queue")]
#[command(long_about = "\
mediacast-send - Publish media jobs through the Mediacast queue

DESCRIPTION:
    mediacast-send reads publishing job specs, queues them by priority and
    hands them to the dispatch worker. At most `max_concurrent` jobs are
    published at once. A failed attempt is retried at a lower priority until
    the job's max_retries is reached.

    No platform credentials are handled here: jobs are published through a
    dry-run publisher that logs each payload and reports success.

INPUT:
    A JSON array of job specs, or one job spec per line (JSON Lines).
    Read from --jobs FILE, or from stdin when --jobs is omitted or '-'.

    {\"platform\": \"tiktok\", \"payload\": {\"video\": \"clip.mp4\"}, \"priority\": 8}

    Fields: platform (facebook|instagram|tiktok|youtube), payload (any JSON),
    priority (1-10, optional), max_retries (optional), metadata (optional).

USAGE:
    # Publish jobs from a file
    mediacast-send --jobs jobs.json

    # Pipe jobs in and get machine-readable results
    cat jobs.jsonl | mediacast-send --format json

    # Keep running and publish jobs as they arrive on stdin
    producer | mediacast-send --daemon

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown in --daemon mode (finishes in-flight publishes)

CONFIGURATION:
    Configuration file: ~/.config/mediacast/config.toml
    Override with MEDIACAST_CONFIG or --config.

    [queue]
    max_concurrent = 3
    default_priority = 5
    default_max_retries = 3

    [dispatch]
    publish_timeout = \"5m\"

EXIT CODES:
    0 - All jobs published
    1 - One or more jobs failed permanently
    2 - Configuration error
    3 - Invalid input (bad job spec, priority out of range)
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File with job specs ('-' for stdin)
    #[arg(short, long, value_name = "FILE")]
    #[arg(help = "Read job specs from FILE instead of stdin ('-' for stdin)")]
    jobs: Option<PathBuf>,

    /// Override queue.max_concurrent
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Override dispatch.publish_timeout (e.g. "30s", "5m")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Keep running, reading JSON Lines job specs from stdin
    #[arg(long)]
    #[arg(help = "Keep running until SIGINT/SIGTERM, reading job specs from stdin as they arrive")]
    daemon: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = MediacastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(MediacastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    jobs: &'a [Job],
    attempts: usize,
    stats: libmediacast::queue::QueueStats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let format: OutputFormat = cli.format.parse()?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default()?,
    };

    if let Some(concurrency) = cli.concurrency {
        if concurrency == 0 {
            return Err(MediacastError::InvalidInput(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        config.queue.max_concurrent = concurrency;
    }
    if cli.timeout.is_some() {
        config.dispatch.publish_timeout = cli.timeout;
    }

    let queue = Arc::new(JobQueue::new(config.queue.clone()));
    let publisher = Arc::new(PublisherRegistry::uniform(Arc::new(DryRunPublisher::default())));
    let dispatcher = Dispatcher::new(queue.clone(), publisher, config.dispatch.clone());

    let outcomes = if cli.daemon {
        if let Some(path) = cli.jobs.as_deref().filter(|p| !is_stdin(p)) {
            enqueue_all(&queue, parse_jobs(&read_file(path)?)?)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;

        let feeder = tokio::spawn(feed_stdin(queue.clone()));
        let outcomes = dispatcher.run(shutdown).await;
        feeder.abort();
        outcomes
    } else {
        let input = match cli.jobs.as_deref() {
            Some(path) if !is_stdin(path) => read_file(path)?,
            _ => read_stdin()?,
        };
        let jobs = parse_jobs(&input)?;
        if jobs.is_empty() {
            return Err(MediacastError::InvalidInput("no job specs provided".to_string()));
        }
        enqueue_all(&queue, jobs)?;
        dispatcher.run_until_idle().await
    };

    let jobs = queue.all_jobs();
    print_results(format, &jobs, &outcomes, &queue)?;

    let failed = jobs.iter().any(|j| j.status == JobStatus::Failed);
    Ok(if failed { 1 } else { 0 })
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        MediacastError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| MediacastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(input)
}

/// Accepts a JSON array of job specs or one spec per line.
fn parse_jobs(input: &str) -> Result<Vec<NewJob>> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| MediacastError::InvalidInput(format!("Invalid job specs: {}", e)));
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            parse_job_line(line).map_err(|e| {
                MediacastError::InvalidInput(format!("Invalid job spec on line {}: {}", n + 1, e))
            })
        })
        .collect()
}

fn parse_job_line(line: &str) -> std::result::Result<NewJob, serde_json::Error> {
    serde_json::from_str(line.trim())
}

fn enqueue_all(queue: &JobQueue, jobs: Vec<NewJob>) -> Result<()> {
    for job in jobs {
        queue.add_job(job)?;
    }
    Ok(())
}

/// Queue each JSON Lines spec from stdin as it arrives.
async fn feed_stdin(queue: Arc<JobQueue>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let queued = parse_job_line(&line)
                    .map_err(|e| MediacastError::InvalidInput(format!("Invalid job spec: {}", e)))
                    .and_then(|job| queue.add_job(job).map_err(MediacastError::from));
                if let Err(e) = queued {
                    warn!(error = %e, "skipping job spec");
                }
            }
            Ok(None) => {
                info!("stdin closed, no more job specs");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
}

fn print_results(
    format: OutputFormat,
    jobs: &[Job],
    outcomes: &[AttemptOutcome],
    queue: &JobQueue,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let report = Report {
                jobs,
                attempts: outcomes.len(),
                stats: queue.stats(),
            };
            let json = serde_json::to_string_pretty(&report).map_err(|e| {
                MediacastError::InvalidInput(format!("Failed to serialize results: {}", e))
            })?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for job in jobs {
                let receipt = outcomes
                    .iter()
                    .rev()
                    .find(|o| o.job.id == job.id)
                    .and_then(|o| o.receipt.as_ref());

                match (job.status, receipt) {
                    (JobStatus::Success, Some(receipt)) => {
                        println!("{}:{}", job.platform, receipt.remote_id)
                    }
                    _ => eprintln!(
                        "Error: {} job {} {} after {} retries: {}",
                        job.platform,
                        job.id,
                        job.status,
                        job.retries,
                        job.error.as_deref().unwrap_or("not published")
                    ),
                }
            }
        }
    }
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| MediacastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, finishing in-flight publishes...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
