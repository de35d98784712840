//! The `platter ingest` command: re-host a list of URLs with progress and
//! streaming output.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use platter_core::{BatchSummary, Config, ImageRequest, Ingestor, IngestReport, OutputWriter};
use tokio::sync::{mpsc, Semaphore};

/// Arguments for the `ingest` command.
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// File with one URL per line, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub input: String,

    /// Maximum number of URLs in flight
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub parallel: u16,

    /// Write reports to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Jsonl)]
    pub format: ReportFormat,

    /// Referer sent upstream for every URL
    #[arg(long)]
    pub referer: Option<String>,
}

/// Supported report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportFormat {
    /// One JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl From<ReportFormat> for platter_core::OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Json => Self::Json,
            ReportFormat::Jsonl => Self::JsonLines,
        }
    }
}

/// Execute the ingest command.
pub async fn execute(args: IngestArgs, config: Config) -> anyhow::Result<()> {
    let urls = read_urls(&args.input)?;
    if urls.is_empty() {
        tracing::warn!("No URLs found in {}", args.input);
    }
    tracing::info!("Ingesting {} URLs ({} in parallel)", urls.len(), args.parallel);

    let ingestor = Arc::new(Ingestor::from_config(&config)?);

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout()),
    };
    let mut writer = OutputWriter::new(sink, args.format.into());

    let progress = create_progress_bar(urls.len() as u64);
    let start_time = Instant::now();
    let requests = urls
        .into_iter()
        .map(|url| match &args.referer {
            Some(referer) => ImageRequest::new(url).with_referer(referer.clone()),
            None => ImageRequest::new(url),
        })
        .collect();

    run_batch(
        ingestor,
        requests,
        usize::from(args.parallel),
        &mut writer,
        &progress,
    )
    .await?;
    let summary = writer.finish()?;
    progress.finish_and_clear();

    if let Some(path) = &args.output {
        tracing::info!("Reports written to {:?}", path);
    }
    print_summary(&summary, start_time.elapsed());
    tracing::info!(
        stored = summary.stored,
        failed = summary.failed,
        "Ingest finished"
    );

    Ok(())
}

/// Run every request through the ingestor, at most `parallel` at a time.
///
/// Reports are written in completion order as they arrive.
pub async fn run_batch<W: Write>(
    ingestor: Arc<Ingestor>,
    requests: Vec<ImageRequest>,
    parallel: usize,
    writer: &mut OutputWriter<W>,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
    let (tx, mut rx) = mpsc::channel::<IngestReport>(parallel.max(1) * 2);
    let start_time = Instant::now();

    let producer = tokio::spawn(async move {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tracing::warn!("Ingest semaphore closed unexpectedly, stopping batch");
                break;
            };
            let ingestor = ingestor.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let report = ingestor.report(&request).await;
                drop(permit);
                let _ = tx.send(report).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Ingest task panicked: {e}");
            }
        }
    });

    while let Some(report) = rx.recv().await {
        if let Some(kind) = report.failure {
            tracing::debug!(url = %report.source_url, kind = kind.as_str(), "Not stored");
        }
        writer.write(&report)?;

        progress.inc(1);
        let elapsed = start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let rate = writer.summary().total() as f64 / elapsed;
            progress.set_message(format!("{rate:.1} url/sec"));
        }
    }

    producer.await?;
    Ok(())
}

/// Read URLs one per line. Blank lines and `#` comments are skipped.
fn read_urls(input: &str) -> anyhow::Result<Vec<String>> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    parse_urls(reader)
}

fn parse_urls(reader: impl BufRead) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        urls.push(line.to_string());
    }
    Ok(urls)
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after the batch.
fn print_summary(summary: &BatchSummary, elapsed: Duration) {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        summary.total() as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Stored:       {:>8}", summary.stored);
    if summary.failed > 0 {
        eprintln!("    Failed:       {:>8}", summary.failed);
        for (kind, count) in &summary.failures {
            eprintln!("      {:<20}{:>6}", kind, count);
        }
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", summary.total());
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} url/sec", rate);
    eprintln!("  ====================================");
}
