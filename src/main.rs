use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use repere_extract::model::read_identifiers;
use repere_extract::{
    run, worker_count, HttpRecordFetcher, Pdf2TxtConverter, RecordPipeline, RunConfig,
    TsvResultWriter,
};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use time::macros::format_description;

#[derive(Parser, Clone)]
#[command(name = "Repere Extractor")]
#[command(about = "Downloads geodetic record sheets and extracts their planimetric coordinates into a tab-separated file.")]
#[command(version)]
struct Cli {
    #[arg(help = "Text file listing one identifier (matricule) per line")]
    identifiers: PathBuf,
    #[arg(help = "Tab-separated output file (overwritten)")]
    output: PathBuf,
    #[arg(help = "Directory receiving the downloaded PDF and converted TXT sheets")]
    work_dir: PathBuf,
    #[arg(help = "Path to the PDF-to-text converter (PDFMiner's pdf2txt.py)")]
    converter: PathBuf,
    #[arg(short, long, help = "Optional YAML run configuration")]
    config: Option<PathBuf>,
    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,
    #[arg(short, long, default_value = "0", help = "Number of worker threads (0 for all cores but one)")]
    threads: usize,
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, elapsed.subsec_millis())
    }
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", cli.log_level);
            LevelFilter::Info
        }
    };
    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    info!("Starting Repere Extractor");
    info!("Run Timestamp: {}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    let config = RunConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.config {
        info!("Loaded run configuration from: {}", path.display());
    }

    fs::create_dir_all(&cli.work_dir)
        .with_context(|| format!("Failed to create working directory: {}", cli.work_dir.display()))?;
    info!("Working directory: {}", cli.work_dir.display());

    let identifiers = read_identifiers(&cli.identifiers)?;
    info!("Loaded {} identifiers from {}", identifiers.len(), cli.identifiers.display());

    let writer = TsvResultWriter::create(&cli.output)?;
    info!("Output file: {}", cli.output.display());
    if identifiers.is_empty() {
        warn!("No identifiers to process. Exiting.");
        return Ok(());
    }

    let fetcher = HttpRecordFetcher::new(&config.server).context("Failed to build HTTP client")?;
    let converter = Pdf2TxtConverter::new(cli.converter.clone(), &config.converter);
    let pipeline = RecordPipeline::new(fetcher, converter, cli.work_dir.clone());

    let workers = worker_count(cli.threads);
    let progress_bar = ProgressBar::new(identifiers.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=> "),
    );

    let summary = run(
        &pipeline,
        &identifiers,
        workers,
        config.writer.capacity_for(workers),
        writer,
        progress_bar,
    )?;

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Identifiers processed: {}", summary.jobs);
    info!("Rows written: {}", summary.rows);
    info!("Sheets without coordinates: {}", summary.without_coordinates);
    if summary.failed > 0 {
        warn!("Failed jobs: {} (see 'download failed' rows)", summary.failed);
    }
    info!("-------------------------------------------------------");
    Ok(())
}
