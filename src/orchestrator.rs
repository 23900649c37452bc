use crate::convert::TextConverter;
use crate::error::JobError;
use crate::fetch::RecordSource;
use crate::layout;
use crate::model::ExtractionResult;
use crate::sink::{spawn_writer, JobProgress, ResultWriter, SinkMessage, WriterSummary};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Worker threads to use: the requested count, or every core but one so the writer keeps
/// a core to itself.
pub fn worker_count(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        num_cpus::get().saturating_sub(1).max(1)
    }
}

/// Fetch, convert and parse for one identifier at a time.
pub struct RecordPipeline<S, C> {
    source: S,
    converter: C,
    work_dir: PathBuf,
}

impl<S: RecordSource, C: TextConverter> RecordPipeline<S, C> {
    pub fn new(source: S, converter: C, work_dir: PathBuf) -> Self {
        Self {
            source,
            converter,
            work_dir,
        }
    }

    pub fn process(&self, identifier: &str) -> Result<Vec<ExtractionResult>, JobError> {
        let document = self.source.fetch(identifier, &self.work_dir)?;
        let text_file = self.converter.convert(&document)?;
        let text = fs::read_to_string(&text_file).map_err(|source| JobError::Read {
            path: text_file.clone(),
            source,
        })?;
        Ok(layout::extract_fxyz(identifier, &text)?)
    }

    /// Like `process`, but never fails: any error or panic becomes a single
    /// `download failed` row.
    pub fn process_isolated(&self, identifier: &str) -> (Vec<ExtractionResult>, Option<JobError>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(identifier)))
            .unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(payload.as_ref()))));
        match outcome {
            Ok(rows) => (rows, None),
            Err(e) => (vec![ExtractionResult::failed(identifier)], Some(e)),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs: usize,
    pub rows: usize,
    pub failed: usize,
    pub without_coordinates: usize,
}

/// Runs every identifier through `pipeline` on `workers` threads and funnels the rows to
/// `writer` on its own thread. Per-identifier failures end up in the output; only pool or
/// writer breakdowns are returned as errors.
pub fn run<S, C, W>(
    pipeline: &RecordPipeline<S, C>,
    identifiers: &[String],
    workers: usize,
    channel_capacity: usize,
    writer: W,
    progress: ProgressBar,
) -> Result<RunSummary>
where
    S: RecordSource,
    C: TextConverter,
    W: ResultWriter + 'static,
{
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("repere-worker-{}", i))
        .build()
        .context("Failed to build worker pool")?;
    info!(
        "Processing {} identifiers on {} workers (writer channel capacity {}).",
        identifiers.len(),
        workers,
        channel_capacity
    );

    let (sender, receiver): (Sender<SinkMessage>, Receiver<SinkMessage>) =
        bounded(channel_capacity.max(1));
    let writer_thread = spawn_writer(
        writer,
        receiver,
        JobProgress::new(progress.clone(), identifiers.len()),
    );

    let failed = AtomicUsize::new(0);
    let without_coordinates = AtomicUsize::new(0);
    // Set once the writer has dropped its end; nothing fetched afterwards could be written.
    let writer_gone = AtomicBool::new(false);

    pool.scope_fifo(|scope| {
        for (index, identifier) in identifiers.iter().enumerate() {
            let sender = sender.clone();
            let failed = &failed;
            let without_coordinates = &without_coordinates;
            let writer_gone = &writer_gone;
            scope.spawn_fifo(move |_| {
                if writer_gone.load(Ordering::Relaxed) {
                    debug!("Skipping {}: writer thread has stopped", identifier);
                    return;
                }
                let (rows, job_error) = pipeline.process_isolated(identifier);
                if let Some(e) = job_error {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Job for {} failed: {}", identifier, error_chain(&e));
                } else if !rows.iter().any(ExtractionResult::has_geometry) {
                    without_coordinates.fetch_add(1, Ordering::Relaxed);
                    debug!("{} has no coordinate table", identifier);
                }
                let message = SinkMessage::Job {
                    position: index + 1,
                    identifier: identifier.clone(),
                    rows,
                };
                if sender.send(message).is_err() {
                    writer_gone.store(true, Ordering::Relaxed);
                    error!("Failed to send rows for {} to writer thread. Writer likely stopped.", identifier);
                }
            });
        }
    });

    debug!("All jobs finished. Stopping writer.");
    // A writer that already bailed out has dropped the receiver; its join result says why.
    let _ = sender.send(SinkMessage::Stop);
    drop(sender);

    let WriterSummary { jobs, rows } = match writer_thread.join() {
        Ok(result) => result.context("Writer thread returned an error")?,
        Err(e) => return Err(anyhow!("Writer thread panicked: {}", panic_message(e.as_ref()))),
    };
    progress.finish_with_message(format!(
        "Processing finished. {} jobs, {} rows, {} failed.",
        jobs,
        rows,
        failed.load(Ordering::Relaxed)
    ));

    Ok(RunSummary {
        jobs,
        rows,
        failed: failed.into_inner(),
        without_coordinates: without_coordinates.into_inner(),
    })
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
