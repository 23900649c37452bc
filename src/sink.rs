use crate::model::{ExtractionResult, OUTPUT_HEADER};
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use csv::{QuoteStyle, Writer, WriterBuilder};
use indicatif::ProgressBar;
use log::{debug, error, info};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// What the workers send to the writer thread.
#[derive(Debug)]
pub enum SinkMessage {
    /// All rows of one job, written as a single block.
    Job {
        position: usize,
        identifier: String,
        rows: Vec<ExtractionResult>,
    },
    Stop,
}

pub trait ResultWriter: Send {
    fn write_rows(&mut self, rows: &[ExtractionResult]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn rows_written(&self) -> usize;
}

/// Tab-separated output file. Creating it truncates any previous run and writes the header.
pub struct TsvResultWriter {
    writer: Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl TsvResultWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(OUTPUT_HEADER)
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }
}

impl ResultWriter for TsvResultWriter {
    fn write_rows(&mut self, rows: &[ExtractionResult]) -> Result<()> {
        for row in rows {
            self.writer
                .write_record(row.to_record())
                .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
            self.rows_written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))
    }

    fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub jobs: usize,
    pub rows: usize,
}

/// Per-job progress lines (`(i/n) ==> id`) plus the progress bar. The line goes to its
/// own output rather than through the bar, which drops everything once it is hidden
/// (stderr not a terminal).
pub struct JobProgress {
    bar: ProgressBar,
    out: Box<dyn Write + Send>,
    total: usize,
}

impl JobProgress {
    pub fn new(bar: ProgressBar, total: usize) -> Self {
        Self::with_output(bar, total, Box::new(io::stdout()))
    }

    pub fn with_output(bar: ProgressBar, total: usize, out: Box<dyn Write + Send>) -> Self {
        Self { bar, out, total }
    }

    pub fn job_written(&mut self, position: usize, identifier: &str) {
        let width = self.total.to_string().len();
        let line = format!("({:>width$}/{}) ==> {}", position, self.total, identifier);
        let out = &mut self.out;
        if let Err(e) = self.bar.suspend(|| writeln!(out, "{}", line).and_then(|_| out.flush())) {
            debug!("Could not print progress line for {}: {}", identifier, e);
        }
        self.bar.inc(1);
    }
}

/// Starts the single thread allowed to touch the output. It appends each job's rows as
/// they arrive, reports progress, and exits on `Stop` or when every sender is gone.
pub fn spawn_writer<W: ResultWriter + 'static>(
    mut writer: W,
    receiver: Receiver<SinkMessage>,
    mut progress: JobProgress,
) -> JoinHandle<Result<WriterSummary>> {
    thread::spawn(move || -> Result<WriterSummary> {
        info!("Writer thread started.");
        let mut jobs = 0;
        for message in receiver.iter() {
            let (position, identifier, rows) = match message {
                SinkMessage::Job { position, identifier, rows } => (position, identifier, rows),
                SinkMessage::Stop => {
                    debug!("Writer thread received stop signal.");
                    break;
                }
            };
            if let Err(e) = writer.write_rows(&rows).and_then(|_| writer.flush()) {
                error!("Writer thread error writing rows for {}: {:#}", identifier, e);
                return Err(e);
            }
            jobs += 1;
            progress.job_written(position, &identifier);
        }
        writer.flush()?;
        info!("Writer thread finished. Wrote {} rows for {} jobs.", writer.rows_written(), jobs);
        Ok(WriterSummary {
            jobs,
            rows: writer.rows_written(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn quiet_progress(total: usize) -> JobProgress {
        JobProgress::with_output(ProgressBar::hidden(), total, Box::new(io::sink()))
    }

    #[test]
    fn create_truncates_and_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "stale content\n").unwrap();

        TsvResultWriter::create(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "matricule_repere\tfuseau\ty\tx\tz\tNote\n"
        );
    }

    #[test]
    fn writer_thread_appends_jobs_until_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let writer = TsvResultWriter::create(&path).unwrap();
        let (sender, receiver) = unbounded();
        let handle = spawn_writer(writer, receiver, quiet_progress(2));

        sender
            .send(SinkMessage::Job {
                position: 2,
                identifier: "67890".into(),
                rows: vec![ExtractionResult::failed("67890")],
            })
            .unwrap();
        sender.send(SinkMessage::Stop).unwrap();
        // Anything after the stop signal is ignored.
        let _ = sender.send(SinkMessage::Job {
            position: 1,
            identifier: "12345".into(),
            rows: vec![ExtractionResult::failed("12345")],
        });

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary, WriterSummary { jobs: 1, rows: 1 });
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "67890\t \t \t \t \tdownload failed");
    }

    #[test]
    fn writer_thread_stops_when_senders_drop() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TsvResultWriter::create(&dir.path().join("out.txt")).unwrap();
        let (sender, receiver) = unbounded::<SinkMessage>();
        let handle = spawn_writer(writer, receiver, quiet_progress(0));
        drop(sender);
        assert_eq!(handle.join().unwrap().unwrap(), WriterSummary::default());
    }

    #[test]
    fn progress_line_is_printed_when_bar_is_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TsvResultWriter::create(&dir.path().join("out.txt")).unwrap();
        let out = SharedBuf::default();
        let bar = ProgressBar::hidden();
        assert!(bar.is_hidden());
        let progress = JobProgress::with_output(bar.clone(), 12, Box::new(out.clone()));
        let (sender, receiver) = unbounded();
        let handle = spawn_writer(writer, receiver, progress);

        for (position, identifier) in [(3, "12345"), (11, "67890")] {
            sender
                .send(SinkMessage::Job {
                    position,
                    identifier: identifier.into(),
                    rows: vec![ExtractionResult::failed(identifier)],
                })
                .unwrap();
        }
        sender.send(SinkMessage::Stop).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(out.contents(), "( 3/12) ==> 12345\n(11/12) ==> 67890\n");
        assert_eq!(bar.position(), 2);
    }
}
