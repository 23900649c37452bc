use crate::config::ConverterConfig;
use crate::error::ConvertError;
use log::debug;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Turns a fetched document into a plain-text sibling that keeps its visual layout.
pub trait TextConverter: Send + Sync {
    fn convert(&self, document: &Path) -> Result<PathBuf, ConvertError>;
}

pub fn text_path(document: &Path) -> PathBuf {
    document.with_extension("txt")
}

/// Drives PDFMiner's `pdf2txt.py` (or any tool taking the same arguments).
pub struct Pdf2TxtConverter {
    tool: PathBuf,
    interpreter: Option<String>,
    encoding: String,
    layout_mode: String,
    timeout: Duration,
}

impl Pdf2TxtConverter {
    pub fn new(tool: PathBuf, config: &ConverterConfig) -> Self {
        let interpreter = config.interpreter.clone().or_else(|| {
            let is_script = tool.extension().map_or(false, |ext| ext == "py");
            is_script.then(|| "python3".to_string())
        });
        Self {
            tool,
            interpreter,
            encoding: config.encoding.clone(),
            layout_mode: config.layout_mode.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command(&self, document: &Path, output: &Path) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.tool);
                cmd
            }
            None => Command::new(&self.tool),
        };
        cmd.arg("-c")
            .arg(&self.encoding)
            .arg("-t")
            .arg(&self.layout_mode)
            .arg("-o")
            .arg(output)
            .arg(document)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    fn program_name(&self) -> String {
        self.interpreter
            .clone()
            .unwrap_or_else(|| self.tool.display().to_string())
    }
}

impl TextConverter for Pdf2TxtConverter {
    fn convert(&self, document: &Path) -> Result<PathBuf, ConvertError> {
        let output = text_path(document);
        match fs::remove_file(&output) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut child = self
            .command(document, &output)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program_name(),
                source,
            })?;

        // Drain stderr on the side so a chatty converter cannot fill the pipe and stall.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(ConvertError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            });
        }
        if !output.is_file() {
            return Err(ConvertError::MissingOutput(output));
        }
        debug!(
            "Converted {} in {:?}",
            document.display(),
            started.elapsed()
        );
        Ok(output)
    }
}
