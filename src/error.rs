use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid identifier '{0}': must be non-empty and free of path separators")]
    InvalidIdentifier(String),
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not write document to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("could not launch converter '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("converter exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("converter did not finish within {secs}s")]
    TimedOut { secs: u64 },
    #[error("converter produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("converter I/O error")]
    Io(#[from] std::io::Error),
}

/// Failures once the coordinate table marker has been found.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("marker '{0}' not found")]
    MissingMarker(&'static str),
    #[error("{field} line {index} is past the end of the text")]
    LineOutOfRange { field: &'static str, index: usize },
}

/// Everything that can sink a single identifier's job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("could not read converted text {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("layout parse failed")]
    Parse(#[from] ParseError),
    #[error("job panicked: {0}")]
    Panicked(String),
}
