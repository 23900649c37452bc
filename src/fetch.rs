use crate::config::ServerConfig;
use crate::error::FetchError;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of record sheets. Implementations persist the document for `identifier` inside
/// `work_dir` and return its path.
pub trait RecordSource: Send + Sync {
    fn fetch(&self, identifier: &str, work_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Rejects identifiers that would escape the working directory or collide with another
/// identifier's artifacts.
pub fn validate_identifier(identifier: &str) -> Result<(), FetchError> {
    let bad = identifier.is_empty()
        || identifier.contains(['/', '\\'])
        || identifier == "."
        || identifier.contains("..");
    if bad {
        Err(FetchError::InvalidIdentifier(identifier.to_string()))
    } else {
        Ok(())
    }
}

pub fn document_path(work_dir: &Path, identifier: &str) -> PathBuf {
    work_dir.join(format!("{}.pdf", identifier))
}

pub struct HttpRecordFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpRecordFetcher {
    pub fn new(config: &ServerConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| FetchError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn sheet_url(&self, identifier: &str) -> String {
        format!("{}/matricule-datum/{}/1", self.base_url, identifier)
    }
}

impl RecordSource for HttpRecordFetcher {
    fn fetch(&self, identifier: &str, work_dir: &Path) -> Result<PathBuf, FetchError> {
        validate_identifier(identifier)?;
        let url = self.sheet_url(identifier);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| FetchError::Http { url: url.clone(), source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }
        let body = response
            .bytes()
            .map_err(|source| FetchError::Http { url: url.clone(), source })?;

        let path = document_path(work_dir, identifier);
        fs::write(&path, &body).map_err(|source| FetchError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Saved {} bytes for {} to {}", body.len(), identifier, path.display());
        Ok(path)
    }
}
