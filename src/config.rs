use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://fichegeodesique.mern.gouv.qc.ca";

/// Optional YAML run configuration. Every field has a default, so an absent file and an
/// empty file behave the same.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub server: ServerConfig,
    pub converter: ConverterConfig,
    pub writer: WriterConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    /// Program used to launch the tool. Python scripts get `python3` when unset.
    pub interpreter: Option<String>,
    pub encoding: String,
    pub layout_mode: String,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            encoding: "utf-8".to_string(),
            layout_mode: "text".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    /// 0 sizes the channel from the worker count.
    pub channel_capacity: usize,
}

impl WriterConfig {
    pub fn capacity_for(&self, workers: usize) -> usize {
        if self.channel_capacity > 0 {
            self.channel_capacity
        } else {
            (workers * 2).max(16)
        }
    }
}

impl RunConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run configuration file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).with_context(|| {
            format!("Failed to parse run configuration YAML from {}", path.display())
        })
    }
}
