use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::CliArgs;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    #[serde(alias = "tailCount")]
    pub tail_count: i64,
    #[serde(alias = "showTime")]
    pub show_time: bool,
    #[serde(alias = "sinceSeconds")]
    pub since_seconds: i64,
    #[serde(alias = "buffer", alias = "bufferSize")]
    pub buffer_size: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            tail_count: 100,
            show_time: false,
            since_seconds: -1,
            buffer_size: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logger: LoggerConfig,
    #[serde(alias = "readOnly")]
    pub read_only: bool,
    #[serde(alias = "refreshMs")]
    pub refresh_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            read_only: false,
            refresh_ms: 2_000,
        }
    }
}

impl Config {
    /// Loads the config file named on the command line, or the first one
    /// discovered, and applies command line overrides.
    pub fn load(args: &CliArgs) -> Result<(Self, Option<PathBuf>)> {
        let path = args.config.clone().or_else(discover_config_path);
        let mut config = match path.as_deref() {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        config.apply_cli(args);
        Ok((config, path))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(refresh_ms) = args.refresh_ms {
            self.refresh_ms = refresh_ms;
        }
        self.refresh_ms = self.refresh_ms.max(250);
        self.read_only |= args.readonly;
        if self.logger.buffer_size == 0 {
            self.logger.buffer_size = LoggerConfig::default().buffer_size;
        }
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KESTREL_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("kestrel.yaml"), PathBuf::from(".kestrel.yaml")];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(home).join(".config/kestrel/config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}
