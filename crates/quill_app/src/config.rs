use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use quill_core::TelemetrySettings;
use quill_engine::{PipelineSettings, TransportSettings};
use quill_logging::quill_info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;
use crate::logging::LogDestination;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "quill.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Everything the binary can be told, with a default for each field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    pub backend_url: String,
    pub generate_path: String,
    pub revise_path: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub context_window: usize,
    pub expected_token_budget: u64,
    pub per_token_rate_usd: f64,
    pub style: Option<String>,
    pub model: Option<String>,
    pub log_destination: LogDestination,
    pub log_file: PathBuf,
    pub verbose: bool,
}

impl Default for QuillConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        let pipeline = PipelineSettings::default();
        Self {
            backend_url: transport.base_url,
            generate_path: transport.generate_path,
            revise_path: transport.revise_path,
            connect_timeout_secs: transport.connect_timeout.as_secs(),
            read_timeout_secs: transport.read_timeout.as_secs(),
            output_dir: PathBuf::from("chapters"),
            context_window: pipeline.context_window,
            expected_token_budget: pipeline.telemetry.expected_token_budget,
            per_token_rate_usd: pipeline.telemetry.per_token_rate_usd,
            style: None,
            model: None,
            log_destination: LogDestination::Terminal,
            log_file: PathBuf::from("quill.log"),
            verbose: false,
        }
    }
}

impl QuillConfig {
    /// Read `path`, or `./quill.ron` if it exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::read(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        quill_info!("loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        ron::from_str(text).map_err(|err| err.to_string())
    }

    /// Command-line flags win over the file.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(backend) = &cli.backend {
            self.backend_url = backend.clone();
        }
        if let Some(output) = &cli.output {
            self.output_dir = output.clone();
        }
        if cli.verbose {
            self.verbose = true;
        }
        self
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            base_url: self.backend_url.clone(),
            generate_path: self.generate_path.clone(),
            revise_path: self.revise_path.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            telemetry: TelemetrySettings {
                expected_token_budget: self.expected_token_budget,
                per_token_rate_usd: self.per_token_rate_usd,
            },
            context_window: self.context_window,
            style: self.style.clone(),
            model: self.model.clone(),
        }
    }
}
