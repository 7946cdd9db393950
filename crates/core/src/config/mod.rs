//! Engine configuration.
//!
//! Every field has a production default, so a config file only needs to name
//! what it overrides. Files are JSON or YAML, chosen by extension.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::harness::InvocationOption;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unsupported config format for {0} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Docker-backed sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker client executable.
    pub binary: String,
    /// Image providing `qemu-<arch>` user-mode emulators and a POSIX shell.
    pub image: String,
    /// Liveness probe; the daemon counts as available when it exits with 0.
    pub probe_command: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            image: "fact/qemu-exec:alpine-3.14".to_string(),
            probe_command: vec!["pgrep".to_string(), "dockerd".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Hard wall-clock limit per sandbox invocation, in seconds.
    pub timeout_secs: u64,
    /// Upper bound on concurrent sandbox invocations.
    pub workers: usize,
    /// Command-line arguments tried against each binary.
    pub options: Vec<String>,
    /// Directory name that, when present in the unpacked tree, becomes the root.
    pub extraction_folder: String,
    /// MIME types treated as executable.
    pub file_types: Vec<String>,
    pub docker: DockerConfig,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            workers: 8,
            options: [" ", "-h", "--help", "-help", "--version"]
                .iter()
                .map(|o| o.to_string())
                .collect(),
            extraction_folder: "fact_extracted".to_string(),
            file_types: [
                "application/x-executable",
                "application/x-pie-executable",
                "application/x-sharedlib",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            docker: DockerConfig::default(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured options followed by the trace run.
    pub fn invocation_options(&self) -> Vec<InvocationOption> {
        self.options
            .iter()
            .map(|o| InvocationOption::Argument(o.clone()))
            .chain(std::iter::once(InvocationOption::Trace))
            .collect()
    }

    pub fn is_relevant_mime(&self, mime: &str) -> bool {
        self.file_types.iter().any(|t| t == mime)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be >= 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".into()));
        }
        if self.docker.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("docker.binary must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
}

fn config_format(path: &Path) -> Result<ConfigFormat, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(ConfigFormat::Json),
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<ExecConfig, ConfigError> {
    let format = config_format(path)?;
    let body = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: ExecConfig = match format {
        ConfigFormat::Json => serde_json::from_str(&body)?,
        ConfigFormat::Yaml => serde_yaml::from_str(&body)?,
    };
    config.validate()?;
    Ok(config)
}

/// Serialize a config in the format implied by the file extension.
pub fn write_config(path: &Path, config: &ExecConfig) -> Result<(), ConfigError> {
    let body = match config_format(path)? {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    std::fs::write(path, body)
        .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
}
