use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub lineage: LineageConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// JSON snapshot exported from the metadata store.
    pub snapshot_path: PathBuf,
}

/// Bounds applied to a single lineage request.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LineageConfig {
    #[serde(default = "default_max_field_depth")]
    pub max_field_depth: usize,
    /// Unbounded when absent.
    #[serde(default)]
    pub max_nodes: Option<usize>,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            max_field_depth: default_max_field_depth(),
            max_nodes: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            max_log_files: default_max_log_files(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    7
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_field_depth() -> usize {
    256
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;

        if config.lineage.max_field_depth == 0 {
            anyhow::bail!("lineage.max_field_depth must be at least 1");
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
