//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_log_core::{AnalyzerConfig, FilterSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every table is optional; command-line flags override what is set here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub core: AnalyzerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub logs: Vec<PathBuf>,
    #[serde(default)]
    pub definitions: Vec<PathBuf>,
    /// Registry id of the database to activate (defaults to the first loaded)
    pub active: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub window_start: usize,
    #[serde(default = "default_window_len")]
    pub window_len: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            window_start: 0,
            window_len: default_window_len(),
        }
    }
}

fn default_window_len() -> usize {
    50
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.output.window_len == 0 {
        log::warn!("output.window_len is 0, no rows will be printed");
    }

    Ok(config)
}
