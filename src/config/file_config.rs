use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub min_run_frequency_secs: Option<u64>,

    // Feature configs
    pub sandbox: Option<SandboxConfig>,
    pub notifications: Option<NotificationsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    pub docker_bin: Option<String>,
    pub build_context: Option<String>,
    pub image_prefix: Option<String>,
    pub container_data_path: Option<String>,
    pub container_log_path: Option<String>,
    /// Extra environment for scraper runs, merged over the defaults.
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    pub title_prefix: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
