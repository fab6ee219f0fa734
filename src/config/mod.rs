mod file_config;

pub use file_config::{FileConfig, NotificationsConfig, SandboxConfig};

use crate::jobs::{SandboxSettings, DEFAULT_MIN_RUN_FREQUENCY};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IMAGE_PREFIX: &str = "scraper_bot";
pub const DEFAULT_BUILD_CONTEXT: &str = "scraper";
pub const DEFAULT_CONTAINER_DATA_PATH: &str = "/usr/app/data";
pub const DEFAULT_CONTAINER_LOG_PATH: &str = "/usr/app/log";
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Environment every scraper run gets unless overridden.
const DEFAULT_SCRAPER_ENV: [(&str, &str); 3] = [
    ("ROBOTSTXT_OBEY", "0"),
    ("CONCURRENT_REQUESTS", "32"),
    ("DOWNLOAD_DELAY", "0.5"),
];

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub image_prefix: Option<String>,
    pub build_context: Option<PathBuf>,
    pub docker_bin: Option<String>,
    pub webhook_url: Option<String>,
    pub min_run_frequency_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            port: 3001,
            logging_level: RequestsLoggingLevel::default(),
            image_prefix: None,
            build_context: None,
            docker_bin: None,
            webhook_url: None,
            min_run_frequency_secs: DEFAULT_MIN_RUN_FREQUENCY.as_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub min_run_frequency: Duration,

    pub sandbox: SandboxRuntimeSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone)]
pub struct SandboxRuntimeSettings {
    pub docker_bin: String,
    pub build_context: PathBuf,
    pub image_prefix: String,
    pub container_data_path: String,
    pub container_log_path: String,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub title_prefix: String,
    pub timeout: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if data_dir.exists() && !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let min_run_frequency = Duration::from_secs(
            file.min_run_frequency_secs
                .unwrap_or(cli.min_run_frequency_secs),
        );
        if min_run_frequency.is_zero() {
            bail!("min_run_frequency_secs must be greater than zero");
        }

        let sandbox_file = file.sandbox.unwrap_or_default();
        let mut env: Vec<(String, String)> = DEFAULT_SCRAPER_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Ok(node_env) = std::env::var("NODE_ENV") {
            env.push(("NODE_ENV".to_string(), node_env));
        }
        for (key, value) in sandbox_file.env.unwrap_or_default() {
            match env.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => env.push((key, value)),
            }
        }

        let sandbox = SandboxRuntimeSettings {
            docker_bin: sandbox_file
                .docker_bin
                .or_else(|| cli.docker_bin.clone())
                .unwrap_or_else(|| "docker".to_string()),
            build_context: sandbox_file
                .build_context
                .map(PathBuf::from)
                .or_else(|| cli.build_context.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_CONTEXT)),
            image_prefix: sandbox_file
                .image_prefix
                .or_else(|| cli.image_prefix.clone())
                .unwrap_or_else(|| DEFAULT_IMAGE_PREFIX.to_string()),
            container_data_path: sandbox_file
                .container_data_path
                .unwrap_or_else(|| DEFAULT_CONTAINER_DATA_PATH.to_string()),
            container_log_path: sandbox_file
                .container_log_path
                .unwrap_or_else(|| DEFAULT_CONTAINER_LOG_PATH.to_string()),
            env,
        };

        let notifications_file = file.notifications.unwrap_or_default();
        let notifications = NotificationSettings {
            webhook_url: notifications_file
                .webhook_url
                .or_else(|| cli.webhook_url.clone()),
            title_prefix: notifications_file.title_prefix.unwrap_or_default(),
            timeout: Duration::from_secs(
                notifications_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            data_dir,
            port,
            logging_level,
            min_run_frequency,
            sandbox,
            notifications,
        })
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }

    /// Settings handed to jobs. The image identity is fixed here, once per
    /// process.
    pub fn sandbox_settings(&self) -> SandboxSettings {
        SandboxSettings {
            image: SandboxSettings::image_name(&self.sandbox.image_prefix, Utc::now()),
            build_context: self.sandbox.build_context.clone(),
            scratch_root: self.scratch_dir(),
            container_data_path: self.sandbox.container_data_path.clone(),
            container_log_path: self.sandbox.container_log_path.clone(),
            env: self.sandbox.env.clone(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
