use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scrape_orchestrator::config::{AppConfig, CliConfig, FileConfig};
use scrape_orchestrator::jobs::{JobContext, JobRegistry};
use scrape_orchestrator::notifications::{
    DigestSender, LiveChannel, LogDigest, Notifier, WebhookDigest,
};
use scrape_orchestrator::server::{metrics, run_server, ServerConfig};
use scrape_orchestrator::{DockerCliSandbox, FsRunHistoryStore, RequestsLoggingLevel};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI flags.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Directory holding run history and per-job scratch data.
    #[clap(long)]
    pub data_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Prefix of the scraper image name.
    #[clap(long)]
    pub image_prefix: Option<String>,

    /// Directory the scraper image is built from.
    #[clap(long)]
    pub build_context: Option<PathBuf>,

    /// Docker binary to drive.
    #[clap(long)]
    pub docker_bin: Option<String>,

    /// Chat webhook receiving digests. Digests are only logged without it.
    #[clap(long)]
    pub webhook_url: Option<String>,

    /// Smallest run frequency accepted for new jobs, in seconds.
    #[clap(long, default_value_t = 60)]
    pub min_run_frequency_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            data_dir: self.data_dir.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            image_prefix: self.image_prefix.clone(),
            build_context: self.build_context.clone(),
            docker_bin: self.docker_bin.clone(),
            webhook_url: self.webhook_url.clone(),
            min_run_frequency_secs: self.min_run_frequency_secs,
        }
    }
}

fn digest_senders(config: &AppConfig) -> Result<Vec<Arc<dyn DigestSender>>> {
    let notifications = &config.notifications;
    let mut senders: Vec<Arc<dyn DigestSender>> = vec![Arc::new(LogDigest)];
    if let Some(url) = &notifications.webhook_url {
        let webhook = WebhookDigest::new(
            url.clone(),
            notifications.title_prefix.clone(),
            notifications.timeout,
        )
        .context("Failed to create webhook client")?;
        senders.push(Arc::new(webhook));
    }
    Ok(senders)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!("Using data directory {:?}", config.data_dir);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let live = Arc::new(LiveChannel::new());
    let notifier = Arc::new(Notifier::new(live.clone(), digest_senders(&config)?));
    let history = Arc::new(FsRunHistoryStore::new(config.history_dir()));
    let sandbox = Arc::new(DockerCliSandbox::new(&config.sandbox.docker_bin));

    let settings = config.sandbox_settings();
    info!("Scraper image for this process: {}", settings.image);
    let registry = Arc::new(JobRegistry::new(JobContext::new(
        sandbox, history, notifier, settings,
    )));

    // Jobs can still be created without the image; starting them retries the build.
    if let Err(e) = registry.ensure_image().await {
        error!("Scraper image is not available yet: {}", e);
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        min_run_frequency: config.min_run_frequency,
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        signal_token.cancel();
    });

    let result = run_server(server_config, registry.clone(), live, shutdown).await;

    let stopped = registry.stop_all();
    info!("Stopped {} jobs", stopped.len());

    result
}
