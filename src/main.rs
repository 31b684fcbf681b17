use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunegrab_server::catalog::{Catalog, HttpCatalog};
use tunegrab_server::config::{AppConfig, CliConfig, FileConfig};
use tunegrab_server::cover::CoverResolver;
use tunegrab_server::credential::CredentialStore;
use tunegrab_server::download::DownloadOrchestrator;
use tunegrab_server::fetcher::{ContentFetcher, HttpFetcher};
use tunegrab_server::janitor::{
    spawn_janitors, CleanupJanitor, CredentialCheckJanitor, Janitor,
};
use tunegrab_server::server::{run_server, RequestsLoggingLevel, ServerState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory where downloaded music is stored.
    #[clap(value_parser = parse_path)]
    pub music_dir: PathBuf,

    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the credential file. Defaults to credential.json in the music dir.
    #[clap(long, value_parser = parse_path)]
    pub credential_file: Option<PathBuf>,

    /// The address to bind to.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 6022)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Timeout in seconds for catalog and download requests.
    #[clap(long, default_value_t = 60)]
    pub download_timeout_secs: u64,

    /// Cover image edge size in pixels. One of 150, 300, 500 or 800.
    #[clap(long, default_value_t = 800)]
    pub cover_size: u32,

    /// Number of search results per page.
    #[clap(long, default_value_t = 10)]
    pub search_page_size: usize,

    /// Interval in seconds between cleanup sweeps. Set to 0 to disable cleanup.
    #[clap(long, default_value_t = 3600)]
    pub cleanup_interval_secs: u64,

    /// Age in seconds a downloaded file must reach before cleanup deletes it.
    /// Set to 0 to delete everything on each sweep.
    #[clap(long, default_value_t = 3600)]
    pub cleanup_retention_secs: u64,

    /// Interval in seconds between credential checks. Set to 0 to disable them.
    #[clap(long, default_value_t = 1800)]
    pub credential_check_interval_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            music_dir: Some(self.music_dir.clone()),
            credential_file: self.credential_file.clone(),
            host: self.host.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            download_timeout_secs: self.download_timeout_secs,
            cover_size: self.cover_size,
            search_page_size: self.search_page_size,
            cleanup_interval_secs: self.cleanup_interval_secs,
            cleanup_retention_secs: self.cleanup_retention_secs,
            credential_check_interval_secs: self.credential_check_interval_secs,
            ..Default::default()
        }
    }
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
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    std::fs::create_dir_all(&config.music_dir)
        .with_context(|| format!("Failed to create music dir {:?}", config.music_dir))?;

    let catalog: Arc<dyn Catalog> = Arc::new(HttpCatalog::new(config.download_timeout_secs)?);
    let fetcher: Arc<dyn ContentFetcher> =
        Arc::new(HttpFetcher::new(config.download_timeout_secs)?);

    let credentials = Arc::new(CredentialStore::new(
        config.credential_file.clone(),
        catalog.clone(),
        config.credential_check.enabled,
    ));
    credentials.load_and_refresh().await;

    let orchestrator = Arc::new(DownloadOrchestrator::new(
        catalog.clone(),
        fetcher.clone(),
        credentials.clone(),
        CoverResolver::new(fetcher.clone(), config.cover_size),
        config.music_dir.clone(),
        config.max_filename_length,
    ));

    let cleanup = Arc::new(CleanupJanitor::new(
        config.music_dir.clone(),
        config.credential_file.clone(),
        config.cleanup.interval_secs,
        config.cleanup.retention_secs,
        config.cleanup.enabled,
    ));

    let shutdown = CancellationToken::new();
    let mut janitors: Vec<Arc<dyn Janitor>> = Vec::new();
    if config.cleanup.interval_secs > 0 {
        info!(
            "Cleanup sweeps every {}s, retention {}s",
            config.cleanup.interval_secs, config.cleanup.retention_secs
        );
        janitors.push(cleanup.clone());
    }
    if config.credential_check.interval_secs > 0 {
        info!(
            "Credential checks every {}s",
            config.credential_check.interval_secs
        );
        janitors.push(Arc::new(CredentialCheckJanitor::new(
            credentials.clone(),
            config.credential_check.interval_secs,
        )));
    }
    spawn_janitors(janitors, shutdown.clone());

    let state = ServerState::new(config, catalog, credentials, orchestrator, cleanup);

    info!("Ready to serve at port {}!", state.config.port);
    let result = tokio::select! {
        result = run_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };
    shutdown.cancel();
    result
}
