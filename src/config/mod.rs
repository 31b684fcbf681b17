mod file_config;

pub use file_config::{CleanupConfig, CredentialCheckConfig, FileConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// Cover image sizes the catalog's photo CDN serves.
pub const COVER_SIZES: [u32; 4] = [150, 300, 500, 800];

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub music_dir: Option<PathBuf>,
    pub credential_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub download_timeout_secs: u64,
    pub max_filename_length: usize,
    pub cover_size: u32,
    pub search_page_size: usize,
    pub catalog_fetch_limit: usize,
    pub cleanup_interval_secs: u64,
    pub cleanup_retention_secs: u64,
    pub credential_check_interval_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            music_dir: None,
            credential_file: None,
            host: "0.0.0.0".to_string(),
            port: 6022,
            logging_level: RequestsLoggingLevel::Path,
            download_timeout_secs: 60,
            max_filename_length: 100,
            cover_size: 800,
            search_page_size: 10,
            catalog_fetch_limit: 60,
            cleanup_interval_secs: 3600,
            cleanup_retention_secs: 3600,
            credential_check_interval_secs: 1800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub music_dir: PathBuf,
    pub credential_file: PathBuf,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub download_timeout_secs: u64,
    pub max_filename_length: usize,
    pub cover_size: u32,
    pub search_page_size: usize,
    pub catalog_fetch_limit: usize,

    // Janitor settings (with defaults)
    pub cleanup: CleanupSettings,
    pub credential_check: CredentialCheckSettings,
}

#[derive(Debug, Clone)]
pub struct CleanupSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Minimum file age before the cleanup janitor deletes it.
    /// 0 means every file goes on each pass.
    pub retention_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CredentialCheckSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let music_dir = file
            .music_dir
            .map(PathBuf::from)
            .or_else(|| cli.music_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("music_dir must be specified via --music-dir or in config file")
            })?;

        let credential_file = file
            .credential_file
            .map(PathBuf::from)
            .or_else(|| cli.credential_file.clone())
            .unwrap_or_else(|| music_dir.join("credential.json"));

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let download_timeout_secs = file.download_timeout_secs.unwrap_or(cli.download_timeout_secs);
        let max_filename_length = file.max_filename_length.unwrap_or(cli.max_filename_length);

        let cover_size = file.cover_size.unwrap_or(cli.cover_size);
        if !COVER_SIZES.contains(&cover_size) {
            bail!(
                "Unsupported cover size {} (expected one of {:?})",
                cover_size,
                COVER_SIZES
            );
        }

        let search_page_size = file.search_page_size.unwrap_or(cli.search_page_size);
        if search_page_size == 0 {
            bail!("search_page_size must be at least 1");
        }
        let catalog_fetch_limit = file.catalog_fetch_limit.unwrap_or(cli.catalog_fetch_limit);

        // Janitor settings - merge file config with CLI defaults
        let cleanup_file = file.cleanup.unwrap_or_default();
        let cleanup = CleanupSettings {
            enabled: cleanup_file.enabled.unwrap_or(true),
            interval_secs: cleanup_file.interval_secs.unwrap_or(cli.cleanup_interval_secs),
            retention_secs: cleanup_file
                .retention_secs
                .unwrap_or(cli.cleanup_retention_secs),
        };

        let check_file = file.credential_check.unwrap_or_default();
        let credential_check = CredentialCheckSettings {
            enabled: check_file.enabled.unwrap_or(true),
            interval_secs: check_file
                .interval_secs
                .unwrap_or(cli.credential_check_interval_secs),
        };

        Ok(Self {
            music_dir,
            credential_file,
            host,
            port,
            logging_level,
            download_timeout_secs,
            max_filename_length,
            cover_size,
            search_page_size,
            catalog_fetch_limit,
            cleanup,
            credential_check,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
