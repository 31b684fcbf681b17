use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub music_dir: Option<String>,
    pub credential_file: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub download_timeout_secs: Option<u64>,
    pub max_filename_length: Option<usize>,
    pub cover_size: Option<u32>,
    pub search_page_size: Option<usize>,
    pub catalog_fetch_limit: Option<usize>,

    // Feature configs
    pub cleanup: Option<CleanupConfig>,
    pub credential_check: Option<CredentialCheckConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    /// Files younger than this are spared; 0 deletes everything on each pass.
    pub retention_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CredentialCheckConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
