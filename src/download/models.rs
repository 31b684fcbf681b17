//! Data models for the download orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One audio encoding variant offered by the catalog, in descending quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    Flac,
    Mp3_320,
    Mp3_128,
}

impl QualityTier {
    /// File extension the catalog serves for this tier, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            QualityTier::Flac => ".flac",
            QualityTier::Mp3_320 => ".mp3",
            QualityTier::Mp3_128 => ".mp3",
        }
    }

    /// Human-readable quality label used in API responses.
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Flac => "FLAC",
            QualityTier::Mp3_320 => "320kbps",
            QualityTier::Mp3_128 => "128kbps",
        }
    }

    /// The fallback order for a download attempt, highest quality first.
    pub fn order(prefer_lossless: bool) -> &'static [QualityTier] {
        if prefer_lossless {
            &[QualityTier::Flac, QualityTier::Mp3_320, QualityTier::Mp3_128]
        } else {
            &[QualityTier::Mp3_320, QualityTier::Mp3_128]
        }
    }
}

/// A song as submitted by a client or produced by the search adapter.
///
/// `raw` carries the untouched catalog record; the cover heuristic reads
/// alternate image identifiers out of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongInfo {
    pub mid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub singers: String,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_mid: String,
    #[serde(default)]
    pub interval: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl SongInfo {
    /// The display name the target file is derived from.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.name, self.singers)
    }
}

/// Outcome of one successful download attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub filename: String,
    pub quality: &'static str,
    pub filepath: PathBuf,
    pub cached: bool,
    pub metadata_added: bool,
}

const ILLEGAL_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace filesystem-hostile characters with `_` and cap the length,
/// keeping the extension intact when truncating.
pub fn sanitize_filename(filename: &str, max_length: usize) -> String {
    let mut sanitized: String = filename
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.chars().count() > max_length {
        let (stem, ext) = match sanitized.rfind('.') {
            Some(idx) if idx > 0 => (sanitized[..idx].to_string(), sanitized[idx..].to_string()),
            _ => (sanitized.clone(), String::new()),
        };
        let ext_len = ext.chars().count();
        let keep = max_length.saturating_sub(ext_len);
        let stem: String = stem.chars().take(keep).collect();
        sanitized = format!("{}{}", stem, ext);
    }

    sanitized
}
