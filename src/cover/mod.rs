//! Resolves album cover art for a song.
//!
//! The catalog serves covers from two CDN layouts. Albums with a proper
//! `album_mid` have a deterministic URL. Songs without one sometimes carry
//! usable identifiers in their `vs` field, which we try in priority order
//! until one yields a real image.

use std::sync::Arc;
use tracing::debug;

use crate::download::SongInfo;
use crate::fetcher::ContentFetcher;

/// A cover image that has already been fetched and validated.
pub struct CoverArt {
    pub url: String,
    pub data: Vec<u8>,
}

pub struct CoverResolver {
    fetcher: Arc<dyn ContentFetcher>,
    size: u32,
}

impl CoverResolver {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, size: u32) -> Self {
        Self { fetcher, size }
    }

    /// Try each candidate URL in order, keeping the first real image.
    pub async fn resolve(&self, song: &SongInfo) -> Option<CoverArt> {
        for url in cover_candidates(song, self.size) {
            if let Some(data) = self.fetcher.fetch(&url).await {
                if is_image(&data) {
                    debug!("Resolved cover for {} from {}", song.mid, url);
                    return Some(CoverArt { url, data });
                }
                debug!("Candidate {} is not an image, skipping", url);
            }
        }
        None
    }
}

/// Candidate cover URLs for a song, most promising first.
pub fn cover_candidates(song: &SongInfo, size: u32) -> Vec<String> {
    let mut urls = Vec::new();
    if !song.album_mid.is_empty() {
        urls.push(format!(
            "https://y.gtimg.cn/music/photo_new/T002R{s}x{s}M000{mid}.jpg",
            s = size,
            mid = song.album_mid,
        ));
    }

    let (high, medium) = vs_candidates(&vs_values(song));
    for vs in high.into_iter().chain(medium) {
        urls.push(format!(
            "https://y.qq.com/music/photo_new/T062R{s}x{s}M000{vs}.jpg",
            s = size,
            vs = vs,
        ));
    }
    urls
}

fn vs_values(song: &SongInfo) -> Vec<String> {
    song.raw
        .as_ref()
        .and_then(|raw| raw.pointer("/vs"))
        .and_then(|vs| vs.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Split `vs` entries into (high, medium) priority identifier lists.
///
/// A standalone value is more likely to be a cover id than one packed
/// into a comma-separated list, so those are tried first.
fn vs_candidates(values: &[String]) -> (Vec<String>, Vec<String>) {
    let mut high = Vec::new();
    let mut medium = Vec::new();
    for value in values {
        if value.contains(',') {
            for part in value.split(',') {
                let part = part.trim();
                if part.len() >= 3 {
                    medium.push(part.to_string());
                }
            }
        } else if value.len() >= 3 {
            high.push(value.clone());
        }
    }
    (high, medium)
}

/// Only JPEG and PNG payloads count as cover art.
pub fn is_image(data: &[u8]) -> bool {
    match infer::get(data) {
        Some(kind) => matches!(kind.mime_type(), "image/jpeg" | "image/png"),
        None => false,
    }
}
