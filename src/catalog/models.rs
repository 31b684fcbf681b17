//! Wire models for the external catalog and the search adapter.

use serde::{Deserialize, Serialize};

use crate::download::SongInfo;

/// Lyric payload returned by the catalog: plain lyric text and an optional
/// translation line-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lyrics {
    #[serde(default)]
    pub lyric: String,
    #[serde(default)]
    pub trans: String,
}

impl Lyrics {
    pub fn is_empty(&self) -> bool {
        self.lyric.is_empty() && self.trans.is_empty()
    }
}

/// Which identity provider backs a QR login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrLoginKind {
    Qq,
    Wx,
}

impl QrLoginKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qq" => Some(QrLoginKind::Qq),
            "wx" => Some(QrLoginKind::Wx),
            _ => None,
        }
    }
}

/// An issued login QR code: the PNG bytes to show the user plus the opaque
/// identifier the catalog wants back when polling.
#[derive(Debug, Clone)]
pub struct QrCode {
    pub kind: QrLoginKind,
    pub data: Vec<u8>,
    pub identifier: String,
}

/// One poll outcome for a pending QR login.
#[derive(Debug, Clone)]
pub enum QrLoginEvent {
    Waiting,
    Scanned,
    Done(crate::credential::Credential),
    Timeout,
    Refused,
}

/// Pagination envelope for search responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub total_pages: usize,
    pub total_results: usize,
}

/// One page of adapted search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<SongInfo>,
    pub pagination: Pagination,
}

/// Convert a raw catalog search hit into the stable `SongInfo` shape.
///
/// The raw record is kept attached so later stages (the cover heuristic)
/// can read fields the adapter doesn't surface.
pub fn song_from_raw_hit(hit: &serde_json::Value) -> SongInfo {
    let singers = hit
        .get("singer")
        .and_then(|s| s.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.get("name").and_then(|n| n.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let str_field = |v: &serde_json::Value, key: &str| {
        v.get(key)
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string()
    };

    SongInfo {
        mid: str_field(hit, "mid"),
        name: str_field(hit, "title"),
        singers,
        vip: hit
            .pointer("/pay/pay_play")
            .and_then(|p| p.as_i64())
            .unwrap_or(0)
            != 0,
        album: hit
            .pointer("/album/name")
            .and_then(|a| a.as_str())
            .unwrap_or_default()
            .to_string(),
        album_mid: hit
            .pointer("/album/mid")
            .and_then(|a| a.as_str())
            .unwrap_or_default()
            .to_string(),
        interval: hit.get("interval").and_then(|i| i.as_u64()).unwrap_or(0),
        raw: Some(hit.clone()),
    }
}

/// Slice one page out of the full result set, clamping the requested page
/// into the valid range.
pub fn paginate(results: Vec<SongInfo>, page: usize, page_size: usize) -> SearchPage {
    let total_results = results.len();
    let total_pages = total_results.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let results: Vec<SongInfo> = results.into_iter().skip(start).take(page_size).collect();

    SearchPage {
        results,
        pagination: Pagination {
            current_page: page,
            has_prev: page > 1,
            has_next: page < total_pages,
            total_pages,
            total_results,
        },
    }
}
