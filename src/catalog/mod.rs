//! Interface to the external music catalog.
//!
//! Everything the service knows about the upstream catalog goes through the
//! [`Catalog`] trait; the HTTP implementation lives in [`client`].

mod client;
pub mod models;

pub use client::HttpCatalog;
pub use models::{paginate, song_from_raw_hit, Lyrics, Pagination, QrCode, QrLoginEvent, QrLoginKind, SearchPage};

use crate::credential::Credential;
use crate::download::{QualityTier, SongInfo};
use anyhow::Result;
use async_trait::async_trait;

/// Seam to the external catalog service: search, playback URL resolution,
/// lyrics, credential lifecycle and QR login.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Keyword search returning up to `limit` adapted hits.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SongInfo>>;

    /// Resolve a signed playback URL for one song at one quality tier.
    ///
    /// `Ok(None)` means the catalog has no playable URL at this tier for the
    /// current (possibly absent) credential; callers fall through to the
    /// next tier.
    async fn song_url(
        &self,
        mid: &str,
        tier: QualityTier,
        credential: Option<&Credential>,
    ) -> Result<Option<String>>;

    /// Fetch lyrics for a song. `Ok(None)` when the catalog has none.
    async fn lyrics(&self, mid: &str) -> Result<Option<Lyrics>>;

    /// Ask the catalog whether a credential is still accepted.
    async fn check_expired(&self, credential: &Credential) -> Result<bool>;

    /// Exchange an expired credential for a fresh one. `Ok(None)` when the
    /// catalog refuses the refresh.
    async fn refresh_credential(&self, credential: &Credential) -> Result<Option<Credential>>;

    /// Issue a login QR code for the given provider.
    async fn request_qrcode(&self, kind: QrLoginKind) -> Result<QrCode>;

    /// Poll a previously issued QR code once.
    async fn poll_qrcode(&self, qr: &QrCode) -> Result<QrLoginEvent>;
}
