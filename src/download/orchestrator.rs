//! Drives a single download from URL resolution to tagged file on disk.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::models::{sanitize_filename, DownloadResult, QualityTier, SongInfo};
use crate::catalog::Catalog;
use crate::cover::CoverResolver;
use crate::credential::CredentialStore;
use crate::fetcher::ContentFetcher;
use crate::tagger;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("No playable source found for {0} at any quality")]
    AllTiersFailed(String),
    #[error("Failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct DownloadOrchestrator {
    catalog: Arc<dyn Catalog>,
    fetcher: Arc<dyn ContentFetcher>,
    credentials: Arc<CredentialStore>,
    covers: CoverResolver,
    music_dir: PathBuf,
    max_filename_length: usize,
}

impl DownloadOrchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fetcher: Arc<dyn ContentFetcher>,
        credentials: Arc<CredentialStore>,
        covers: CoverResolver,
        music_dir: PathBuf,
        max_filename_length: usize,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            credentials,
            covers,
            music_dir,
            max_filename_length,
        }
    }

    /// Download one song, walking quality tiers from best to worst.
    ///
    /// A file already on disk for a tier short-circuits the whole walk,
    /// including metadata work.
    pub async fn download(
        &self,
        song: &SongInfo,
        prefer_lossless: bool,
        want_metadata: bool,
    ) -> Result<DownloadResult, DownloadError> {
        let credential = self.credentials.current();

        for &tier in QualityTier::order(prefer_lossless) {
            let filename = sanitize_filename(
                &format!("{}{}", song.display_name(), tier.extension()),
                self.max_filename_length,
            );
            let filepath = self.music_dir.join(&filename);

            if filepath.exists() {
                debug!("{} already on disk, serving cached copy", filename);
                return Ok(DownloadResult {
                    filename,
                    quality: tier.label(),
                    filepath,
                    cached: true,
                    metadata_added: false,
                });
            }

            let url = match self
                .catalog
                .song_url(&song.mid, tier, credential.as_ref())
                .await
            {
                Ok(Some(url)) => url,
                Ok(None) => {
                    debug!("{} not available at {}", song.mid, tier.label());
                    continue;
                }
                Err(e) => {
                    warn!("URL resolution for {} at {} failed: {}", song.mid, tier.label(), e);
                    continue;
                }
            };

            let Some(content) = self.fetcher.fetch(&url).await else {
                continue;
            };

            tokio::fs::write(&filepath, &content).await?;
            info!(
                "Downloaded {} at {} ({} bytes)",
                filename,
                tier.label(),
                content.len()
            );

            let metadata_added = if want_metadata {
                self.add_metadata(&filepath, song).await
            } else {
                false
            };

            return Ok(DownloadResult {
                filename,
                quality: tier.label(),
                filepath,
                cached: false,
                metadata_added,
            });
        }

        Err(DownloadError::AllTiersFailed(song.display_name()))
    }

    /// Best-effort tagging; a failure here never fails the download.
    async fn add_metadata(&self, filepath: &std::path::Path, song: &SongInfo) -> bool {
        let lyrics = match self.catalog.lyrics(&song.mid).await {
            Ok(lyrics) => lyrics,
            Err(e) => {
                warn!("Lyric lookup for {} failed: {}", song.mid, e);
                None
            }
        };
        let cover = self.covers.resolve(song).await;

        match tagger::tag_file(filepath, song, lyrics.as_ref(), cover.as_ref()) {
            Ok(added) => added,
            Err(e) => {
                warn!("Tagging {} failed: {}", filepath.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::StubCatalog;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct StubFetcher {
        payload: Option<Vec<u8>>,
    }

    #[async_trait]
    impl ContentFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Option<Vec<u8>> {
            self.payload.clone()
        }
    }

    fn song() -> SongInfo {
        SongInfo {
            mid: "mid01".to_string(),
            name: "Song".to_string(),
            singers: "Artist".to_string(),
            ..Default::default()
        }
    }

    fn orchestrator(
        catalog: Arc<StubCatalog>,
        payload: Option<Vec<u8>>,
        dir: &TempDir,
    ) -> DownloadOrchestrator {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(StubFetcher { payload });
        let credentials = Arc::new(CredentialStore::new(
            dir.path().join("credential.json"),
            catalog.clone(),
            true,
        ));
        DownloadOrchestrator::new(
            catalog,
            fetcher.clone(),
            credentials,
            CoverResolver::new(fetcher, 800),
            dir.path().to_path_buf(),
            100,
        )
    }

    #[tokio::test]
    async fn cached_file_short_circuits_without_network() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Song - Artist.flac"), b"audio").unwrap();

        let catalog = Arc::new(StubCatalog::default());
        let orchestrator = orchestrator(catalog.clone(), None, &dir);

        let result = orchestrator.download(&song(), true, true).await.unwrap();
        assert!(result.cached);
        assert_eq!(result.quality, "FLAC");
        assert!(!result.metadata_added);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn walks_tiers_best_to_worst() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(StubCatalog::default());
        let orchestrator = orchestrator(catalog.clone(), None, &dir);

        let err = orchestrator.download(&song(), true, false).await.unwrap_err();
        assert!(matches!(err, DownloadError::AllTiersFailed(_)));
        assert_eq!(
            *catalog.attempted_tiers.lock().unwrap(),
            vec![QualityTier::Flac, QualityTier::Mp3_320, QualityTier::Mp3_128]
        );
    }

    #[tokio::test]
    async fn skips_lossless_when_not_preferred() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(StubCatalog::default());
        let orchestrator = orchestrator(catalog.clone(), None, &dir);

        let _ = orchestrator.download(&song(), false, false).await;
        assert_eq!(
            *catalog.attempted_tiers.lock().unwrap(),
            vec![QualityTier::Mp3_320, QualityTier::Mp3_128]
        );
    }

    #[tokio::test]
    async fn falls_back_to_lowest_available_tier() {
        let dir = TempDir::new().unwrap();
        let mut catalog = StubCatalog::default();
        catalog.urls.insert(
            QualityTier::Mp3_128,
            "https://stream.example/low".to_string(),
        );
        let catalog = Arc::new(catalog);
        let orchestrator = orchestrator(catalog.clone(), Some(vec![1u8; 4096]), &dir);

        let result = orchestrator.download(&song(), true, false).await.unwrap();
        assert!(!result.cached);
        assert_eq!(result.quality, "128kbps");
        assert_eq!(result.filename, "Song - Artist.mp3");
        assert_eq!(std::fs::read(&result.filepath).unwrap(), vec![1u8; 4096]);
    }
}
