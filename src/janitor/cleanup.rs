//! Sweeps downloaded files out of the music directory.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use super::{now_stamp, Janitor};

#[derive(Debug, Clone, Serialize)]
pub struct CleanupStatus {
    pub enabled: bool,
    pub interval_secs: u64,
    pub retention_secs: u64,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub files_cleaned: usize,
    pub total_cleaned: usize,
}

#[derive(Default)]
struct SweepLog {
    last_run: Option<String>,
    next_run: Option<String>,
    files_cleaned: usize,
    total_cleaned: usize,
}

pub struct CleanupJanitor {
    music_dir: PathBuf,
    /// Never swept, even when it lives inside the music directory.
    credential_file: PathBuf,
    interval: Duration,
    retention: Duration,
    enabled: AtomicBool,
    log: Mutex<SweepLog>,
}

impl CleanupJanitor {
    pub fn new(
        music_dir: PathBuf,
        credential_file: PathBuf,
        interval_secs: u64,
        retention_secs: u64,
        enabled: bool,
    ) -> Self {
        Self {
            music_dir,
            credential_file,
            interval: Duration::from_secs(interval_secs),
            retention: Duration::from_secs(retention_secs),
            enabled: AtomicBool::new(enabled),
            log: Mutex::new(SweepLog::default()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.store(enabled, Ordering::SeqCst);
        enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CleanupStatus {
        let log = self.log.lock().unwrap();
        CleanupStatus {
            enabled: self.is_enabled(),
            interval_secs: self.interval.as_secs(),
            retention_secs: self.retention.as_secs(),
            last_run: log.last_run.clone(),
            next_run: log.next_run.clone(),
            files_cleaned: log.files_cleaned,
            total_cleaned: log.total_cleaned,
        }
    }

    /// Delete regular files in the music dir older than `retention`.
    /// A zero retention clears everything.
    pub fn sweep(&self, retention: Duration) -> std::io::Result<usize> {
        let mut deleted = 0;
        for entry in std::fs::read_dir(&self.music_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path == self.credential_file {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            let expired = match age {
                Some(age) => age >= retention,
                // Unreadable mtime counts as stale.
                None => true,
            };
            if !expired {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
        Ok(deleted)
    }

    /// Delete every downloaded file right now, regardless of age or the
    /// enabled flag.
    pub fn clear_all(&self) -> std::io::Result<usize> {
        let deleted = self.sweep(Duration::ZERO)?;
        info!("Cleared {} files from {}", deleted, self.music_dir.display());
        let mut log = self.log.lock().unwrap();
        log.total_cleaned += deleted;
        Ok(deleted)
    }
}

#[async_trait]
impl Janitor for CleanupJanitor {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        let next_run = (chrono::Local::now() + chrono::Duration::from_std(self.interval)?)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        if !self.is_enabled() {
            let mut log = self.log.lock().unwrap();
            log.next_run = Some(next_run);
            return Ok(());
        }

        let deleted = self.sweep(self.retention)?;
        if deleted > 0 {
            info!("Cleanup removed {} files", deleted);
        }

        let mut log = self.log.lock().unwrap();
        log.last_run = Some(now_stamp());
        log.next_run = Some(next_run);
        log.files_cleaned = deleted;
        log.total_cleaned += deleted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn janitor(dir: &TempDir, retention_secs: u64) -> CleanupJanitor {
        CleanupJanitor::new(
            dir.path().to_path_buf(),
            dir.path().join("credential.json"),
            3600,
            retention_secs,
            true,
        )
    }

    #[tokio::test]
    async fn zero_retention_sweeps_everything_but_the_credential_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("b.flac"), b"x").unwrap();
        std::fs::write(dir.path().join("credential.json"), b"{}").unwrap();

        let janitor = janitor(&dir, 0);
        janitor.run_once().await.unwrap();

        assert!(!dir.path().join("a.mp3").exists());
        assert!(!dir.path().join("b.flac").exists());
        assert!(dir.path().join("credential.json").exists());

        let status = janitor.status();
        assert_eq!(status.files_cleaned, 2);
        assert_eq!(status.total_cleaned, 2);
        assert!(status.last_run.is_some());
    }

    #[tokio::test]
    async fn fresh_files_survive_an_age_based_sweep() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("recent.mp3"), b"x").unwrap();

        let janitor = janitor(&dir, 3600);
        janitor.run_once().await.unwrap();

        assert!(dir.path().join("recent.mp3").exists());
        assert_eq!(janitor.status().files_cleaned, 0);
    }

    #[tokio::test]
    async fn disabled_janitor_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.mp3"), b"x").unwrap();

        let janitor = janitor(&dir, 0);
        janitor.set_enabled(false);
        janitor.run_once().await.unwrap();

        assert!(dir.path().join("keep.mp3").exists());
        assert!(janitor.status().last_run.is_none());
    }

    #[test]
    fn clear_all_ignores_the_enabled_flag() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gone.mp3"), b"x").unwrap();

        let janitor = janitor(&dir, 3600);
        janitor.set_enabled(false);
        assert_eq!(janitor.clear_all().unwrap(), 1);
        assert!(!dir.path().join("gone.mp3").exists());
    }
}
