//! Credential lifecycle: load from disk, expiry checks, refresh, persist.
//!
//! Every failure in here degrades the session to free-tier instead of
//! propagating; the request path must never die because of a stale token.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::catalog::Catalog;

/// Auth token bundle issued by the catalog's login flow.
///
/// Stored as JSON on disk; treated as opaque outside this module and the
/// catalog client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub musicid: i64,
    pub musickey: String,
    #[serde(default)]
    pub refresh_key: Option<String>,
    #[serde(default)]
    pub encrypt_uin: Option<String>,
    #[serde(default)]
    pub login_type: u8,
}

impl Credential {
    /// Refreshing needs a refresh key; tokens without one can only be
    /// replaced by a new login.
    pub fn can_refresh(&self) -> bool {
        self.refresh_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Observable snapshot of the credential lifecycle, served by the status
/// endpoint and updated on every transition.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub enabled: bool,
    pub last_check: Option<String>,
    pub last_refresh: Option<String>,
    pub status: String,
    pub expired: bool,
}

impl Default for CredentialStatus {
    fn default() -> Self {
        Self {
            enabled: true,
            last_check: None,
            last_refresh: None,
            status: "no credential detected".to_string(),
            expired: true,
        }
    }
}

fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Owns the process-wide credential and its status snapshot.
///
/// Both live behind their own mutex; updates are whole-value replacements so
/// readers racing a janitor tick at worst see a stale snapshot.
pub struct CredentialStore {
    path: PathBuf,
    catalog: Arc<dyn Catalog>,
    credential: Mutex<Option<Credential>>,
    status: Mutex<CredentialStatus>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, catalog: Arc<dyn Catalog>, enabled: bool) -> Self {
        let status = CredentialStatus {
            enabled,
            ..Default::default()
        };
        Self {
            path: path.into(),
            catalog,
            credential: Mutex::new(None),
            status: Mutex::new(status),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory credential, if a valid one is loaded.
    pub fn current(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }

    pub fn status(&self) -> CredentialStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        let mut status = self.status.lock().unwrap();
        status.enabled = enabled;
        status.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.status.lock().unwrap().enabled
    }

    /// Deserialize the stored credential, if the file exists.
    pub fn load(&self) -> Option<Credential> {
        if !self.path.exists() {
            return None;
        }
        match std::fs::read_to_string(&self.path)
            .context("reading credential file")
            .and_then(|text| {
                serde_json::from_str::<Credential>(&text).context("parsing credential file")
            }) {
            Ok(cred) => Some(cred),
            Err(err) => {
                error!("Failed to load credential file: {:#}", err);
                None
            }
        }
    }

    /// Persist a credential, creating the parent directory when needed.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating credential directory {:?}", parent))?;
        }
        let text = serde_json::to_string_pretty(credential)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing credential file {:?}", self.path))
    }

    /// Install a freshly issued credential (QR login completion) and persist it.
    pub fn install(&self, credential: Credential) {
        if let Err(err) = self.save(&credential) {
            error!("Failed to persist new credential: {:#}", err);
        }
        *self.credential.lock().unwrap() = Some(credential);
        self.update_status(|s| {
            s.status = "logged in with fresh credential".to_string();
            s.expired = false;
        });
    }

    /// Drop the in-memory credential. The stored file is left in place so a
    /// later external re-login can retry.
    pub fn clear(&self) {
        *self.credential.lock().unwrap() = None;
        self.update_status(|s| {
            s.status = "credential cleared".to_string();
            s.expired = true;
        });
    }

    /// Startup path: load the stored credential, verify expiry against the
    /// catalog, refresh if needed. Returns the usable credential, if any.
    pub async fn load_and_refresh(&self) -> Option<Credential> {
        if !self.path.exists() {
            info!("No credential file, free-tier downloads only");
            self.update_status(|s| {
                s.status = "no credential file, free-tier downloads only".to_string();
                s.expired = true;
            });
            return None;
        }

        let Some(cred) = self.load() else {
            self.update_status(|s| {
                s.status = "failed to load credential, free-tier downloads only".to_string();
                s.expired = true;
            });
            return None;
        };

        match self.catalog.check_expired(&cred).await {
            Ok(false) => {
                info!("Stored credential accepted by catalog");
                self.update_status(|s| {
                    s.status = "logged in with stored credential".to_string();
                    s.expired = false;
                });
                *self.credential.lock().unwrap() = Some(cred.clone());
                Some(cred)
            }
            Ok(true) => {
                info!("Stored credential expired, attempting refresh");
                self.update_status(|s| {
                    s.status = "credential expired, attempting refresh".to_string();
                });
                self.try_refresh(cred).await
            }
            Err(err) => {
                error!("Credential expiry check failed: {:#}", err);
                self.update_status(|s| {
                    s.status = format!("credential check error: {err}, continuing unauthenticated");
                    s.expired = true;
                });
                None
            }
        }
    }

    /// Periodic path, driven by the credential janitor. No-op when toggled
    /// off. Re-runs the load path when no credential is in memory.
    pub async fn check_and_refresh(&self) {
        if !self.is_enabled() {
            return;
        }

        self.update_status(|s| s.last_check = Some(now_stamp()));

        let Some(cred) = self.current() else {
            self.load_and_refresh().await;
            return;
        };

        match self.catalog.check_expired(&cred).await {
            Ok(false) => {
                self.update_status(|s| {
                    s.status = "credential ok".to_string();
                    s.expired = false;
                });
            }
            Ok(true) => {
                info!("Credential expired during periodic check, attempting refresh");
                self.update_status(|s| {
                    s.status = "credential expired, attempting refresh".to_string();
                    s.expired = true;
                });
                self.try_refresh(cred).await;
            }
            Err(err) => {
                error!("Credential check failed: {:#}", err);
                self.update_status(|s| {
                    s.status = format!("credential check error: {err}");
                    s.expired = true;
                });
            }
        }
    }

    /// Attempt a refresh; on success persist and promote, on failure demote
    /// to unauthenticated without touching the stored file.
    async fn try_refresh(&self, cred: Credential) -> Option<Credential> {
        if !cred.can_refresh() {
            info!("Credential does not support refresh, continuing unauthenticated");
            self.demote_after_failed_refresh();
            return None;
        }

        match self.catalog.refresh_credential(&cred).await {
            Ok(Some(refreshed)) => {
                info!("Credential refreshed");
                if let Err(err) = self.save(&refreshed) {
                    error!("Refreshed credential could not be persisted: {:#}", err);
                }
                *self.credential.lock().unwrap() = Some(refreshed.clone());
                self.update_status(|s| {
                    s.status = "credential refreshed".to_string();
                    s.expired = false;
                    s.last_refresh = Some(now_stamp());
                });
                Some(refreshed)
            }
            Ok(None) => {
                info!("Catalog rejected the refresh, continuing unauthenticated");
                self.demote_after_failed_refresh();
                None
            }
            Err(err) => {
                error!("Credential refresh failed: {:#}", err);
                self.demote_after_failed_refresh();
                None
            }
        }
    }

    fn demote_after_failed_refresh(&self) {
        *self.credential.lock().unwrap() = None;
        self.update_status(|s| {
            s.status =
                "credential refresh unsupported or failed, continuing unauthenticated".to_string();
            s.expired = true;
        });
    }

    fn update_status(&self, f: impl FnOnce(&mut CredentialStatus)) {
        let mut status = self.status.lock().unwrap();
        f(&mut status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::StubCatalog;
    use tempfile::TempDir;

    fn cred(refresh_key: Option<&str>) -> Credential {
        Credential {
            musicid: 42,
            musickey: "key".to_string(),
            refresh_key: refresh_key.map(|s| s.to_string()),
            encrypt_uin: None,
            login_type: 1,
        }
    }

    fn store_with(dir: &TempDir, catalog: StubCatalog) -> CredentialStore {
        CredentialStore::new(dir.path().join("credential.json"), Arc::new(catalog), true)
    }

    #[tokio::test]
    async fn missing_file_means_free_tier() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, StubCatalog::default());

        assert!(store.load_and_refresh().await.is_none());
        let status = store.status();
        assert!(status.expired);
        assert!(status.status.contains("free-tier"));
    }

    #[tokio::test]
    async fn valid_credential_is_loaded() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, StubCatalog::default());
        store.save(&cred(None)).unwrap();

        let loaded = store.load_and_refresh().await;
        assert_eq!(loaded, Some(cred(None)));
        assert!(!store.status().expired);
        assert_eq!(store.current(), Some(cred(None)));
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_persisted() {
        let dir = TempDir::new().unwrap();
        let refreshed = Credential {
            musickey: "new-key".to_string(),
            ..cred(Some("rk"))
        };
        let catalog = StubCatalog {
            expired: true,
            refreshed: Some(refreshed.clone()),
            ..Default::default()
        };
        let store = store_with(&dir, catalog);
        store.save(&cred(Some("rk"))).unwrap();

        let loaded = store.load_and_refresh().await;
        assert_eq!(loaded, Some(refreshed.clone()));
        assert_eq!(store.load(), Some(refreshed));
        let status = store.status();
        assert!(!status.expired);
        assert!(status.last_refresh.is_some());
    }

    #[tokio::test]
    async fn failed_refresh_demotes_but_keeps_file() {
        let dir = TempDir::new().unwrap();
        let catalog = StubCatalog {
            expired: true,
            refreshed: None,
            ..Default::default()
        };
        let store = store_with(&dir, catalog);
        store.save(&cred(Some("rk"))).unwrap();

        assert!(store.load_and_refresh().await.is_none());
        assert!(store.status().expired);
        assert!(store.current().is_none());
        // the stored file survives so an external re-login can retry
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn refresh_without_refresh_key_is_not_attempted() {
        let dir = TempDir::new().unwrap();
        let catalog = StubCatalog {
            expired: true,
            refreshed: Some(cred(None)),
            ..Default::default()
        };
        let store = store_with(&dir, catalog);
        store.save(&cred(None)).unwrap();

        assert!(store.load_and_refresh().await.is_none());
        assert!(store.status().expired);
    }

    #[tokio::test]
    async fn periodic_check_is_noop_when_disabled() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, StubCatalog::default());
        store.set_enabled(false);

        store.check_and_refresh().await;
        assert!(store.status().last_check.is_none());
    }
}
