use axum::extract::FromRef;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::credential::CredentialStore;
use crate::download::DownloadOrchestrator;
use crate::janitor::CleanupJanitor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::admin::QrSession;

pub type GuardedCatalog = Arc<dyn Catalog>;
pub type GuardedCredentialStore = Arc<CredentialStore>;
pub type GuardedOrchestrator = Arc<DownloadOrchestrator>;
pub type GuardedCleanup = Arc<CleanupJanitor>;
pub type GuardedQrSessions = Arc<Mutex<HashMap<String, QrSession>>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: AppConfig,
    pub start_time: Instant,
    pub catalog: GuardedCatalog,
    pub credentials: GuardedCredentialStore,
    pub orchestrator: GuardedOrchestrator,
    pub cleanup: GuardedCleanup,
    pub qr_sessions: GuardedQrSessions,
    pub hash: String,
}

impl ServerState {
    pub fn new(
        config: AppConfig,
        catalog: GuardedCatalog,
        credentials: GuardedCredentialStore,
        orchestrator: GuardedOrchestrator,
        cleanup: GuardedCleanup,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            catalog,
            credentials,
            orchestrator,
            cleanup,
            qr_sessions: Arc::new(Mutex::new(HashMap::new())),
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedCatalog {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog.clone()
    }
}

impl FromRef<ServerState> for GuardedCredentialStore {
    fn from_ref(input: &ServerState) -> Self {
        input.credentials.clone()
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for GuardedCleanup {
    fn from_ref(input: &ServerState) -> Self {
        input.cleanup.clone()
    }
}

impl FromRef<ServerState> for GuardedQrSessions {
    fn from_ref(input: &ServerState) -> Self {
        input.qr_sessions.clone()
    }
}

impl FromRef<ServerState> for AppConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
