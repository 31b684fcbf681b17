//! Keeps the stored credential fresh.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::Janitor;
use crate::credential::CredentialStore;

pub struct CredentialCheckJanitor {
    store: Arc<CredentialStore>,
    interval: Duration,
}

impl CredentialCheckJanitor {
    pub fn new(store: Arc<CredentialStore>, interval_secs: u64) -> Self {
        Self {
            store,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

#[async_trait]
impl Janitor for CredentialCheckJanitor {
    fn name(&self) -> &'static str {
        "credential-check"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.store.check_and_refresh().await;
        Ok(())
    }
}
