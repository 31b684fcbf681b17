//! Periodic maintenance loops.
//!
//! Each janitor owns one recurring chore. They all run on the same shape of
//! loop: a tokio interval gated by a shared cancellation token, so shutdown
//! stops every loop at its next await point.

mod cleanup;
mod credential_check;

pub use cleanup::{CleanupJanitor, CleanupStatus};
pub use credential_check::CredentialCheckJanitor;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One recurring maintenance chore.
#[async_trait]
pub trait Janitor: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// One pass of the chore. Errors are logged, never fatal.
    async fn run_once(&self) -> anyhow::Result<()>;
}

/// Spawn a looping task per janitor. Loops end when `token` is cancelled.
pub fn spawn_janitors(janitors: Vec<Arc<dyn Janitor>>, token: CancellationToken) {
    for janitor in janitors {
        let token = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(janitor.interval());
            // First tick fires immediately, skip it.
            interval.tick().await;
            info!(
                "Janitor {} scheduled every {:?}",
                janitor.name(),
                janitor.interval()
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Janitor {} stopping", janitor.name());
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = janitor.run_once().await {
                            warn!("Janitor {} failed: {:#}", janitor.name(), e);
                        }
                    }
                }
            }
        });
    }
}

pub(crate) fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJanitor {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Janitor for CountingJanitor {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run_once(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn loop_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        spawn_janitors(
            vec![Arc::new(CountingJanitor { runs: runs.clone() })],
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_cancel = runs.load(Ordering::SeqCst);
        assert!(after_cancel >= 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }
}
