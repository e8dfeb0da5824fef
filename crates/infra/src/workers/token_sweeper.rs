use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use keystone_auth::{CredentialStore, TokenManager};

/// Handle to stop and join a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the task to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Periodically removes expired refresh tokens.
///
/// The first sweep runs immediately. Failures are logged and the loop keeps
/// going.
#[derive(Debug, Clone, Copy)]
pub struct TokenSweeper {
    pub interval: Duration,
}

impl TokenSweeper {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn<S>(self, tokens: TokenManager<S>) -> SweeperHandle
    where
        S: CredentialStore + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(sweep_loop(self.interval, tokens, shutdown_rx));

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

async fn sweep_loop<S>(interval: Duration, tokens: TokenManager<S>, mut shutdown_rx: oneshot::Receiver<()>)
where
    S: CredentialStore + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                match tokens.delete_expired_refresh_tokens().await {
                    Ok(removed) => debug!(removed, "token sweep finished"),
                    Err(err) => warn!(error = %err, "token sweep failed"),
                }
            }
        }
    }
}
