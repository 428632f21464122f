//! Periodic balance refresh while a session is connected.
//!
//! Fetch, then wait: the next refresh is armed only after the previous one
//! settled, so at most one `get_balance` is outstanding. Leaving the
//! connected state (or switching accounts) interrupts the wait immediately.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::WeakController;
use crate::domain::{AccountId, WalletSession};
use crate::ports::{NavigatorPort, RpcPort, WalletProviderPort};

/// Stop handle for a spawned [`BalancePoller`].
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(self) {
        self.token.cancel();
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub(crate) struct BalancePoller<P, R, N> {
    controller: WeakController<P, R, N>,
    session: watch::Receiver<WalletSession>,
    interval: Duration,
}

enum Wake {
    Tick,
    SessionChanged,
    Stop,
}

impl<P, R, N> BalancePoller<P, R, N>
where
    P: WalletProviderPort,
    R: RpcPort,
    N: NavigatorPort,
{
    pub(crate) fn new(
        controller: WeakController<P, R, N>,
        session: watch::Receiver<WalletSession>,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            session,
            interval,
        }
    }

    pub(crate) fn spawn(self, runtime: &Handle, token: CancellationToken) -> PollerHandle {
        let join = runtime.spawn(self.run(token.clone()));
        PollerHandle { token, join }
    }

    async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "balance poller starting"
        );

        loop {
            let Some(account) = self.wait_connected(&shutdown).await else {
                break;
            };

            let Some(controller) = self.controller.upgrade() else {
                break;
            };
            if let Err(e) = controller.refresh_balance().await {
                debug!(%account, error = %e, "poller refresh failed");
            }
            drop(controller);

            let next = Instant::now() + self.interval;
            loop {
                match self.wait(next, &shutdown).await {
                    Wake::Stop => {
                        info!("balance poller stopped");
                        return;
                    }
                    Wake::Tick => break,
                    Wake::SessionChanged => {
                        let current = self.session.borrow_and_update().clone();
                        if !current.is_connected() || current.account != Some(account) {
                            debug!(%account, "session changed, poll schedule cancelled");
                            break;
                        }
                    }
                }
            }
        }
        info!("balance poller stopped");
    }

    async fn wait_connected(&mut self, shutdown: &CancellationToken) -> Option<AccountId> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            {
                let current = self.session.borrow_and_update();
                if current.is_connected() {
                    if let Some(account) = current.account {
                        return Some(account);
                    }
                }
            }
            tokio::select! {
                changed = self.session.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    async fn wait(&mut self, until: Instant, shutdown: &CancellationToken) -> Wake {
        tokio::select! {
            _ = shutdown.cancelled() => Wake::Stop,
            _ = tokio::time::sleep_until(until) => Wake::Tick,
            changed = self.session.changed() => match changed {
                Ok(()) => Wake::SessionChanged,
                Err(_) => Wake::Stop,
            },
        }
    }
}
