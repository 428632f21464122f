//! Wallet session lifecycle: connect, disconnect, balance refresh and the
//! mirroring of provider events into [`WalletSession`].
//!
//! Every async continuation carries a [`Ticket`] taken before its first
//! `.await`. The ticket is the session epoch at that moment; connect
//! attempts, disconnects, identity-changing provider events and teardown
//! all bump the epoch, so a result that arrives afterwards is dropped
//! instead of overwriting newer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deep_link::{browse_link, is_mobile_user_agent};
use crate::domain::{
    lamports_to_sol, AccountId, ConnectionStatus, ControllerConfig, WalletSession,
};
use crate::error::SessionError;
use crate::poller::{BalancePoller, PollerHandle};
use crate::ports::{
    NavigatorPort, PortError, ProviderEvent, RpcPort, Subscription, WalletProviderPort,
};
use crate::state_machine::{session_transition, SessionAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(AccountId),
    /// A connect is already in flight or the session is already connected.
    AlreadyActive,
    /// No provider in the page; the user was sent to the wallet's universal link.
    Redirected(String),
    /// The attempt was superseded (disconnect, provider event or teardown).
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshOutcome {
    /// New balance in SOL.
    Updated(f64),
    Discarded,
}

pub(crate) struct Inner {
    pub(crate) session: WalletSession,
    epoch: u64,
    torn_down: bool,
}

impl Inner {
    pub(crate) fn is_current(&self, ticket: Ticket) -> bool {
        !self.torn_down && self.epoch == ticket.0
    }

    fn bump(&mut self) -> Ticket {
        self.epoch = self.epoch.wrapping_add(1);
        Ticket(self.epoch)
    }

    fn apply(&mut self, action: SessionAction) -> bool {
        match session_transition(self.session.status, action) {
            Ok(t) => {
                debug!(from = ?t.from, to = ?t.to, reason = t.reason, "session transition");
                self.session.status = t.to;
                true
            }
            Err(e) => {
                debug!(error = %e, "session transition ignored");
                false
            }
        }
    }
}

/// Session state plus the channel that publishes it. Mutations go through
/// [`SessionCell::update`], which only notifies watchers when the visible
/// session actually changed.
pub(crate) struct SessionCell {
    inner: Mutex<Inner>,
    tx: watch::Sender<WalletSession>,
}

impl SessionCell {
    fn new(session: WalletSession) -> Self {
        let (tx, _) = watch::channel(session.clone());
        Self {
            inner: Mutex::new(Inner {
                session,
                epoch: 0,
                torn_down: false,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> WalletSession {
        self.lock().session.clone()
    }

    /// Publishes while the lock is held so concurrent updates reach the
    /// channel in the same order they were applied.
    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut g = self.lock();
        let out = f(&mut g);
        let next = &g.session;
        self.tx.send_if_modified(|current| {
            if current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        out
    }

    /// Ticket and account when the session permits account operations.
    pub(crate) fn connected_ticket(&self) -> Option<(Ticket, AccountId)> {
        let g = self.lock();
        if g.torn_down || g.session.status != ConnectionStatus::Connected {
            return None;
        }
        g.session.account.map(|account| (Ticket(g.epoch), account))
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    /// Records a status line unless `ticket` went stale.
    pub(crate) fn message_if_current(&self, ticket: Ticket, message: impl Into<String>) -> bool {
        self.update(|inner| {
            if !inner.is_current(ticket) {
                return false;
            }
            inner.session.last_message = message.into();
            true
        })
    }

    fn on_provider_event(&self, event: ProviderEvent) {
        self.update(|inner| {
            if inner.torn_down {
                return;
            }
            match event {
                ProviderEvent::Connect(account) => {
                    let previous = inner.session.status;
                    let identity_changed = previous != ConnectionStatus::Connected
                        || inner.session.account != Some(account);
                    if !inner.apply(SessionAction::ProviderConnected) {
                        return;
                    }
                    if identity_changed {
                        // A pending connect() keeps its ticket: wallets emit
                        // `connect` just before resolving the request.
                        if previous != ConnectionStatus::Connecting {
                            inner.bump();
                        }
                        inner.session.account = Some(account);
                        inner.session.balance = None;
                        inner.session.last_message = "Connected".to_owned();
                        info!(%account, "provider connect event");
                    }
                }
                ProviderEvent::Disconnect => {
                    if inner.session.status == ConnectionStatus::Disconnected {
                        return;
                    }
                    inner.bump();
                    inner.apply(SessionAction::ProviderDisconnected);
                    inner.session.reset("Disconnected");
                    info!("provider disconnect event");
                }
            }
        });
    }
}

#[derive(Default)]
struct Resources {
    subscription: Option<Subscription>,
    poller: Option<PollerHandle>,
}

struct Shared<P, R, N> {
    provider: Option<P>,
    rpc: R,
    navigator: N,
    config: ControllerConfig,
    cell: Arc<SessionCell>,
    resources: Mutex<Resources>,
    shutdown: CancellationToken,
}

impl<P, R, N> Drop for Shared<P, R, N> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Owns one wallet session for the lifetime of the page (or component).
///
/// Cheap to clone; clones share the same session. Dropping the last clone
/// releases the provider subscription and stops the balance poller, as does
/// an explicit [`WalletSessionController::teardown`].
pub struct WalletSessionController<P, R, N> {
    shared: Arc<Shared<P, R, N>>,
}

impl<P, R, N> Clone for WalletSessionController<P, R, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, R, N> WalletSessionController<P, R, N>
where
    P: WalletProviderPort,
    R: RpcPort,
    N: NavigatorPort,
{
    /// Mounts a session. Balance polling needs a Tokio runtime; outside one
    /// the session works but the poller is not started.
    pub fn mount(provider: Option<P>, rpc: R, navigator: N, config: ControllerConfig) -> Self {
        let wallet_name = provider.as_ref().map(|p| p.name().to_owned());
        let cell = Arc::new(SessionCell::new(WalletSession {
            wallet_name,
            ..WalletSession::default()
        }));

        let mut resources = Resources::default();
        if let Some(provider) = provider.as_ref() {
            let weak: Weak<SessionCell> = Arc::downgrade(&cell);
            resources.subscription = Some(provider.subscribe(Arc::new(move |event: ProviderEvent| {
                if let Some(cell) = weak.upgrade() {
                    cell.on_provider_event(event);
                }
            })));

            if provider.is_connected() {
                if let Some(account) = provider.current_account() {
                    cell.update(|inner| {
                        inner.bump();
                        inner.apply(SessionAction::ProviderConnected);
                        inner.session.account = Some(account);
                        inner.session.last_message = "Connected".to_owned();
                    });
                    info!(%account, "adopted existing wallet session");
                }
            }
        }

        let controller = Self {
            shared: Arc::new(Shared {
                provider,
                rpc,
                navigator,
                config,
                cell,
                resources: Mutex::new(Resources::default()),
                shutdown: CancellationToken::new(),
            }),
        };

        if controller.shared.config.poll_balance {
            match Handle::try_current() {
                Ok(runtime) => {
                    let poller = BalancePoller::new(
                        controller.downgrade(),
                        controller.subscribe(),
                        controller.shared.config.balance_poll_interval,
                    );
                    resources.poller =
                        Some(poller.spawn(&runtime, controller.shared.shutdown.child_token()));
                }
                Err(e) => warn!(error = %e, "no tokio runtime, balance polling disabled"),
            }
        }
        *controller.resources() = resources;

        controller
    }

    pub fn snapshot(&self) -> WalletSession {
        self.shared.cell.snapshot()
    }

    /// Receives every visible change to the session.
    pub fn subscribe(&self) -> watch::Receiver<WalletSession> {
        self.shared.cell.tx.subscribe()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    pub fn has_provider(&self) -> bool {
        self.shared.provider.is_some()
    }

    /// Where to send the user when no wallet is installed.
    pub fn install_hint(&self) -> Option<&str> {
        if self.shared.provider.is_some() {
            None
        } else {
            Some(self.shared.config.install_url.as_str())
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.cell.is_torn_down()
    }

    /// Whether a balance poller is running for this session.
    pub fn is_polling(&self) -> bool {
        self.resources()
            .poller
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    pub async fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let name = self.shared.config.wallet_name.clone();
        let Some(provider) = self.shared.provider.as_ref() else {
            return self.connect_without_provider(&name);
        };

        enum Start {
            Go(Ticket),
            Busy,
            TornDown,
        }
        let start = self.shared.cell.update(|inner| {
            if inner.torn_down {
                return Start::TornDown;
            }
            if !inner.apply(SessionAction::Connect) {
                return Start::Busy;
            }
            inner.session.last_message = format!("Connecting to {name} wallet...");
            Start::Go(inner.bump())
        });
        let ticket = match start {
            Start::Go(ticket) => ticket,
            Start::Busy => {
                debug!("connect ignored, session already active");
                return Ok(ConnectOutcome::AlreadyActive);
            }
            Start::TornDown => return Ok(ConnectOutcome::Discarded),
        };

        info!(wallet = provider.name(), "requesting wallet connection");
        let result = provider.connect().await;

        self.shared.cell.update(|inner| {
            if !inner.is_current(ticket) {
                debug!("stale connect result discarded");
                return Ok(ConnectOutcome::Discarded);
            }
            let still_connecting = inner.session.status == ConnectionStatus::Connecting;
            match result {
                Ok(account) => {
                    if still_connecting {
                        inner.apply(SessionAction::ProviderApproved);
                    }
                    if inner.session.account != Some(account) {
                        inner.session.account = Some(account);
                        inner.session.balance = None;
                    }
                    inner.session.last_message = "Connected successfully!".to_owned();
                    info!(%account, "wallet connected");
                    Ok(ConnectOutcome::Connected(account))
                }
                Err(e) => {
                    if still_connecting {
                        inner.apply(SessionAction::ProviderFailed);
                        inner.session.reset(format!("Error: {}", port_reason(&e)));
                    } else {
                        inner.session.last_message = format!("Error: {}", port_reason(&e));
                    }
                    warn!(error = %e, "wallet connection failed");
                    Err(SessionError::from(e))
                }
            }
        })
    }

    fn connect_without_provider(&self, name: &str) -> Result<ConnectOutcome, SessionError> {
        if self.is_torn_down() {
            return Ok(ConnectOutcome::Discarded);
        }
        let nav = &self.shared.navigator;
        if is_mobile_user_agent(&nav.user_agent()) {
            let url = browse_link(&self.shared.config.deep_link_base, &nav.page_url());
            info!(%url, "no injected wallet on mobile, redirecting to universal link");
            self.shared.cell.update(|inner| {
                inner.session.last_message = format!("Redirecting to {name} app...");
            });
            nav.redirect(&url);
            return Ok(ConnectOutcome::Redirected(url));
        }

        warn!(wallet = name, "no wallet provider detected");
        self.shared.cell.update(|inner| {
            inner.session.last_message =
                format!("{name} wallet not installed. Please install it first.");
        });
        Err(SessionError::ProviderUnavailable(name.to_owned()))
    }

    /// Local state is reset no matter how the provider call ends; a provider
    /// failure is still reported in the status line and the returned error.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let has_provider = self.shared.provider.is_some();
        let ticket = self.shared.cell.update(|inner| {
            if inner.torn_down {
                return None;
            }
            inner.apply(SessionAction::Disconnect);
            inner.session.reset(if has_provider {
                "Disconnected from wallet"
            } else {
                "No wallet connected"
            });
            Some(inner.bump())
        });
        let (Some(ticket), Some(provider)) = (ticket, self.shared.provider.as_ref()) else {
            return Ok(());
        };

        match provider.disconnect().await {
            Ok(()) => {
                info!("wallet disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "wallet disconnect failed");
                self.shared
                    .cell
                    .message_if_current(ticket, format!("Error disconnecting: {}", port_reason(&e)));
                Err(SessionError::from(e))
            }
        }
    }

    /// Refreshes the cached balance. Never changes the connection status.
    pub async fn refresh_balance(&self) -> Result<RefreshOutcome, SessionError> {
        if self.is_torn_down() {
            return Ok(RefreshOutcome::Discarded);
        }
        let (ticket, account) = self
            .shared
            .cell
            .connected_ticket()
            .ok_or(SessionError::NotConnected)?;

        let result = self.shared.rpc.get_balance(&account).await;

        self.shared.cell.update(|inner| {
            if !inner.is_current(ticket) {
                debug!(%account, "stale balance result discarded");
                return Ok(RefreshOutcome::Discarded);
            }
            match result {
                Ok(lamports) => {
                    let sol = lamports_to_sol(lamports);
                    inner.session.balance = Some(sol);
                    debug!(%account, lamports, "balance refreshed");
                    Ok(RefreshOutcome::Updated(sol))
                }
                Err(e) => {
                    inner.session.balance = None;
                    inner.session.last_message = "Failed to fetch balance".to_owned();
                    warn!(%account, error = %e, "balance fetch failed");
                    Err(SessionError::Rpc(port_reason(&e)))
                }
            }
        })
    }

    /// Releases the provider subscription, stops the poller and invalidates
    /// every in-flight operation. Idempotent.
    pub fn teardown(&self) {
        let already = self.shared.cell.update(|inner| {
            let already = inner.torn_down;
            inner.torn_down = true;
            inner.bump();
            already
        });
        if already {
            return;
        }
        self.shared.shutdown.cancel();
        let (subscription, poller) = {
            let mut r = self.resources();
            (r.subscription.take(), r.poller.take())
        };
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(poller) = poller {
            poller.stop();
        }
        info!("wallet session torn down");
    }

    pub(crate) fn provider(&self) -> Option<&P> {
        self.shared.provider.as_ref()
    }

    pub(crate) fn rpc(&self) -> &R {
        &self.shared.rpc
    }

    pub(crate) fn cell(&self) -> &SessionCell {
        &self.shared.cell
    }

    pub(crate) fn downgrade(&self) -> WeakController<P, R, N> {
        WeakController {
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn resources(&self) -> MutexGuard<'_, Resources> {
        self.shared
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-owning handle used by background tasks so they never keep a session alive.
pub(crate) struct WeakController<P, R, N> {
    shared: Weak<Shared<P, R, N>>,
}

impl<P, R, N> WeakController<P, R, N> {
    pub(crate) fn upgrade(&self) -> Option<WalletSessionController<P, R, N>> {
        self.shared
            .upgrade()
            .map(|shared| WalletSessionController { shared })
    }
}

/// The provider's own wording, without our variant prefix.
pub(crate) fn port_reason(e: &PortError) -> String {
    match e {
        PortError::Unavailable(m)
        | PortError::Rejected(m)
        | PortError::Transport(m)
        | PortError::Rpc(m)
        | PortError::Validation(m)
        | PortError::Timeout(m)
        | PortError::NotFound(m) => m.clone(),
    }
}
