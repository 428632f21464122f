use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use sol_session_core::{
    AccountId, EventListener, PortError, ProviderEvent, Subscription, TransferTransaction,
    TxSignature, WalletProviderPort,
};

use crate::listeners::ListenerRegistry;
use crate::memory_rpc::InMemoryRpcAdapter;

/// Scripted wallet for tests and headless runs. Behaves like an injected
/// browser wallet: approves or rejects `connect`, emits `connect` and
/// `disconnect` events, and signs transfers with a deterministic signature.
#[derive(Debug, Clone)]
pub struct InMemoryWalletAdapter {
    name: String,
    state: Arc<Mutex<WalletState>>,
    listeners: ListenerRegistry,
    connect_gate: Arc<watch::Sender<bool>>,
    ledger: Option<InMemoryRpcAdapter>,
}

#[derive(Debug, Default)]
struct WalletState {
    account: Option<AccountId>,
    connected: bool,
    reject_connect: Option<String>,
    disconnect_error: Option<PortError>,
    send_error: Option<PortError>,
    emit_lifecycle_events: bool,
    connect_calls: u64,
    disconnect_calls: u64,
    sent: Vec<TransferTransaction>,
}

impl InMemoryWalletAdapter {
    pub fn new(name: impl Into<String>, account: AccountId) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(WalletState {
                account: Some(account),
                emit_lifecycle_events: true,
                ..WalletState::default()
            })),
            listeners: ListenerRegistry::default(),
            connect_gate: Arc::new(gate),
            ledger: None,
        }
    }

    /// Starts out already approved for this site, like a wallet that
    /// remembers a previous session.
    pub fn already_connected(name: impl Into<String>, account: AccountId) -> Self {
        let adapter = Self::new(name, account);
        if let Ok(mut g) = adapter.lock() {
            g.connected = true;
        }
        adapter
    }

    /// Moves lamports between accounts of `rpc` whenever a transfer is sent.
    pub fn with_ledger(mut self, rpc: InMemoryRpcAdapter) -> Self {
        self.ledger = Some(rpc);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, WalletState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))
    }

    pub fn reject_connect(&self, reason: impl Into<String>) -> Result<(), PortError> {
        self.lock()?.reject_connect = Some(reason.into());
        Ok(())
    }

    pub fn approve_connect(&self) -> Result<(), PortError> {
        self.lock()?.reject_connect = None;
        Ok(())
    }

    pub fn fail_disconnect(&self, error: Option<PortError>) -> Result<(), PortError> {
        self.lock()?.disconnect_error = error;
        Ok(())
    }

    pub fn fail_send(&self, error: Option<PortError>) -> Result<(), PortError> {
        self.lock()?.send_error = error;
        Ok(())
    }

    /// When off, connect/disconnect resolve without emitting events.
    pub fn set_lifecycle_events(&self, enabled: bool) -> Result<(), PortError> {
        self.lock()?.emit_lifecycle_events = enabled;
        Ok(())
    }

    pub fn set_account(&self, account: AccountId) -> Result<(), PortError> {
        self.lock()?.account = Some(account);
        Ok(())
    }

    /// Parks every `connect` call until [`Self::release_connect`].
    pub fn hold_connect(&self) {
        self.connect_gate.send_replace(false);
    }

    pub fn release_connect(&self) {
        self.connect_gate.send_replace(true);
    }

    pub fn connect_calls(&self) -> u64 {
        self.lock().map(|g| g.connect_calls).unwrap_or_default()
    }

    pub fn disconnect_calls(&self) -> u64 {
        self.lock().map(|g| g.disconnect_calls).unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn sent_transactions(&self) -> Vec<TransferTransaction> {
        self.lock().map(|g| g.sent.clone()).unwrap_or_default()
    }

    /// Simulates the user approving (or switching to) `account` in the wallet UI.
    pub fn debug_emit_connect(&self, account: AccountId) -> Result<(), PortError> {
        {
            let mut g = self.lock()?;
            g.account = Some(account);
            g.connected = true;
        }
        self.listeners.emit(ProviderEvent::Connect(account));
        Ok(())
    }

    /// Simulates the user disconnecting from inside the wallet UI.
    pub fn debug_emit_disconnect(&self) -> Result<(), PortError> {
        self.lock()?.connected = false;
        self.listeners.emit(ProviderEvent::Disconnect);
        Ok(())
    }

    fn signature_for(&self, tx: &TransferTransaction, seq: usize) -> TxSignature {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(tx.fee_payer.as_bytes());
        raw[32..40].copy_from_slice(&tx.transfer_lamports().to_le_bytes());
        raw[40..48].copy_from_slice(&(seq as u64).to_le_bytes());
        TxSignature(bs58::encode(raw).into_string())
    }
}

#[async_trait]
impl WalletProviderPort for InMemoryWalletAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<AccountId, PortError> {
        self.lock()?.connect_calls += 1;

        let mut gate = self.connect_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| PortError::Unavailable("wallet went away".to_owned()))?;

        let (account, emit) = {
            let mut g = self.lock()?;
            if let Some(reason) = g.reject_connect.clone() {
                return Err(PortError::Rejected(reason));
            }
            let account = g
                .account
                .ok_or_else(|| PortError::NotFound("wallet has no account".to_owned()))?;
            g.connected = true;
            (account, g.emit_lifecycle_events)
        };
        if emit {
            self.listeners.emit(ProviderEvent::Connect(account));
        }
        Ok(account)
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        let emit = {
            let mut g = self.lock()?;
            g.disconnect_calls += 1;
            if let Some(e) = g.disconnect_error.clone() {
                return Err(e);
            }
            let was_connected = g.connected;
            g.connected = false;
            was_connected && g.emit_lifecycle_events
        };
        if emit {
            self.listeners.emit(ProviderEvent::Disconnect);
        }
        Ok(())
    }

    fn subscribe(&self, listener: EventListener) -> Subscription {
        self.listeners.add(listener)
    }

    fn is_connected(&self) -> bool {
        self.lock().map(|g| g.connected).unwrap_or(false)
    }

    fn current_account(&self) -> Option<AccountId> {
        self.lock()
            .ok()
            .and_then(|g| if g.connected { g.account } else { None })
    }

    async fn sign_and_send(&self, tx: &TransferTransaction) -> Result<TxSignature, PortError> {
        let seq = {
            let mut g = self.lock()?;
            if !g.connected {
                return Err(PortError::Unavailable("wallet not connected".to_owned()));
            }
            if let Some(e) = g.send_error.clone() {
                return Err(e);
            }
            g.sent.push(tx.clone());
            g.sent.len()
        };

        if let Some(ledger) = &self.ledger {
            let lamports = tx.transfer_lamports();
            if let Some(to) = tx.instructions.first().and_then(|ix| ix.accounts.get(1)) {
                ledger.transfer(&tx.fee_payer, &to.pubkey, lamports)?;
            }
        }
        Ok(self.signature_for(tx, seq))
    }
}
