use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use sol_session_core::{
    AccountId, ConfirmationBound, ConfirmationStatus, PortError, RpcPort, TxSignature,
};

/// In-process ledger standing in for a cluster. Tracks how often and how
/// concurrently it is queried so tests can assert on scheduling.
#[derive(Debug, Clone)]
pub struct InMemoryRpcAdapter {
    state: Arc<Mutex<RpcState>>,
    balance_gate: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
struct RpcState {
    balances: HashMap<AccountId, u64>,
    balance_error: Option<PortError>,
    balance_delay: Duration,
    balance_calls: u64,
    balances_in_flight: u64,
    max_balances_in_flight: u64,
    bound: ConfirmationBound,
    confirmation: Result<ConfirmationStatus, PortError>,
    confirm_delay: Duration,
    confirm_calls: u64,
}

impl Default for RpcState {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            balance_error: None,
            balance_delay: Duration::ZERO,
            balance_calls: 0,
            balances_in_flight: 0,
            max_balances_in_flight: 0,
            bound: ConfirmationBound {
                blockhash: bs58::encode([7u8; 32]).into_string(),
                last_valid_block_height: 150,
            },
            confirmation: Ok(ConfirmationStatus::Confirmed),
            confirm_delay: Duration::ZERO,
            confirm_calls: 0,
        }
    }
}

impl Default for InMemoryRpcAdapter {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(RpcState::default())),
            balance_gate: Arc::new(gate),
        }
    }
}

impl InMemoryRpcAdapter {
    fn lock(&self) -> Result<MutexGuard<'_, RpcState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("rpc lock poisoned: {e}")))
    }

    pub fn set_balance(&self, account: AccountId, lamports: u64) -> Result<(), PortError> {
        self.lock()?.balances.insert(account, lamports);
        Ok(())
    }

    pub fn balance_of(&self, account: &AccountId) -> u64 {
        self.lock()
            .ok()
            .and_then(|g| g.balances.get(account).copied())
            .unwrap_or(0)
    }

    /// Moves `lamports` from `from` to `to`; fails without touching either
    /// balance when `from` cannot cover it.
    pub fn transfer(&self, from: &AccountId, to: &AccountId, lamports: u64) -> Result<(), PortError> {
        let mut g = self.lock()?;
        let available = g.balances.get(from).copied().unwrap_or(0);
        let remaining = available.checked_sub(lamports).ok_or_else(|| {
            PortError::Rpc(format!(
                "insufficient lamports {available}, need {lamports}"
            ))
        })?;
        g.balances.insert(*from, remaining);
        *g.balances.entry(*to).or_insert(0) += lamports;
        Ok(())
    }

    pub fn fail_balance(&self, error: Option<PortError>) -> Result<(), PortError> {
        self.lock()?.balance_error = error;
        Ok(())
    }

    /// Every `get_balance` sleeps this long before answering.
    pub fn set_balance_delay(&self, delay: Duration) -> Result<(), PortError> {
        self.lock()?.balance_delay = delay;
        Ok(())
    }

    /// Parks every `get_balance` until [`Self::release_balance`].
    pub fn hold_balance(&self) {
        self.balance_gate.send_replace(false);
    }

    pub fn release_balance(&self) {
        self.balance_gate.send_replace(true);
    }

    pub fn set_confirmation(
        &self,
        result: Result<ConfirmationStatus, PortError>,
    ) -> Result<(), PortError> {
        self.lock()?.confirmation = result;
        Ok(())
    }

    pub fn set_confirm_delay(&self, delay: Duration) -> Result<(), PortError> {
        self.lock()?.confirm_delay = delay;
        Ok(())
    }

    pub fn balance_calls(&self) -> u64 {
        self.lock().map(|g| g.balance_calls).unwrap_or_default()
    }

    /// Highest number of `get_balance` calls ever outstanding at once.
    pub fn max_balances_in_flight(&self) -> u64 {
        self.lock().map(|g| g.max_balances_in_flight).unwrap_or_default()
    }

    pub fn confirm_calls(&self) -> u64 {
        self.lock().map(|g| g.confirm_calls).unwrap_or_default()
    }
}

/// Decrements the in-flight counter even when the caller drops the future.
struct InFlight<'a>(&'a InMemoryRpcAdapter);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut g) = self.0.lock() {
            g.balances_in_flight = g.balances_in_flight.saturating_sub(1);
        }
    }
}

#[async_trait]
impl RpcPort for InMemoryRpcAdapter {
    async fn get_balance(&self, account: &AccountId) -> Result<u64, PortError> {
        let delay = {
            let mut g = self.lock()?;
            g.balance_calls += 1;
            g.balances_in_flight += 1;
            g.max_balances_in_flight = g.max_balances_in_flight.max(g.balances_in_flight);
            g.balance_delay
        };
        let _in_flight = InFlight(self);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut gate = self.balance_gate.subscribe();
        let open = gate.wait_for(|open| *open).await.is_ok();
        if !open {
            return Err(PortError::Transport("rpc went away".to_owned()));
        }

        let g = self.lock()?;
        if let Some(e) = g.balance_error.clone() {
            return Err(e);
        }
        Ok(g.balances.get(account).copied().unwrap_or(0))
    }

    async fn latest_confirmation_bound(&self) -> Result<ConfirmationBound, PortError> {
        Ok(self.lock()?.bound.clone())
    }

    async fn confirm_transaction(
        &self,
        _signature: &TxSignature,
        _bound: &ConfirmationBound,
    ) -> Result<ConfirmationStatus, PortError> {
        let delay = {
            let mut g = self.lock()?;
            g.confirm_calls += 1;
            g.confirm_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lock()?.confirmation.clone()
    }
}
