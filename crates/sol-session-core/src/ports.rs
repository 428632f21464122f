use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AccountId, ConfirmationBound, ConfirmationStatus, TxSignature};
use crate::transaction::TransferTransaction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("user rejected the request: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connect(AccountId),
    Disconnect,
}

pub type EventListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Disposer for a provider event listener. Released exactly once, either
/// through [`Subscription::unsubscribe`] or on drop.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn noop() -> Self {
        Self { dispose: None }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// Capabilities the session needs from a wallet (browser extension, mobile
/// app or local keypair).
#[async_trait]
pub trait WalletProviderPort: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn connect(&self) -> Result<AccountId, PortError>;
    async fn disconnect(&self) -> Result<(), PortError>;
    fn subscribe(&self, listener: EventListener) -> Subscription;
    /// Synchronous snapshot; true when the wallet already authorised this page.
    fn is_connected(&self) -> bool;
    fn current_account(&self) -> Option<AccountId>;
    async fn sign_and_send(&self, tx: &TransferTransaction) -> Result<TxSignature, PortError>;
}

#[async_trait]
pub trait RpcPort: Send + Sync + 'static {
    /// Balance in lamports.
    async fn get_balance(&self, account: &AccountId) -> Result<u64, PortError>;
    async fn latest_confirmation_bound(&self) -> Result<ConfirmationBound, PortError>;
    /// Resolves once the signature is confirmed or can no longer land
    /// under `bound`. Expiry and on-chain errors come back as `Err`.
    async fn confirm_transaction(
        &self,
        signature: &TxSignature,
        bound: &ConfirmationBound,
    ) -> Result<ConfirmationStatus, PortError>;
}

/// Page-level facilities: user agent sniffing and top-level navigation.
pub trait NavigatorPort: Send + Sync + 'static {
    fn user_agent(&self) -> String;
    fn page_url(&self) -> String;
    fn redirect(&self, url: &str);
}

#[async_trait]
impl<T: WalletProviderPort> WalletProviderPort for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn connect(&self) -> Result<AccountId, PortError> {
        (**self).connect().await
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        (**self).disconnect().await
    }

    fn subscribe(&self, listener: EventListener) -> Subscription {
        (**self).subscribe(listener)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn current_account(&self) -> Option<AccountId> {
        (**self).current_account()
    }

    async fn sign_and_send(&self, tx: &TransferTransaction) -> Result<TxSignature, PortError> {
        (**self).sign_and_send(tx).await
    }
}

#[async_trait]
impl<T: RpcPort> RpcPort for Arc<T> {
    async fn get_balance(&self, account: &AccountId) -> Result<u64, PortError> {
        (**self).get_balance(account).await
    }

    async fn latest_confirmation_bound(&self) -> Result<ConfirmationBound, PortError> {
        (**self).latest_confirmation_bound().await
    }

    async fn confirm_transaction(
        &self,
        signature: &TxSignature,
        bound: &ConfirmationBound,
    ) -> Result<ConfirmationStatus, PortError> {
        (**self).confirm_transaction(signature, bound).await
    }
}

impl<T: NavigatorPort> NavigatorPort for Arc<T> {
    fn user_agent(&self) -> String {
        (**self).user_agent()
    }

    fn page_url(&self) -> String {
        (**self).page_url()
    }

    fn redirect(&self, url: &str) {
        (**self).redirect(url)
    }
}
