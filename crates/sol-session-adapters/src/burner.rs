//! Local keypair wallet. Signs System transfers itself and submits them
//! through [`SolanaRpcAdapter`], which makes it usable from headless tools
//! where no browser wallet exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use tracing::{debug, info};

use sol_session_core::{
    wire_transaction, AccountId, EventListener, PortError, ProviderEvent, Subscription,
    TransferTransaction, TxSignature, WalletProviderPort,
};

use crate::listeners::ListenerRegistry;
use crate::rpc::SolanaRpcAdapter;

#[derive(Clone)]
pub struct BurnerWalletAdapter {
    key: Arc<SigningKey>,
    account: AccountId,
    rpc: SolanaRpcAdapter,
    connected: Arc<AtomicBool>,
    listeners: ListenerRegistry,
}

impl std::fmt::Debug for BurnerWalletAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnerWalletAdapter")
            .field("account", &self.account)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl BurnerWalletAdapter {
    pub fn from_seed(seed: [u8; 32], rpc: SolanaRpcAdapter) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let account = AccountId::new(key.verifying_key().to_bytes());
        Self {
            key: Arc::new(key),
            account,
            rpc,
            connected: Arc::new(AtomicBool::new(false)),
            listeners: ListenerRegistry::default(),
        }
    }

    /// Fresh throwaway keypair from the OS RNG.
    pub fn generate(rpc: SolanaRpcAdapter) -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed, rpc)
    }

    /// Accepts a Base58 32-byte seed, a Base58 64-byte keypair, or the
    /// JSON byte array written by `solana-keygen`.
    pub fn from_secret(secret: &str, rpc: SolanaRpcAdapter) -> Result<Self, PortError> {
        let bytes = parse_secret(secret)?;
        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                Ok(Self::from_seed(seed, rpc))
            }
            64 => {
                let mut pair = [0u8; 64];
                pair.copy_from_slice(&bytes);
                let key = SigningKey::from_keypair_bytes(&pair).map_err(|e| {
                    PortError::Validation(format!("keypair halves do not match: {e}"))
                })?;
                Ok(Self::from_seed(key.to_bytes(), rpc))
            }
            n => Err(PortError::Validation(format!(
                "secret key must be 32 or 64 bytes, got {n}"
            ))),
        }
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn rpc(&self) -> &SolanaRpcAdapter {
        &self.rpc
    }

    /// Compiles `tx` against `blockhash`, signs it and returns the wire bytes.
    pub fn sign_transaction(
        &self,
        tx: &TransferTransaction,
        blockhash: [u8; 32],
    ) -> Result<Vec<u8>, PortError> {
        if tx.fee_payer != self.account {
            return Err(PortError::Validation(format!(
                "fee payer {} is not this wallet ({})",
                tx.fee_payer, self.account
            )));
        }
        let message = tx.compile(blockhash)?.serialize();
        let signature = self.key.sign(&message);
        Ok(wire_transaction(&[signature.to_bytes()], &message))
    }
}

fn parse_secret(secret: &str) -> Result<Vec<u8>, PortError> {
    let secret = secret.trim();
    if secret.starts_with('[') {
        return serde_json::from_str::<Vec<u8>>(secret)
            .map_err(|e| PortError::Validation(format!("invalid keypair json: {e}")));
    }
    bs58::decode(secret)
        .into_vec()
        .map_err(|e| PortError::Validation(format!("invalid base58 secret: {e}")))
}

#[async_trait]
impl WalletProviderPort for BurnerWalletAdapter {
    fn name(&self) -> &str {
        "Burner"
    }

    async fn connect(&self) -> Result<AccountId, PortError> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.listeners.emit(ProviderEvent::Connect(self.account));
        }
        info!(account = %self.account, "burner wallet connected");
        Ok(self.account)
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.listeners.emit(ProviderEvent::Disconnect);
        }
        Ok(())
    }

    fn subscribe(&self, listener: EventListener) -> Subscription {
        self.listeners.add(listener)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_account(&self) -> Option<AccountId> {
        self.is_connected().then_some(self.account)
    }

    async fn sign_and_send(&self, tx: &TransferTransaction) -> Result<TxSignature, PortError> {
        if !self.is_connected() {
            return Err(PortError::Unavailable("burner wallet not connected".to_owned()));
        }
        let (blockhash, _) = self.rpc.latest_blockhash().await?;
        let wire = self.sign_transaction(tx, blockhash)?;
        debug!(bytes = wire.len(), "submitting signed transfer");
        self.rpc.send_raw_transaction(&wire).await
    }
}
