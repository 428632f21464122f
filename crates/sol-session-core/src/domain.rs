use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A 32-byte ed25519 public key, displayed as Base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ValidationError::InvalidRecipient("address is empty".to_owned()));
        }
        let bytes = bs58::decode(raw)
            .into_vec()
            .map_err(|e| ValidationError::InvalidRecipient(format!("base58 decode failed: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ValidationError::InvalidRecipient(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

/// Transaction signature as handed back by the provider. Opaque to the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletSession {
    pub status: ConnectionStatus,
    pub account: Option<AccountId>,
    /// Balance in SOL (display units).
    pub balance: Option<f64>,
    pub last_message: String,
    pub wallet_name: Option<String>,
}

impl WalletSession {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Leaves `Connected`; account and balance never outlive the connection.
    pub(crate) fn reset(&mut self, message: impl Into<String>) {
        self.status = ConnectionStatus::Disconnected;
        self.account = None;
        self.balance = None;
        self.last_message = message.into();
    }
}

/// Raw user input for a transfer, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferForm {
    pub recipient: String,
    pub amount: String,
}

impl TransferForm {
    pub fn new(recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recipient.is_empty() && self.amount.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: AccountId,
    pub amount_sol: f64,
    pub lamports: u64,
}

impl TransferRequest {
    pub fn new(recipient: AccountId, amount_sol: f64) -> Result<Self, ValidationError> {
        let lamports = sol_to_lamports(amount_sol)?;
        Ok(Self {
            recipient,
            amount_sol,
            lamports,
        })
    }

    /// Validates recipient first, then amount.
    pub fn parse(form: &TransferForm) -> Result<Self, ValidationError> {
        let recipient: AccountId = form.recipient.parse()?;
        let amount_sol: f64 = form
            .amount
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidAmount(format!("not a number: {:?}", form.amount)))?;
        Self::new(recipient, amount_sol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed,
}

impl ConfirmationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub signature: TxSignature,
    pub status: ConfirmationStatus,
    pub error: Option<String>,
}

/// Network reference used to decide when a submitted transaction can no longer land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationBound {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub balance_poll_interval: Duration,
    pub confirm_timeout: Duration,
    pub poll_balance: bool,
    pub deep_link_base: String,
    pub install_url: String,
    pub wallet_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            balance_poll_interval: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(90),
            poll_balance: true,
            deep_link_base: "https://phantom.app/ul/browse/".to_owned(),
            install_url: "https://phantom.app/".to_owned(),
            wallet_name: "Phantom".to_owned(),
        }
    }
}

/// Converts a display amount to lamports, rounding to the nearest lamport.
pub fn sol_to_lamports(amount_sol: f64) -> Result<u64, ValidationError> {
    if !amount_sol.is_finite() {
        return Err(ValidationError::InvalidAmount(format!(
            "amount must be finite, got {amount_sol}"
        )));
    }
    if amount_sol <= 0.0 {
        return Err(ValidationError::InvalidAmount(format!(
            "amount must be positive, got {amount_sol}"
        )));
    }
    let lamports = (amount_sol * LAMPORTS_PER_SOL as f64).round();
    if lamports >= u64::MAX as f64 {
        return Err(ValidationError::InvalidAmount(format!(
            "amount too large: {amount_sol}"
        )));
    }
    if lamports < 1.0 {
        return Err(ValidationError::AmountTooSmall(amount_sol));
    }
    Ok(lamports as u64)
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
