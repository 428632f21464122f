use thiserror::Error;

use crate::domain::ConnectionStatus;
use crate::ports::PortError;
use crate::state_machine::SessionAction;

/// Input problems caught before any provider or RPC call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please connect your wallet first")]
    NotConnected,
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount {0} SOL is below one lamport")]
    AmountTooSmall(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal session transition: {from:?} --{action:?}-->")]
pub struct TransitionError {
    pub from: ConnectionStatus,
    pub action: SessionAction,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("{0} wallet not installed")]
    ProviderUnavailable(String),
    #[error("request rejected: {0}")]
    UserRejected(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("rpc failure: {0}")]
    Rpc(String),
    #[error("wallet is not connected")]
    NotConnected,
    #[error("a transfer is already in flight")]
    TransferInProgress,
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
}

impl From<PortError> for SessionError {
    fn from(value: PortError) -> Self {
        match value {
            PortError::Rejected(reason) => Self::UserRejected(reason),
            PortError::Unavailable(reason) => Self::ProviderUnavailable(reason),
            other => Self::Rpc(other.to_string()),
        }
    }
}
