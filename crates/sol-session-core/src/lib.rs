pub mod controller;
pub mod deep_link;
pub mod domain;
pub mod error;
pub mod poller;
pub mod ports;
pub mod state_machine;
pub mod transaction;
pub mod transfer;

pub use controller::{ConnectOutcome, RefreshOutcome, WalletSessionController};
pub use deep_link::{browse_link, encode_uri_component, is_mobile_user_agent};
pub use domain::{
    lamports_to_sol, sol_to_lamports, AccountId, ConfirmationBound, ConfirmationStatus,
    ConnectionStatus, ControllerConfig, TransferForm, TransferOutcome, TransferRequest,
    TxSignature, WalletSession, LAMPORTS_PER_SOL,
};
pub use error::{SessionError, TransitionError, ValidationError};
pub use poller::PollerHandle;
pub use ports::{
    EventListener, NavigatorPort, PortError, ProviderEvent, RpcPort, Subscription,
    WalletProviderPort,
};
pub use state_machine::{session_transition, SessionAction, StateTransition};
pub use transaction::{
    encode_compact_u16, wire_transaction, AccountMeta, CompiledInstruction, CompiledMessage,
    Instruction, TransferTransaction, SYSTEM_PROGRAM_ID,
};
pub use transfer::TransferWorkflow;
