pub mod burner;
pub mod config;
mod listeners;
pub mod memory_rpc;
pub mod memory_wallet;
pub mod navigator;
pub mod rpc;

pub use burner::BurnerWalletAdapter;
pub use config::SessionAdapterConfig;
pub use memory_rpc::InMemoryRpcAdapter;
pub use memory_wallet::InMemoryWalletAdapter;
pub use navigator::StaticNavigator;
pub use rpc::{SignatureStatus, SolanaRpcAdapter};
