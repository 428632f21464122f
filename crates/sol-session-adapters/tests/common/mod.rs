#![allow(dead_code)]

use std::time::Duration;

use sol_session_adapters::{InMemoryRpcAdapter, InMemoryWalletAdapter, StaticNavigator};
use sol_session_core::{AccountId, ControllerConfig, WalletSessionController};

pub const DESKTOP_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
pub const MOBILE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
pub const PAGE_URL: &str = "https://dapp.example/pay";

pub type TestController =
    WalletSessionController<InMemoryWalletAdapter, InMemoryRpcAdapter, StaticNavigator>;

pub fn alice() -> AccountId {
    AccountId::new([0xA1; 32])
}

pub fn bob() -> AccountId {
    AccountId::new([0xB0; 32])
}

pub fn quiet_config() -> ControllerConfig {
    ControllerConfig {
        poll_balance: false,
        ..ControllerConfig::default()
    }
}

pub fn polling_config(interval: Duration) -> ControllerConfig {
    ControllerConfig {
        poll_balance: true,
        balance_poll_interval: interval,
        ..ControllerConfig::default()
    }
}

pub struct Harness {
    pub wallet: InMemoryWalletAdapter,
    pub rpc: InMemoryRpcAdapter,
    pub navigator: StaticNavigator,
    pub controller: TestController,
}

pub fn mount(wallet: InMemoryWalletAdapter, config: ControllerConfig) -> Harness {
    let rpc = InMemoryRpcAdapter::default();
    mount_with(wallet, rpc, config)
}

pub fn mount_with(
    wallet: InMemoryWalletAdapter,
    rpc: InMemoryRpcAdapter,
    config: ControllerConfig,
) -> Harness {
    let navigator = StaticNavigator::new(DESKTOP_UA, PAGE_URL);
    let controller = WalletSessionController::mount(
        Some(wallet.clone()),
        rpc.clone(),
        navigator.clone(),
        config,
    );
    Harness {
        wallet,
        rpc,
        navigator,
        controller,
    }
}

pub fn mount_without_wallet(user_agent: &str, page_url: &str) -> Harness {
    let wallet = InMemoryWalletAdapter::new("Phantom", alice());
    let rpc = InMemoryRpcAdapter::default();
    let navigator = StaticNavigator::new(user_agent, page_url);
    let controller =
        WalletSessionController::mount(None, rpc.clone(), navigator.clone(), quiet_config());
    Harness {
        wallet,
        rpc,
        navigator,
        controller,
    }
}

pub fn phantom() -> InMemoryWalletAdapter {
    InMemoryWalletAdapter::new("Phantom", alice())
}

/// Yields to the scheduler until `cond` holds.
pub async fn until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held: {what}");
}
