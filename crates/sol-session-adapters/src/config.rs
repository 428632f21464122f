use std::time::Duration;

use sol_session_core::ControllerConfig;

pub const DEVNET_URL: &str = "https://api.devnet.solana.com";
pub const TESTNET_URL: &str = "https://api.testnet.solana.com";
pub const MAINNET_BETA_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone)]
pub struct SessionAdapterConfig {
    pub rpc_url: String,
    pub commitment: String,
    pub rpc_timeout_ms: u64,
    pub confirm_poll_interval_ms: u64,
    pub balance_poll_interval_ms: u64,
    pub confirm_timeout_ms: u64,
    pub poll_balance: bool,
    pub user_agent: String,
    pub page_url: String,
}

impl Default for SessionAdapterConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEVNET_URL.to_owned(),
            commitment: "confirmed".to_owned(),
            rpc_timeout_ms: 15_000,
            confirm_poll_interval_ms: 500,
            balance_poll_interval_ms: 10_000,
            confirm_timeout_ms: 90_000,
            poll_balance: true,
            user_agent: "sol-session/0.1".to_owned(),
            page_url: "http://localhost:5173/".to_owned(),
        }
    }
}

impl SessionAdapterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays values from `lookup` on the defaults. Unparsable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(url) = lookup("SOL_SESSION_CLUSTER").and_then(|c| cluster_url(&c)) {
            cfg.rpc_url = url.to_owned();
        }
        if let Some(url) = lookup("SOL_SESSION_RPC_URL").filter(|v| !v.trim().is_empty()) {
            cfg.rpc_url = url;
        }
        if let Some(commitment) = lookup("SOL_SESSION_COMMITMENT")
            .filter(|v| matches!(v.as_str(), "processed" | "confirmed" | "finalized"))
        {
            cfg.commitment = commitment;
        }

        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(v) = number("SOL_SESSION_RPC_TIMEOUT_MS").filter(|v| *v > 0) {
            cfg.rpc_timeout_ms = v;
        }
        if let Some(v) = number("SOL_SESSION_CONFIRM_POLL_MS").filter(|v| *v > 0) {
            cfg.confirm_poll_interval_ms = v;
        }
        if let Some(v) = number("SOL_SESSION_BALANCE_POLL_MS").filter(|v| *v > 0) {
            cfg.balance_poll_interval_ms = v;
        }
        if let Some(v) = number("SOL_SESSION_CONFIRM_TIMEOUT_MS").filter(|v| *v > 0) {
            cfg.confirm_timeout_ms = v;
        }
        if let Some(v) = lookup("SOL_SESSION_POLL_BALANCE").and_then(|v| parse_flag(&v)) {
            cfg.poll_balance = v;
        }
        if let Some(ua) = lookup("SOL_SESSION_USER_AGENT") {
            cfg.user_agent = ua;
        }
        if let Some(page) = lookup("SOL_SESSION_PAGE_URL") {
            cfg.page_url = page;
        }

        cfg
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            balance_poll_interval: Duration::from_millis(self.balance_poll_interval_ms),
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            poll_balance: self.poll_balance,
            ..ControllerConfig::default()
        }
    }
}

pub fn cluster_url(cluster: &str) -> Option<&'static str> {
    match cluster.trim().to_ascii_lowercase().as_str() {
        "devnet" => Some(DEVNET_URL),
        "testnet" => Some(TESTNET_URL),
        "mainnet" | "mainnet-beta" => Some(MAINNET_BETA_URL),
        _ => None,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
