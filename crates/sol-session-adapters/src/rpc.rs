use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use sol_session_core::{
    AccountId, ConfirmationBound, ConfirmationStatus, PortError, RpcPort, TxSignature,
};

use crate::SessionAdapterConfig;

/// JSON-RPC 2.0 client for a Solana cluster endpoint.
#[derive(Debug, Clone)]
pub struct SolanaRpcAdapter {
    client: reqwest::Client,
    url: String,
    commitment: String,
    confirm_poll_interval: Duration,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    pub err: Option<Value>,
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    pub fn reaches(&self, commitment: &str) -> bool {
        let level = self
            .confirmation_status
            .as_deref()
            .map(commitment_rank)
            // Nodes that omit confirmationStatus report `confirmations: null` once rooted.
            .unwrap_or(if self.confirmations.is_none() { 2 } else { 0 });
        level >= commitment_rank(commitment)
    }
}

fn commitment_rank(commitment: &str) -> u8 {
    match commitment {
        "finalized" => 2,
        "confirmed" => 1,
        _ => 0,
    }
}

impl SolanaRpcAdapter {
    pub fn with_config(config: &SessionAdapterConfig) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build rpc client: {e}")))?;
        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            commitment: config.commitment.clone(),
            confirm_poll_interval: Duration::from_millis(config.confirm_poll_interval_ms),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Transport(format!(
                "{method} http status {status}: {body}"
            )));
        }
        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("{method} json decode failed: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(PortError::Rpc(format!("{} (code {})", err.message, err.code)));
        }
        envelope
            .result
            .ok_or_else(|| PortError::Rpc(format!("{method} response missing result")))
    }

    async fn call_as<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, PortError> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| PortError::Rpc(format!("{method} unexpected result shape: {e}")))
    }

    pub async fn latest_blockhash(&self) -> Result<([u8; 32], u64), PortError> {
        let bound = self.latest_confirmation_bound().await?;
        let bytes = bs58::decode(&bound.blockhash)
            .into_vec()
            .map_err(|e| PortError::Rpc(format!("blockhash is not base58: {e}")))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| PortError::Rpc(format!("blockhash has {} bytes", v.len())))?;
        Ok((hash, bound.last_valid_block_height))
    }

    pub async fn block_height(&self) -> Result<u64, PortError> {
        self.call_as("getBlockHeight", json!([{ "commitment": self.commitment }]))
            .await
    }

    pub async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, PortError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call_as(
                "getSignatureStatuses",
                json!([[signature.0], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    /// Submits a signed wire transaction.
    pub async fn send_raw_transaction(&self, wire: &[u8]) -> Result<TxSignature, PortError> {
        let signature: String = self
            .call_as(
                "sendTransaction",
                json!([
                    STANDARD.encode(wire),
                    { "encoding": "base64", "preflightCommitment": self.commitment }
                ]),
            )
            .await?;
        Ok(TxSignature(signature))
    }
}

#[async_trait]
impl RpcPort for SolanaRpcAdapter {
    async fn get_balance(&self, account: &AccountId) -> Result<u64, PortError> {
        let balance: WithContext<u64> = self
            .call_as(
                "getBalance",
                json!([account.to_string(), { "commitment": self.commitment }]),
            )
            .await?;
        Ok(balance.value)
    }

    async fn latest_confirmation_bound(&self) -> Result<ConfirmationBound, PortError> {
        let latest: WithContext<LatestBlockhash> = self
            .call_as(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        Ok(ConfirmationBound {
            blockhash: latest.value.blockhash,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn confirm_transaction(
        &self,
        signature: &TxSignature,
        bound: &ConfirmationBound,
    ) -> Result<ConfirmationStatus, PortError> {
        loop {
            if let Some(status) = self.signature_status(signature).await? {
                if let Some(err) = status.err {
                    return Err(PortError::Rpc(format!("transaction {signature} failed: {err}")));
                }
                if status.reaches(&self.commitment) {
                    debug!(%signature, slot = status.slot, "signature confirmed");
                    return Ok(ConfirmationStatus::Confirmed);
                }
            }

            let height = self.block_height().await?;
            if height > bound.last_valid_block_height {
                return Err(PortError::Timeout(format!(
                    "signature {signature} expired: block height {height} exceeded {}",
                    bound.last_valid_block_height
                )));
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }
}
