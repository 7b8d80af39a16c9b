use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{NodeRpc, RpcError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcAuth {
    pub username: String,
    pub password: String,
}

/// Where a node's wallet RPC lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub base_url: String,
    pub wallet: String,
    pub auth: Option<RpcAuth>,
}

impl RpcEndpoint {
    /// Node RPC servers multiplex wallets by path.
    pub fn wallet_url(&self) -> String {
        format!("{}/wallet/{}", self.base_url.trim_end_matches('/'), self.wallet)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC 2.0 over HTTP POST. No retries: the poll loop owns retry policy.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    auth: Option<RpcAuth>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: &RpcEndpoint, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                method: "<client>".to_string(),
                message: e.to_string(),
            })?;

        // Seeded from wall-clock millis, then strictly increasing per call.
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;

        Ok(Self {
            http,
            url: endpoint.wallet_url(),
            auth: endpoint.auth.clone(),
            next_id: AtomicU64::new(seed),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NodeRpc for RpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: &params,
        };

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = builder.send().await.map_err(|e| RpcError::Transport {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Transport {
                method: method.to_string(),
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        let envelope: RpcResponse = response.json().await.map_err(|e| RpcError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        Ok(envelope.result)
    }
}
