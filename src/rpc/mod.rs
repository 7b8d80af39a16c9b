//! JSON-RPC access to a node's wallet endpoint.
//!
//! [`NodeRpc`] is the seam between the daemons and the network: the
//! production [`RpcClient`] speaks JSON-RPC 2.0 over HTTP, tests plug in a
//! scripted node. The typed helpers cover the three wallet methods the
//! daemons use.

mod client;
pub mod types;

pub use client::{RpcAuth, RpcClient, RpcEndpoint};
pub use types::ListTransaction;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The node could not be reached or answered with a non-2xx status.
    #[error("transport error calling {method}: {message}")]
    Transport { method: String, message: String },

    /// The node answered with a JSON-RPC `error` object.
    #[error("node rejected {method} (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// The envelope was fine but the result did not have the expected shape.
    #[error("unexpected result from {method}: {message}")]
    Decode { method: String, message: String },
}

#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Invoke `method` with positional `params` and return the raw `result`.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        let result = self.call("getblockcount", Vec::new()).await?;
        decode("getblockcount", result)
    }

    /// The `count` most recent wallet transactions, across all labels.
    async fn list_transactions(&self, count: u32) -> Result<Vec<ListTransaction>, RpcError> {
        let result = self
            .call("listtransactions", vec![Value::from("*"), Value::from(count)])
            .await?;
        decode("listtransactions", result)
    }

    async fn get_new_address(&self, label: &str) -> Result<String, RpcError> {
        let result = self
            .call("getnewaddress", vec![Value::from(label)])
            .await?;
        decode("getnewaddress", result)
    }
}

fn decode<T: DeserializeOwned>(method: &str, result: Value) -> Result<T, RpcError> {
    serde_json::from_value(result).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}
