use thiserror::Error;

use crate::rpc::RpcError;

/// Errors raised by the deposit daemons and the address-allocation path.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("configuration error for blockchain '{blockchain}': {reason}")]
    Configuration { blockchain: String, reason: String },

    #[error("address generation failed: {0}")]
    AddressGeneration(String),

    #[error("crediting deposit {deposit_id} failed: {reason}")]
    Crediting { deposit_id: i64, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("currency not found: {0}")]
    CurrencyNotFound(String),

    #[error("no daemon for blockchain: {0}")]
    NoDaemon(String),
}

impl DaemonError {
    pub fn configuration(blockchain: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            blockchain: blockchain.to_string(),
            reason: reason.into(),
        }
    }

    pub fn crediting(deposit_id: i64, reason: impl ToString) -> Self {
        Self::Crediting {
            deposit_id,
            reason: reason.to_string(),
        }
    }
}
