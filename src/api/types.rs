use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::Deposit;

/// Header the upstream auth layer sets to the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const DEFAULT_DEPOSIT_LIMIT: i64 = 50;
pub const MAX_DEPOSIT_LIMIT: i64 = 500;

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Deserialize)]
pub struct DepositParams {
    pub limit: Option<i64>,
}

impl DepositParams {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_DEPOSIT_LIMIT)
            .clamp(1, MAX_DEPOSIT_LIMIT)
    }
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStartResponse {
    pub status: String,
    pub blockchains: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub daemons_started: bool,
    pub blockchains: Vec<BlockchainHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockchainHealth {
    pub name: String,
    pub running: bool,
    pub height: i64,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DepositsResponse {
    pub wallet_id: i64,
    pub deposits: Vec<Deposit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_limit_bounds() {
        assert_eq!(DepositParams { limit: None }.limit(), 50);
        assert_eq!(DepositParams { limit: Some(10) }.limit(), 10);
        assert_eq!(DepositParams { limit: Some(0) }.limit(), 1);
        assert_eq!(DepositParams { limit: Some(10_000) }.limit(), 500);
    }
}
