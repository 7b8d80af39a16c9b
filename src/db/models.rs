use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

/// An external chain the exchange custodies funds on.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Blockchain {
    pub id: i64,
    pub name: String,
    pub host: Option<String>,
    pub port: Option<i32>,
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub wallet_name: Option<String>,
    pub min_confirmations: i32,
    pub height: i64,
    pub last_checked: Option<DateTime<Utc>>,
    pub status: String,
}

impl Blockchain {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Currency {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    /// `None` for off-chain assets.
    pub blockchain_id: Option<i64>,
    pub decimals: i16,
    pub deposit_fee: BigDecimal,
    pub min_deposit: BigDecimal,
    pub status: String,
}

impl Currency {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// Custodial address and balances for one (user, currency) pair.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: String,
    pub currency_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub memo: Option<String>,
    pub spot_balance: BigDecimal,
    pub trading_balance: BigDecimal,
    pub funding_balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered so that `max` never moves a deposit backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Confirmed,
}

impl DepositStatus {
    pub fn for_confirmations(confirmations: i64, min_confirmations: i64) -> Self {
        if confirmations >= min_confirmations {
            DepositStatus::Confirmed
        } else {
            DepositStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown deposit status '{0}'")]
pub struct UnknownDepositStatus(pub String);

impl TryFrom<String> for DepositStatus {
    type Error = UnknownDepositStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(DepositStatus::Pending),
            "confirmed" => Ok(DepositStatus::Confirmed),
            _ => Err(UnknownDepositStatus(value)),
        }
    }
}

/// One observed on-chain receive, keyed by txid.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Deposit {
    pub id: i64,
    pub wallet_id: i64,
    pub txid: String,
    pub amount: BigDecimal,
    pub confirmations: i64,
    #[sqlx(try_from = "String")]
    pub status: DepositStatus,
    pub credited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub wallet_id: i64,
    pub txid: String,
    pub amount: BigDecimal,
    pub confirmations: i64,
    pub status: DepositStatus,
}

#[derive(Debug, Clone)]
pub struct NewWallet {
    pub user_id: String,
    pub currency_id: i64,
    pub name: String,
    pub address: String,
    pub memo: Option<String>,
}

/// A custodial address a daemon watches, with the wallet it credits.
#[derive(Debug, Clone, FromRow)]
pub struct WatchedAddress {
    pub wallet_id: i64,
    pub address: String,
    pub currency_id: i64,
    pub currency_symbol: String,
}
