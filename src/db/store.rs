use async_trait::async_trait;
use bigdecimal::BigDecimal;

use super::models::{
    Blockchain, Currency, Deposit, DepositStatus, NewDeposit, NewWallet, Wallet, WatchedAddress,
};
use crate::error::DaemonError;

/// Persistent state the daemons read and write.
///
/// Everything except [`Store::credit_deposit`] and [`Store::create_wallet`]
/// is a plain snapshot read or single-row write. Those two are the points
/// that need transactional or constraint-based exclusion.
#[async_trait]
pub trait Store: Send + Sync {
    /// Active blockchains with at least one active currency.
    async fn active_blockchains(&self) -> Result<Vec<Blockchain>, DaemonError>;

    /// The first active currency bound to `blockchain`, if the blockchain
    /// itself is active.
    async fn first_active_currency(
        &self,
        blockchain: &str,
    ) -> Result<Option<(Currency, Blockchain)>, DaemonError>;

    /// The active currency `currency_id`, if it is bound to `blockchain`.
    async fn currency_on_blockchain(
        &self,
        blockchain: &str,
        currency_id: i64,
    ) -> Result<Option<Currency>, DaemonError>;

    /// An active currency by symbol, with its blockchain (if any).
    async fn currency_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<(Currency, Option<Blockchain>)>, DaemonError>;

    /// Persist the latest node height and stamp `last_checked`.
    async fn record_block_height(&self, blockchain: &str, height: i64) -> Result<(), DaemonError>;

    /// Addresses of wallets whose currency is active and on `blockchain`.
    async fn watched_addresses(&self, blockchain: &str) -> Result<Vec<WatchedAddress>, DaemonError>;

    async fn deposit_by_txid(&self, txid: &str) -> Result<Option<Deposit>, DaemonError>;

    /// Insert an uncredited deposit. If the txid already exists the
    /// existing row is returned untouched.
    async fn insert_deposit(&self, deposit: &NewDeposit) -> Result<Deposit, DaemonError>;

    async fn update_deposit_progress(
        &self,
        deposit_id: i64,
        confirmations: i64,
        status: DepositStatus,
    ) -> Result<(), DaemonError>;

    /// Atomically add `amount` to the wallet's spot balance and flag the
    /// deposit as credited. Returns `false` when the deposit was already
    /// credited, in which case nothing changes.
    async fn credit_deposit(
        &self,
        wallet_id: i64,
        amount: &BigDecimal,
        deposit_id: i64,
    ) -> Result<bool, DaemonError>;

    async fn wallet_for(&self, user_id: &str, currency_id: i64) -> Result<Option<Wallet>, DaemonError>;

    async fn wallet_by_id(&self, wallet_id: i64) -> Result<Option<Wallet>, DaemonError>;

    /// Create a zero-balance wallet. Returns `None` when a wallet for the
    /// same (user, currency) pair already exists.
    async fn create_wallet(&self, wallet: &NewWallet) -> Result<Option<Wallet>, DaemonError>;

    async fn assign_wallet_address(
        &self,
        wallet_id: i64,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Wallet, DaemonError>;

    /// Newest first.
    async fn deposits_for_wallet(&self, wallet_id: i64, limit: i64) -> Result<Vec<Deposit>, DaemonError>;
}
