use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use super::models::{
    Blockchain, Currency, Deposit, DepositStatus, NewDeposit, NewWallet, Wallet, WatchedAddress,
    STATUS_ACTIVE,
};
use super::store::Store;
use crate::error::DaemonError;

const BLOCKCHAIN_COLUMNS: &str = "id, name, host, port, username, password, wallet_name, \
     min_confirmations, height, last_checked, status";

const CURRENCY_COLUMNS: &str =
    "id, name, symbol, blockchain_id, decimals, deposit_fee, min_deposit, status";

const WALLET_COLUMNS: &str = "id, user_id, currency_id, name, address, memo, spot_balance, \
     trading_balance, funding_balance, created_at, updated_at";

const DEPOSIT_COLUMNS: &str =
    "id, wallet_id, txid, amount, confirmations, status, credited, created_at, updated_at";

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn blockchain_by_name(&self, name: &str) -> Result<Option<Blockchain>, DaemonError> {
        let sql = format!("SELECT {} FROM blockchains WHERE name = $1", BLOCKCHAIN_COLUMNS);
        let row = sqlx::query_as::<_, Blockchain>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn blockchain_by_id(&self, id: i64) -> Result<Option<Blockchain>, DaemonError> {
        let sql = format!("SELECT {} FROM blockchains WHERE id = $1", BLOCKCHAIN_COLUMNS);
        let row = sqlx::query_as::<_, Blockchain>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn active_blockchains(&self) -> Result<Vec<Blockchain>, DaemonError> {
        let sql = format!(
            "SELECT {} FROM blockchains b
             WHERE b.status = $1
               AND EXISTS (
                   SELECT 1 FROM currencies c
                   WHERE c.blockchain_id = b.id AND c.status = $1
               )
             ORDER BY b.name",
            BLOCKCHAIN_COLUMNS
        );
        let rows = sqlx::query_as::<_, Blockchain>(&sql)
            .bind(STATUS_ACTIVE)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn first_active_currency(
        &self,
        blockchain: &str,
    ) -> Result<Option<(Currency, Blockchain)>, DaemonError> {
        let Some(chain) = self.blockchain_by_name(blockchain).await? else {
            return Ok(None);
        };
        if !chain.is_active() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM currencies
             WHERE blockchain_id = $1 AND status = $2
             ORDER BY id
             LIMIT 1",
            CURRENCY_COLUMNS
        );
        let currency = sqlx::query_as::<_, Currency>(&sql)
            .bind(chain.id)
            .bind(STATUS_ACTIVE)
            .fetch_optional(&self.pool)
            .await?;

        Ok(currency.map(|c| (c, chain)))
    }

    async fn currency_on_blockchain(
        &self,
        blockchain: &str,
        currency_id: i64,
    ) -> Result<Option<Currency>, DaemonError> {
        let sql = format!(
            "SELECT {} FROM currencies
             WHERE id = $1 AND status = $3
               AND blockchain_id = (SELECT id FROM blockchains WHERE name = $2)",
            CURRENCY_COLUMNS
        );
        let row = sqlx::query_as::<_, Currency>(&sql)
            .bind(currency_id)
            .bind(blockchain)
            .bind(STATUS_ACTIVE)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn currency_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<(Currency, Option<Blockchain>)>, DaemonError> {
        let sql = format!(
            "SELECT {} FROM currencies WHERE symbol = $1 AND status = $2",
            CURRENCY_COLUMNS
        );
        let Some(currency) = sqlx::query_as::<_, Currency>(&sql)
            .bind(symbol)
            .bind(STATUS_ACTIVE)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let chain = match currency.blockchain_id {
            Some(id) => self.blockchain_by_id(id).await?,
            None => None,
        };

        Ok(Some((currency, chain)))
    }

    async fn record_block_height(&self, blockchain: &str, height: i64) -> Result<(), DaemonError> {
        sqlx::query(
            "UPDATE blockchains
             SET height = $2, last_checked = NOW(), updated_at = NOW()
             WHERE name = $1",
        )
        .bind(blockchain)
        .bind(height)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn watched_addresses(&self, blockchain: &str) -> Result<Vec<WatchedAddress>, DaemonError> {
        let rows = sqlx::query_as::<_, WatchedAddress>(
            "SELECT w.id AS wallet_id, w.address AS address,
                    c.id AS currency_id, c.symbol AS currency_symbol
             FROM wallets w
             JOIN currencies c ON c.id = w.currency_id
             JOIN blockchains b ON b.id = c.blockchain_id
             WHERE b.name = $1 AND c.status = $2 AND w.address IS NOT NULL",
        )
        .bind(blockchain)
        .bind(STATUS_ACTIVE)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn deposit_by_txid(&self, txid: &str) -> Result<Option<Deposit>, DaemonError> {
        let sql = format!("SELECT {} FROM deposits WHERE txid = $1", DEPOSIT_COLUMNS);
        let row = sqlx::query_as::<_, Deposit>(&sql)
            .bind(txid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_deposit(&self, deposit: &NewDeposit) -> Result<Deposit, DaemonError> {
        let sql = format!(
            "INSERT INTO deposits (wallet_id, txid, amount, confirmations, status, credited)
             VALUES ($1, $2, $3, $4, $5, FALSE)
             ON CONFLICT (txid) DO NOTHING
             RETURNING {}",
            DEPOSIT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Deposit>(&sql)
            .bind(deposit.wallet_id)
            .bind(&deposit.txid)
            .bind(&deposit.amount)
            .bind(deposit.confirmations)
            .bind(deposit.status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Ok(row),
            None => self.deposit_by_txid(&deposit.txid).await?.ok_or_else(|| {
                DaemonError::Database(sqlx::Error::RowNotFound)
            }),
        }
    }

    async fn update_deposit_progress(
        &self,
        deposit_id: i64,
        confirmations: i64,
        status: DepositStatus,
    ) -> Result<(), DaemonError> {
        sqlx::query(
            "UPDATE deposits
             SET confirmations = $2, status = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(deposit_id)
        .bind(confirmations)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn credit_deposit(
        &self,
        wallet_id: i64,
        amount: &BigDecimal,
        deposit_id: i64,
    ) -> Result<bool, DaemonError> {
        let failed = |e: sqlx::Error| DaemonError::crediting(deposit_id, e);
        let mut tx = self.pool.begin().await.map_err(failed)?;

        // The credited = FALSE guard makes a repeated attempt a no-op.
        let marked = sqlx::query(
            "UPDATE deposits
             SET credited = TRUE, updated_at = NOW()
             WHERE id = $1 AND credited = FALSE",
        )
        .bind(deposit_id)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;

        if marked.rows_affected() == 0 {
            tx.rollback().await.map_err(failed)?;
            return Ok(false);
        }

        let credited = sqlx::query(
            "UPDATE wallets
             SET spot_balance = spot_balance + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(wallet_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;

        if credited.rows_affected() == 0 {
            tx.rollback().await.map_err(failed)?;
            return Err(DaemonError::crediting(
                deposit_id,
                format!("wallet {} not found", wallet_id),
            ));
        }

        tx.commit().await.map_err(failed)?;
        Ok(true)
    }

    async fn wallet_for(&self, user_id: &str, currency_id: i64) -> Result<Option<Wallet>, DaemonError> {
        let sql = format!(
            "SELECT {} FROM wallets WHERE user_id = $1 AND currency_id = $2",
            WALLET_COLUMNS
        );
        let row = sqlx::query_as::<_, Wallet>(&sql)
            .bind(user_id)
            .bind(currency_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn wallet_by_id(&self, wallet_id: i64) -> Result<Option<Wallet>, DaemonError> {
        let sql = format!("SELECT {} FROM wallets WHERE id = $1", WALLET_COLUMNS);
        let row = sqlx::query_as::<_, Wallet>(&sql)
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_wallet(&self, wallet: &NewWallet) -> Result<Option<Wallet>, DaemonError> {
        let sql = format!(
            "INSERT INTO wallets (user_id, currency_id, name, address, memo,
                                  spot_balance, trading_balance, funding_balance)
             VALUES ($1, $2, $3, $4, $5, 0, 0, 0)
             ON CONFLICT (user_id, currency_id) DO NOTHING
             RETURNING {}",
            WALLET_COLUMNS
        );
        let row = sqlx::query_as::<_, Wallet>(&sql)
            .bind(&wallet.user_id)
            .bind(wallet.currency_id)
            .bind(&wallet.name)
            .bind(&wallet.address)
            .bind(wallet.memo.as_deref())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn assign_wallet_address(
        &self,
        wallet_id: i64,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Wallet, DaemonError> {
        let sql = format!(
            "UPDATE wallets
             SET address = $2, memo = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            WALLET_COLUMNS
        );
        let row = sqlx::query_as::<_, Wallet>(&sql)
            .bind(wallet_id)
            .bind(address)
            .bind(memo)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn deposits_for_wallet(&self, wallet_id: i64, limit: i64) -> Result<Vec<Deposit>, DaemonError> {
        let sql = format!(
            "SELECT {} FROM deposits
             WHERE wallet_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
            DEPOSIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Deposit>(&sql)
            .bind(wallet_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Seed or refresh a blockchain definition (idempotent, keyed by name).
/// The observed height is left alone.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_blockchain(
    pool: &PgPool,
    name: &str,
    host: &str,
    port: i32,
    username: Option<&str>,
    password: Option<&str>,
    wallet_name: Option<&str>,
    min_confirmations: i32,
    status: &str,
) -> eyre::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO blockchains (name, host, port, username, password, wallet_name,
                                  min_confirmations, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (name) DO UPDATE
         SET host = $2, port = $3, username = $4, password = $5, wallet_name = $6,
             min_confirmations = $7, status = $8, updated_at = NOW()
         RETURNING id",
    )
    .bind(name)
    .bind(host)
    .bind(port)
    .bind(username)
    .bind(password)
    .bind(wallet_name)
    .bind(min_confirmations)
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Seed or refresh a currency (idempotent, keyed by symbol).
#[allow(clippy::too_many_arguments)]
pub async fn upsert_currency(
    pool: &PgPool,
    blockchain_id: i64,
    symbol: &str,
    name: &str,
    decimals: i16,
    deposit_fee: &BigDecimal,
    min_deposit: &BigDecimal,
    status: &str,
) -> eyre::Result<()> {
    sqlx::query(
        "INSERT INTO currencies (blockchain_id, symbol, name, decimals, deposit_fee,
                                 min_deposit, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (symbol) DO UPDATE
         SET blockchain_id = $1, name = $3, decimals = $4, deposit_fee = $5,
             min_deposit = $6, status = $7, updated_at = NOW()",
    )
    .bind(blockchain_id)
    .bind(symbol)
    .bind(name)
    .bind(decimals)
    .bind(deposit_fee)
    .bind(min_deposit)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(())
}
