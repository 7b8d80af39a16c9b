use sqlx::PgPool;

use crate::config::BlockchainSeed;
use crate::db::repository;

/// Upsert the blockchains and currencies declared in config (idempotent).
/// Rows that are not in config are left untouched.
pub async fn seed_blockchains(pool: &PgPool, chains: &[BlockchainSeed]) -> eyre::Result<usize> {
    let mut currencies = 0;

    for chain in chains {
        let blockchain_id = repository::upsert_blockchain(
            pool,
            &chain.name,
            chain.host.trim(),
            i32::from(chain.port),
            chain.username.as_deref(),
            chain.password.as_deref(),
            chain.wallet_name.as_deref(),
            i32::try_from(chain.min_confirmations).unwrap_or(i32::MAX),
            &chain.status,
        )
        .await
        .map_err(|e| eyre::eyre!("Failed to seed blockchain '{}': {}", chain.name, e))?;

        tracing::debug!(blockchain = %chain.name, blockchain_id, "Seeded blockchain");

        for currency in &chain.currencies {
            repository::upsert_currency(
                pool,
                blockchain_id,
                &currency.symbol,
                &currency.name,
                i16::from(currency.decimals),
                &currency.deposit_fee,
                &currency.min_deposit,
                &currency.status,
            )
            .await
            .map_err(|e| eyre::eyre!("Failed to seed currency '{}': {}", currency.symbol, e))?;

            tracing::debug!(
                blockchain = %chain.name,
                symbol = %currency.symbol,
                "Seeded currency"
            );
            currencies += 1;
        }
    }

    Ok(currencies)
}
