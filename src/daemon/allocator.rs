use super::wallet_rpc::WalletRpcDaemon;
use crate::db::models::{NewWallet, Wallet};
use crate::error::DaemonError;
use crate::rpc::{NodeRpc, RpcError};

pub const MAX_ADDRESS_LEN: usize = 128;

/// Sanity-check an address returned by `getnewaddress`. This is not
/// chain-specific validation, only a guard against storing garbage.
pub fn validate_address(raw: &str) -> Result<String, DaemonError> {
    let address = raw.trim();
    if address.is_empty() {
        return Err(DaemonError::AddressGeneration(
            "node returned an empty address".to_string(),
        ));
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(DaemonError::AddressGeneration(format!(
            "address is {} bytes, limit is {}",
            address.len(),
            MAX_ADDRESS_LEN
        )));
    }
    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DaemonError::AddressGeneration(format!(
            "address {:?} contains whitespace or control characters",
            address
        )));
    }
    Ok(address.to_string())
}

impl<N: NodeRpc> WalletRpcDaemon<N> {
    /// Give `user_id` a fresh deposit address for `currency_id` (the
    /// daemon's own currency when `None`). An existing wallet keeps its id
    /// and balances and only has its address rotated.
    pub async fn allocate_address(
        &self,
        user_id: &str,
        currency_id: Option<i64>,
    ) -> Result<Wallet, DaemonError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DaemonError::Unauthorized);
        }
        let currency_id = match currency_id {
            Some(id) if id != self.chain.currency_id => {
                if self.store.currency_on_blockchain(&self.blockchain, id).await?.is_none() {
                    return Err(DaemonError::CurrencyNotFound(format!(
                        "currency {} on {}",
                        id, self.blockchain
                    )));
                }
                id
            }
            _ => self.chain.currency_id,
        };

        let existing = self.store.wallet_for(user_id, currency_id).await?;

        let address = match self.node.get_new_address(user_id).await {
            Ok(raw) => validate_address(&raw)?,
            Err(RpcError::Decode { message, .. }) => {
                return Err(DaemonError::AddressGeneration(message))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(wallet) = existing {
            let wallet = self
                .store
                .assign_wallet_address(wallet.id, &address, None)
                .await?;
            tracing::info!(
                blockchain = %self.blockchain,
                user_id,
                wallet_id = wallet.id,
                address = %address,
                "Deposit address rotated"
            );
            return Ok(wallet);
        }

        let new_wallet = NewWallet {
            user_id: user_id.to_string(),
            currency_id,
            name: self.chain.network_name.clone(),
            address: address.clone(),
            memo: None,
        };

        if let Some(wallet) = self.store.create_wallet(&new_wallet).await? {
            tracing::info!(
                blockchain = %self.blockchain,
                user_id,
                wallet_id = wallet.id,
                address = %address,
                "Deposit wallet created"
            );
            return Ok(wallet);
        }

        // Lost the insert race to a concurrent allocation for the same pair.
        let Some(wallet) = self.store.wallet_for(user_id, currency_id).await? else {
            return Err(DaemonError::AddressGeneration(format!(
                "wallet for user {} and currency {} disappeared after a conflicting insert",
                user_id, currency_id
            )));
        };
        tracing::debug!(
            blockchain = %self.blockchain,
            user_id,
            wallet_id = wallet.id,
            "Concurrent wallet creation, assigning address to existing row"
        );
        self.store
            .assign_wallet_address(wallet.id, &address, None)
            .await
    }
}
