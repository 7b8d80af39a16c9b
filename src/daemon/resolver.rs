use crate::db::Store;
use crate::error::DaemonError;
use crate::rpc::{RpcAuth, RpcEndpoint};

const DEFAULT_WALLET: &str = "personal";

/// Configuration a daemon resolves once at construction and keeps for its
/// lifetime. A changed `blockchains` row takes effect on restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    pub endpoint: RpcEndpoint,
    /// The first active currency on the chain; default target of address
    /// allocation.
    pub currency_id: i64,
    pub network_name: String,
    pub min_confirmations: i64,
}

pub async fn resolve_chain(store: &dyn Store, blockchain: &str) -> Result<ResolvedChain, DaemonError> {
    let Some((currency, chain)) = store.first_active_currency(blockchain).await? else {
        return Err(DaemonError::configuration(
            blockchain,
            "no active currency on an active blockchain",
        ));
    };

    let host = chain
        .host
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DaemonError::configuration(blockchain, "missing RPC host"))?;
    let port = chain
        .port
        .filter(|p| (1..=i32::from(u16::MAX)).contains(p))
        .ok_or_else(|| DaemonError::configuration(blockchain, "missing or invalid RPC port"))?;

    let base_url = if host.contains("://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    };

    let wallet = chain
        .wallet_name
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or(DEFAULT_WALLET)
        .to_string();

    let auth = match (chain.username.as_deref(), chain.password.as_deref()) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Some(RpcAuth {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        _ => None,
    };

    Ok(ResolvedChain {
        endpoint: RpcEndpoint {
            base_url,
            wallet,
            auth,
        },
        currency_id: currency.id,
        network_name: chain.name,
        min_confirmations: i64::from(chain.min_confirmations.max(0)),
    })
}
