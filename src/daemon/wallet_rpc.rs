use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::monitor::{self, CycleReport};
use super::registry::{ChainDeps, DaemonFactory};
use super::resolver::{resolve_chain, ResolvedChain};
use super::Daemon;
use crate::db::{Store, Wallet};
use crate::error::DaemonError;
use crate::rpc::{NodeRpc, RpcClient};

/// Chains whose nodes speak the bitcoind wallet RPC dialect.
pub const WALLET_RPC_CHAINS: [&str; 5] = ["deccord", "decord", "bitcoin", "litecoin", "dogecoin"];

/// Deposit daemon for nodes exposing `getblockcount`, `listtransactions`
/// and `getnewaddress` under `/wallet/<name>`.
pub struct WalletRpcDaemon<N> {
    pub(crate) blockchain: String,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) chain: ResolvedChain,
    pub(crate) node: N,
    pub(crate) transaction_batch: u32,
}

impl<N: NodeRpc> WalletRpcDaemon<N> {
    pub fn new(
        blockchain: String,
        store: Arc<dyn Store>,
        chain: ResolvedChain,
        node: N,
        transaction_batch: u32,
    ) -> Self {
        Self {
            blockchain,
            store,
            chain,
            node,
            transaction_batch: transaction_batch.max(1),
        }
    }

    pub fn chain(&self) -> &ResolvedChain {
        &self.chain
    }
}

impl WalletRpcDaemon<RpcClient> {
    /// Resolve the chain's configuration and open an HTTP client to its node.
    pub async fn connect(deps: ChainDeps) -> Result<Self, DaemonError> {
        let chain = resolve_chain(deps.store.as_ref(), &deps.blockchain).await?;
        let node = RpcClient::new(&chain.endpoint, deps.settings.rpc_timeout)?;

        tracing::info!(
            blockchain = %deps.blockchain,
            url = %node.url(),
            min_confirmations = chain.min_confirmations,
            currency_id = chain.currency_id,
            "Wallet RPC daemon configured"
        );

        Ok(Self::new(
            deps.blockchain,
            deps.store,
            chain,
            node,
            deps.settings.transaction_batch,
        ))
    }

    pub fn factory() -> DaemonFactory {
        Arc::new(|deps: ChainDeps| {
            async move {
                let daemon = Self::connect(deps).await?;
                Ok::<_, DaemonError>(Arc::new(daemon) as Arc<dyn Daemon>)
            }
            .boxed()
        })
    }
}

#[async_trait]
impl<N: NodeRpc + 'static> Daemon for WalletRpcDaemon<N> {
    fn blockchain(&self) -> &str {
        &self.blockchain
    }

    async fn monitor_deposits(&self) -> Result<CycleReport, DaemonError> {
        self.run_cycle().await
    }

    fn start_monitoring(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        monitor::spawn_poll_loop(self, interval, shutdown)
    }

    async fn process_withdrawal(
        &self,
        user_id: &str,
        to_address: &str,
        amount: &BigDecimal,
    ) -> Result<bool, DaemonError> {
        tracing::warn!(
            blockchain = %self.blockchain,
            user_id,
            to_address,
            %amount,
            "Withdrawals are not supported by this daemon, request not processed"
        );
        Ok(false)
    }

    async fn generate_deposit_address(
        &self,
        user_id: &str,
        currency_id: Option<i64>,
    ) -> Result<Wallet, DaemonError> {
        self.allocate_address(user_id, currency_id).await
    }
}
