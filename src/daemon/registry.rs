use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::wallet_rpc::{WalletRpcDaemon, WALLET_RPC_CHAINS};
use super::Daemon;
use crate::db::Store;
use crate::error::DaemonError;
use crate::rpc::RpcClient;

/// Tunables shared by every daemon a manager constructs.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// How many recent wallet transactions one cycle fetches.
    pub transaction_batch: u32,
    pub rpc_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            transaction_batch: 100,
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a factory needs to build a daemon for one blockchain.
#[derive(Clone)]
pub struct ChainDeps {
    pub blockchain: String,
    pub store: Arc<dyn Store>,
    pub settings: MonitorSettings,
}

pub type DaemonFactory =
    Arc<dyn Fn(ChainDeps) -> BoxFuture<'static, Result<Arc<dyn Daemon>, DaemonError>> + Send + Sync>;

/// Chain name to daemon constructor. Names are matched lowercase.
#[derive(Clone, Default)]
pub struct DaemonRegistry {
    factories: HashMap<String, DaemonFactory>,
}

impl DaemonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every chain family this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let factory = WalletRpcDaemon::<RpcClient>::factory();
        for chain in WALLET_RPC_CHAINS {
            registry.register(chain, factory.clone());
        }
        registry
    }

    pub fn register(&mut self, blockchain: &str, factory: DaemonFactory) {
        self.factories.insert(blockchain.to_lowercase(), factory);
    }

    pub fn lookup(&self, blockchain: &str) -> Option<DaemonFactory> {
        self.factories.get(&blockchain.to_lowercase()).cloned()
    }

    /// Registered chain names, sorted.
    pub fn chains(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
