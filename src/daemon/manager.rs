use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::{ChainDeps, DaemonRegistry, MonitorSettings};
use super::Daemon;
use crate::db::{Store, Wallet};
use crate::error::DaemonError;

struct RunningDaemon {
    daemon: Arc<dyn Daemon>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Supervisor {
    // Keyed by lowercase blockchain name.
    daemons: HashMap<String, RunningDaemon>,
    // Parent of every loop's token. Replaced after each shutdown.
    shutdown: CancellationToken,
}

/// Owns one daemon per active blockchain and their poll loops.
pub struct DaemonManager {
    store: Arc<dyn Store>,
    registry: DaemonRegistry,
    settings: MonitorSettings,
    running: Mutex<Supervisor>,
    started: AtomicBool,
}

impl DaemonManager {
    pub fn new(store: Arc<dyn Store>, registry: DaemonRegistry, settings: MonitorSettings) -> Self {
        Self {
            store,
            registry,
            settings,
            running: Mutex::new(Supervisor::default()),
            started: AtomicBool::new(false),
        }
    }

    /// Construct and start a daemon for every active blockchain with at
    /// least one active currency. Blockchains that already have a daemon
    /// are left alone. A blockchain with no registered implementation, or
    /// whose daemon fails to build, is logged and skipped.
    ///
    /// Returns the blockchains started by this call.
    pub async fn start_all(&self, interval: Duration) -> Result<Vec<String>, DaemonError> {
        let mut running = self.running.lock().await;
        self.start_locked(&mut running, interval).await
    }

    /// Lazy-start entry point. Returns `true` if this call performed the
    /// start, `false` if daemons were already started.
    pub async fn ensure_started(&self, interval: Duration) -> Result<bool, DaemonError> {
        let mut running = self.running.lock().await;
        if self.started.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.start_locked(&mut running, interval).await?;
        Ok(true)
    }

    async fn start_locked(
        &self,
        running: &mut Supervisor,
        interval: Duration,
    ) -> Result<Vec<String>, DaemonError> {
        let blockchains = self.store.active_blockchains().await?;
        let mut started = Vec::new();

        for blockchain in blockchains {
            let key = blockchain.name.to_lowercase();
            if running.daemons.contains_key(&key) {
                continue;
            }

            let Some(factory) = self.registry.lookup(&key) else {
                tracing::warn!(blockchain = %blockchain.name, "No daemon implementation registered, skipping");
                continue;
            };

            let deps = ChainDeps {
                blockchain: blockchain.name.clone(),
                store: self.store.clone(),
                settings: self.settings.clone(),
            };
            let daemon = match factory(deps).await {
                Ok(daemon) => daemon,
                Err(e) => {
                    tracing::error!(blockchain = %blockchain.name, error = %e, "Failed to construct daemon, skipping");
                    continue;
                }
            };

            let handle = daemon
                .clone()
                .start_monitoring(interval, running.shutdown.child_token());
            running.daemons.insert(key.clone(), RunningDaemon { daemon, handle });
            started.push(key);
        }

        self.started.store(true, Ordering::SeqCst);
        tracing::info!(
            started = ?started,
            running = running.daemons.len(),
            "Deposit daemons started"
        );
        Ok(started)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn get_daemon(&self, blockchain: &str) -> Option<Arc<dyn Daemon>> {
        self.running
            .lock()
            .await
            .daemons
            .get(&blockchain.to_lowercase())
            .map(|r| r.daemon.clone())
    }

    /// Sorted names of blockchains with a running daemon.
    pub async fn running_blockchains(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.lock().await.daemons.keys().cloned().collect();
        names.sort();
        names
    }

    /// Allocate a deposit address for `user_id` in the currency `symbol`,
    /// through the daemon that owns the currency's blockchain.
    pub async fn generate_deposit_address(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> Result<Wallet, DaemonError> {
        if user_id.trim().is_empty() {
            return Err(DaemonError::Unauthorized);
        }

        let Some((currency, blockchain)) = self.store.currency_by_symbol(symbol).await? else {
            return Err(DaemonError::CurrencyNotFound(symbol.to_string()));
        };
        let Some(blockchain) = blockchain else {
            return Err(DaemonError::NoDaemon(format!("{} is not on a blockchain", currency.symbol)));
        };
        let Some(daemon) = self.get_daemon(&blockchain.name).await else {
            return Err(DaemonError::NoDaemon(blockchain.name));
        };

        daemon
            .generate_deposit_address(user_id, Some(currency.id))
            .await
    }

    /// Stop scheduling new cycles and wait for every loop to exit. The
    /// manager can be started again afterwards.
    pub async fn shutdown(&self) {
        // Held until every loop has exited so a concurrent start cannot
        // overlap a draining loop on the same blockchain.
        let mut running = self.running.lock().await;
        running.shutdown.cancel();

        for (name, daemon) in running.daemons.drain() {
            if let Err(e) = daemon.handle.await {
                tracing::error!(blockchain = %name, error = %e, "Deposit monitor task panicked");
            }
        }

        running.shutdown = CancellationToken::new();
        self.started.store(false, Ordering::SeqCst);
        tracing::info!("All deposit daemons stopped");
    }
}
