//! Per-blockchain deposit daemons.
//!
//! Each active blockchain gets exactly one [`Daemon`] per process. It owns
//! the chain's poll loop and resolved configuration, and it is also the
//! instance the address-allocation path goes through.

pub mod allocator;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod resolver;
pub mod wallet_rpc;

pub use manager::DaemonManager;
pub use monitor::CycleReport;
pub use registry::{ChainDeps, DaemonFactory, DaemonRegistry, MonitorSettings};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Wallet;
use crate::error::DaemonError;

#[async_trait]
pub trait Daemon: Send + Sync {
    /// Name of the blockchain row this daemon serves.
    fn blockchain(&self) -> &str;

    /// Run one reconciliation cycle against the node.
    async fn monitor_deposits(&self) -> Result<CycleReport, DaemonError>;

    /// Spawn the poll loop. It stops scheduling cycles once `shutdown` is
    /// cancelled; a cycle already running is allowed to finish.
    fn start_monitoring(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()>;

    /// Returns whether the withdrawal was processed.
    async fn process_withdrawal(
        &self,
        user_id: &str,
        to_address: &str,
        amount: &BigDecimal,
    ) -> Result<bool, DaemonError>;

    /// Allocate (or rotate) the custodial address of `user_id` for
    /// `currency_id`, defaulting to the daemon's own currency.
    async fn generate_deposit_address(
        &self,
        user_id: &str,
        currency_id: Option<i64>,
    ) -> Result<Wallet, DaemonError>;
}
