//! Deposit reconciliation.
//!
//! One cycle compares the node's recent wallet history against the
//! `deposits` table and moves each matched txid along
//! `unseen -> pending -> confirmed`, crediting the wallet once a deposit is
//! confirmed. Crediting is driven by `credited = false` on a confirmed row,
//! not by the pending-to-confirmed transition, so a credit lost to a crash
//! or a failed commit is retried on the next cycle.

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::wallet_rpc::WalletRpcDaemon;
use super::Daemon;
use crate::db::models::{Deposit, DepositStatus, NewDeposit, WatchedAddress};
use crate::error::DaemonError;
use crate::rpc::{ListTransaction, NodeRpc};

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// `None` when the height refresh failed.
    pub height: Option<u64>,
    pub fetched: usize,
    pub matched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub credited: usize,
    pub credit_failures: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.credited == 0 && self.credit_failures == 0
    }
}

/// Next step for a deposit the node reported again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Persist the new confirmation count and status.
    Update(DepositStatus),
    /// Nothing to persist, but the row is confirmed and still uncredited.
    Credit,
    Unchanged,
}

pub(crate) fn advance(deposit: &Deposit, confirmations: i64, min_confirmations: i64) -> Advance {
    // Confirmed is sticky even if the node later reports fewer confirmations.
    let status = deposit
        .status
        .max(DepositStatus::for_confirmations(confirmations, min_confirmations));

    if confirmations != deposit.confirmations || status != deposit.status {
        Advance::Update(status)
    } else if status == DepositStatus::Confirmed && !deposit.credited {
        Advance::Credit
    } else {
        Advance::Unchanged
    }
}

impl<N: NodeRpc> WalletRpcDaemon<N> {
    /// Run one reconciliation cycle. Only failing to load the address set or
    /// the transaction list fails the cycle; per-transaction errors are
    /// logged and the rest of the batch is still processed.
    pub async fn run_cycle(&self) -> Result<CycleReport, DaemonError> {
        let mut report = CycleReport {
            height: self.refresh_height().await,
            ..Default::default()
        };

        let watched = self.store.watched_addresses(&self.blockchain).await?;
        let by_address: HashMap<&str, &WatchedAddress> =
            watched.iter().map(|w| (w.address.as_str(), w)).collect();

        let transactions = self.node.list_transactions(self.transaction_batch).await?;
        report.fetched = transactions.len();

        tracing::debug!(
            blockchain = %self.blockchain,
            addresses = by_address.len(),
            transactions = transactions.len(),
            "Reconciling wallet history"
        );

        for tx in &transactions {
            if !tx.is_receive() {
                continue;
            }
            let owner = tx.address.as_deref().and_then(|a| by_address.get(a)).copied();

            let result = match owner {
                Some(owner) => {
                    if tx.amount <= BigDecimal::zero() {
                        tracing::warn!(
                            blockchain = %self.blockchain,
                            txid = %tx.txid,
                            amount = %tx.amount,
                            "Ignoring receive with non-positive amount"
                        );
                        continue;
                    }
                    report.matched += 1;
                    self.reconcile(tx, owner, &mut report).await
                }
                // The address may have been rotated away after the deposit
                // was first recorded; the stored row still carries its wallet.
                None => self.reconcile_known(tx, &mut report).await,
            };

            if let Err(e) = result {
                tracing::error!(
                    blockchain = %self.blockchain,
                    txid = %tx.txid,
                    error = %e,
                    "Failed to reconcile transaction"
                );
            }
        }

        Ok(report)
    }

    /// Fetch the node height and stamp it on the blockchain row. Failures
    /// are logged and never abort the cycle.
    async fn refresh_height(&self) -> Option<u64> {
        let height = match self.node.get_block_count().await {
            Ok(height) => height,
            Err(e) => {
                tracing::warn!(blockchain = %self.blockchain, error = %e, "Failed to fetch block height");
                return None;
            }
        };

        let stored = i64::try_from(height).unwrap_or(i64::MAX);
        if let Err(e) = self.store.record_block_height(&self.blockchain, stored).await {
            tracing::warn!(blockchain = %self.blockchain, height, error = %e, "Failed to record block height");
        }
        Some(height)
    }

    async fn reconcile(
        &self,
        tx: &ListTransaction,
        owner: &WatchedAddress,
        report: &mut CycleReport,
    ) -> Result<(), DaemonError> {
        let min_confirmations = self.chain.min_confirmations;

        let deposit = match self.store.deposit_by_txid(&tx.txid).await? {
            None => {
                let status = DepositStatus::for_confirmations(tx.confirmations, min_confirmations);
                let deposit = self
                    .store
                    .insert_deposit(&NewDeposit {
                        wallet_id: owner.wallet_id,
                        txid: tx.txid.clone(),
                        amount: tx.amount.clone(),
                        confirmations: tx.confirmations,
                        status,
                    })
                    .await?;
                report.inserted += 1;

                tracing::info!(
                    blockchain = %self.blockchain,
                    txid = %tx.txid,
                    wallet_id = owner.wallet_id,
                    amount = %tx.amount,
                    currency = %owner.currency_symbol,
                    confirmations = tx.confirmations,
                    status = %deposit.status,
                    "Deposit detected"
                );
                deposit
            }
            Some(existing) => match self.progress(existing, tx, report).await? {
                Some(deposit) => deposit,
                None => return Ok(()),
            },
        };

        self.credit_if_due(&deposit, report).await;
        Ok(())
    }

    /// Advance a deposit that is already stored, whatever address the node
    /// reports it under. Unknown txids are left alone.
    async fn reconcile_known(
        &self,
        tx: &ListTransaction,
        report: &mut CycleReport,
    ) -> Result<(), DaemonError> {
        let Some(existing) = self.store.deposit_by_txid(&tx.txid).await? else {
            return Ok(());
        };
        report.matched += 1;

        if let Some(deposit) = self.progress(existing, tx, report).await? {
            self.credit_if_due(&deposit, report).await;
        }
        Ok(())
    }

    /// Persist new confirmations for a stored deposit. Returns `None` when
    /// there is nothing left to do for it.
    async fn progress(
        &self,
        existing: Deposit,
        tx: &ListTransaction,
        report: &mut CycleReport,
    ) -> Result<Option<Deposit>, DaemonError> {
        match advance(&existing, tx.confirmations, self.chain.min_confirmations) {
            Advance::Unchanged => Ok(None),
            Advance::Credit => Ok(Some(existing)),
            Advance::Update(status) => {
                self.store
                    .update_deposit_progress(existing.id, tx.confirmations, status)
                    .await?;
                report.updated += 1;

                tracing::debug!(
                    blockchain = %self.blockchain,
                    txid = %tx.txid,
                    confirmations = tx.confirmations,
                    status = %status,
                    "Deposit progressed"
                );
                Ok(Some(Deposit {
                    confirmations: tx.confirmations,
                    status,
                    ..existing
                }))
            }
        }
    }

    async fn credit_if_due(&self, deposit: &Deposit, report: &mut CycleReport) {
        if deposit.status == DepositStatus::Confirmed && !deposit.credited {
            self.credit(deposit, report).await;
        }
    }

    /// A failed credit leaves the row confirmed and uncredited for the next
    /// cycle to pick up.
    async fn credit(&self, deposit: &Deposit, report: &mut CycleReport) {
        match self
            .store
            .credit_deposit(deposit.wallet_id, &deposit.amount, deposit.id)
            .await
        {
            Ok(true) => {
                report.credited += 1;
                tracing::info!(
                    blockchain = %self.blockchain,
                    txid = %deposit.txid,
                    wallet_id = deposit.wallet_id,
                    amount = %deposit.amount,
                    "Deposit credited"
                );
            }
            Ok(false) => {
                tracing::debug!(blockchain = %self.blockchain, txid = %deposit.txid, "Deposit already credited");
            }
            Err(e) => {
                report.credit_failures += 1;
                tracing::error!(
                    blockchain = %self.blockchain,
                    txid = %deposit.txid,
                    deposit_id = deposit.id,
                    error = %e,
                    "Crediting failed, will retry next cycle"
                );
            }
        }
    }
}

pub fn spawn_poll_loop(
    daemon: Arc<dyn Daemon>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_poll_loop(daemon, interval, shutdown))
}

/// Run cycles back to back on `interval` until `shutdown` fires. The first
/// cycle starts immediately. Cancellation is only observed between cycles.
pub async fn run_poll_loop(daemon: Arc<dyn Daemon>, interval: Duration, shutdown: CancellationToken) {
    let blockchain = daemon.blockchain().to_string();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        blockchain = %blockchain,
        interval_ms = interval.as_millis() as u64,
        "Deposit monitor started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::info!(blockchain = %blockchain, "Shutdown received, stopping deposit monitor");
                break;
            }
            _ = ticker.tick() => {}
        }

        match daemon.monitor_deposits().await {
            Ok(report) if report.is_idle() => {
                tracing::debug!(blockchain = %blockchain, ?report, "Cycle complete");
            }
            Ok(report) => {
                tracing::info!(
                    blockchain = %blockchain,
                    height = ?report.height,
                    matched = report.matched,
                    inserted = report.inserted,
                    updated = report.updated,
                    credited = report.credited,
                    credit_failures = report.credit_failures,
                    "Cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(blockchain = %blockchain, error = %e, "Deposit cycle failed");
            }
        }
    }
}
