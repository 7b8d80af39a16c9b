use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::daemon::registry::{ChainDeps, DaemonFactory};
use crate::daemon::resolver::resolve_chain;
use crate::daemon::wallet_rpc::WalletRpcDaemon;
use crate::daemon::Daemon;
use crate::db::models::{
    Blockchain, Currency, Deposit, DepositStatus, NewDeposit, NewWallet, Wallet, WatchedAddress,
    STATUS_ACTIVE,
};
use crate::db::Store;
use crate::error::DaemonError;
use crate::rpc::{NodeRpc, RpcError};

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

// ============================================================
// Scripted node
// ============================================================

#[derive(Default)]
struct NodeState {
    height: u64,
    transactions: Vec<Value>,
    addresses: VecDeque<Value>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// A node whose wallet history is scripted by the test.
#[derive(Clone, Default)]
pub struct DummyNode {
    state: Arc<Mutex<NodeState>>,
}

impl DummyNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Report a receive to `address`, or update its confirmations if the
    /// txid is already in the history.
    pub fn receive(&self, txid: &str, address: &str, amount: &str, confirmations: i64) {
        let amount: Value = serde_json::from_str(amount).unwrap();
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state
            .transactions
            .iter_mut()
            .find(|e| e["txid"] == txid && e["category"] == "receive")
        {
            entry["confirmations"] = json!(confirmations);
            return;
        }
        state.transactions.push(json!({
            "address": address,
            "category": "receive",
            "amount": amount,
            "label": "",
            "vout": 0,
            "confirmations": confirmations,
            "txid": txid,
        }));
    }

    pub fn push_entry(&self, entry: Value) {
        self.state.lock().unwrap().transactions.push(entry);
    }

    pub fn queue_address(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .addresses
            .push_back(Value::from(address));
    }

    pub fn queue_raw_address(&self, value: Value) {
        self.state.lock().unwrap().addresses.push_back(value);
    }

    pub fn fail(&self, method: &str) {
        self.state.lock().unwrap().failing.insert(method.to_string());
    }

    pub fn recover(&self, method: &str) {
        self.state.lock().unwrap().failing.remove(method);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|m| *m == method)
            .count()
    }
}

#[async_trait]
impl NodeRpc for DummyNode {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());

        if state.failing.contains(method) {
            return Err(RpcError::Transport {
                method: method.to_string(),
                message: "connection refused".to_string(),
            });
        }

        match method {
            "getblockcount" => Ok(json!(state.height)),
            "listtransactions" => {
                let count = params.get(1).and_then(Value::as_u64).unwrap_or(10) as usize;
                let start = state.transactions.len().saturating_sub(count);
                Ok(Value::Array(state.transactions[start..].to_vec()))
            }
            "getnewaddress" => Ok(state.addresses.pop_front().unwrap_or(Value::Null)),
            _ => Err(RpcError::Rpc {
                method: method.to_string(),
                code: -32601,
                message: "Method not found".to_string(),
            }),
        }
    }
}

// ============================================================
// In-memory store
// ============================================================

#[derive(Default)]
struct MemoryState {
    blockchains: Vec<Blockchain>,
    currencies: Vec<Currency>,
    wallets: Vec<Wallet>,
    deposits: Vec<Deposit>,
    next_id: i64,
    failing_credits: usize,
    credit_commits: usize,
    race_next_wallet_create: bool,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn blockchain(&self, name: &str) -> Option<&Blockchain> {
        self.blockchains.iter().find(|b| b.name == name)
    }

    fn push_wallet(&mut self, user_id: &str, currency_id: i64, name: &str, address: Option<&str>) -> Wallet {
        let now = Utc::now();
        let wallet = Wallet {
            id: self.next_id(),
            user_id: user_id.to_string(),
            currency_id,
            name: name.to_string(),
            address: address.map(str::to_string),
            memo: None,
            spot_balance: BigDecimal::from(0),
            trading_balance: BigDecimal::from(0),
            funding_balance: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        };
        self.wallets.push(wallet.clone());
        wallet
    }

    fn push_deposit(&mut self, deposit: &NewDeposit, credited: bool) -> Deposit {
        let now = Utc::now();
        let row = Deposit {
            id: self.next_id(),
            wallet_id: deposit.wallet_id,
            txid: deposit.txid.clone(),
            amount: deposit.amount.clone(),
            confirmations: deposit.confirmations,
            status: deposit.status,
            credited,
            created_at: now,
            updated_at: now,
        };
        self.deposits.push(row.clone());
        row
    }
}

/// A [`Store`] held in memory, with failure injection for crediting.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blockchain(&self, name: &str, min_confirmations: i32) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.blockchains.push(Blockchain {
            id,
            name: name.to_string(),
            host: Some("127.0.0.1".to_string()),
            port: Some(18443),
            username: Some("rpcuser".to_string()),
            password: Some("rpcpass".to_string()),
            wallet_name: None,
            min_confirmations,
            height: 0,
            last_checked: None,
            status: STATUS_ACTIVE.to_string(),
        });
        id
    }

    pub fn edit_blockchain(&self, name: &str, edit: impl FnOnce(&mut Blockchain)) {
        let mut state = self.state.lock().unwrap();
        let chain = state
            .blockchains
            .iter_mut()
            .find(|b| b.name == name)
            .unwrap();
        edit(chain);
    }

    pub fn add_currency(&self, blockchain_id: Option<i64>, symbol: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.currencies.push(Currency {
            id,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            blockchain_id,
            decimals: 8,
            deposit_fee: BigDecimal::from(0),
            min_deposit: BigDecimal::from(0),
            status: STATUS_ACTIVE.to_string(),
        });
        id
    }

    pub fn set_currency_status(&self, currency_id: i64, status: &str) {
        let mut state = self.state.lock().unwrap();
        let currency = state
            .currencies
            .iter_mut()
            .find(|c| c.id == currency_id)
            .unwrap();
        currency.status = status.to_string();
    }

    pub fn add_wallet(&self, user_id: &str, currency_id: i64, address: Option<&str>) -> i64 {
        self.state
            .lock()
            .unwrap()
            .push_wallet(user_id, currency_id, "test", address)
            .id
    }

    /// Plant a deposit row directly, e.g. one left behind by a crash.
    pub fn put_deposit(&self, deposit: NewDeposit, credited: bool) -> i64 {
        self.state.lock().unwrap().push_deposit(&deposit, credited).id
    }

    pub fn blockchain(&self, name: &str) -> Blockchain {
        self.state.lock().unwrap().blockchain(name).cloned().unwrap()
    }

    pub fn wallet(&self, wallet_id: i64) -> Wallet {
        let state = self.state.lock().unwrap();
        state.wallets.iter().find(|w| w.id == wallet_id).cloned().unwrap()
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.state.lock().unwrap().wallets.clone()
    }

    pub fn deposit(&self, txid: &str) -> Option<Deposit> {
        let state = self.state.lock().unwrap();
        state.deposits.iter().find(|d| d.txid == txid).cloned()
    }

    pub fn deposits(&self) -> Vec<Deposit> {
        self.state.lock().unwrap().deposits.clone()
    }

    /// Make the next `n` crediting transactions fail without effect.
    pub fn fail_next_credits(&self, n: usize) {
        self.state.lock().unwrap().failing_credits = n;
    }

    pub fn credit_commits(&self) -> usize {
        self.state.lock().unwrap().credit_commits
    }

    /// Let a competing allocation win the next wallet insert.
    pub fn race_next_wallet_create(&self) {
        self.state.lock().unwrap().race_next_wallet_create = true;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_blockchains(&self) -> Result<Vec<Blockchain>, DaemonError> {
        let state = self.state.lock().unwrap();
        let mut chains: Vec<Blockchain> = state
            .blockchains
            .iter()
            .filter(|b| b.is_active())
            .filter(|b| {
                state
                    .currencies
                    .iter()
                    .any(|c| c.blockchain_id == Some(b.id) && c.is_active())
            })
            .cloned()
            .collect();
        chains.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(chains)
    }

    async fn first_active_currency(
        &self,
        blockchain: &str,
    ) -> Result<Option<(Currency, Blockchain)>, DaemonError> {
        let state = self.state.lock().unwrap();
        let Some(chain) = state.blockchain(blockchain).filter(|b| b.is_active()) else {
            return Ok(None);
        };
        let currency = state
            .currencies
            .iter()
            .filter(|c| c.blockchain_id == Some(chain.id) && c.is_active())
            .min_by_key(|c| c.id)
            .cloned();
        Ok(currency.map(|c| (c, chain.clone())))
    }

    async fn currency_on_blockchain(
        &self,
        blockchain: &str,
        currency_id: i64,
    ) -> Result<Option<Currency>, DaemonError> {
        let state = self.state.lock().unwrap();
        let Some(chain) = state.blockchain(blockchain) else {
            return Ok(None);
        };
        Ok(state
            .currencies
            .iter()
            .find(|c| c.id == currency_id && c.blockchain_id == Some(chain.id) && c.is_active())
            .cloned())
    }

    async fn currency_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<(Currency, Option<Blockchain>)>, DaemonError> {
        let state = self.state.lock().unwrap();
        let Some(currency) = state
            .currencies
            .iter()
            .find(|c| c.symbol == symbol && c.is_active())
        else {
            return Ok(None);
        };
        let chain = currency
            .blockchain_id
            .and_then(|id| state.blockchains.iter().find(|b| b.id == id))
            .cloned();
        Ok(Some((currency.clone(), chain)))
    }

    async fn record_block_height(&self, blockchain: &str, height: i64) -> Result<(), DaemonError> {
        let mut state = self.state.lock().unwrap();
        if let Some(chain) = state.blockchains.iter_mut().find(|b| b.name == blockchain) {
            chain.height = height;
            chain.last_checked = Some(Utc::now());
        }
        Ok(())
    }

    async fn watched_addresses(&self, blockchain: &str) -> Result<Vec<WatchedAddress>, DaemonError> {
        let state = self.state.lock().unwrap();
        let Some(chain) = state.blockchain(blockchain) else {
            return Ok(Vec::new());
        };
        let watched = state
            .wallets
            .iter()
            .filter_map(|w| {
                let address = w.address.clone()?;
                let currency = state.currencies.iter().find(|c| {
                    c.id == w.currency_id && c.blockchain_id == Some(chain.id) && c.is_active()
                })?;
                Some(WatchedAddress {
                    wallet_id: w.id,
                    address,
                    currency_id: currency.id,
                    currency_symbol: currency.symbol.clone(),
                })
            })
            .collect();
        Ok(watched)
    }

    async fn deposit_by_txid(&self, txid: &str) -> Result<Option<Deposit>, DaemonError> {
        Ok(self.deposit(txid))
    }

    async fn insert_deposit(&self, deposit: &NewDeposit) -> Result<Deposit, DaemonError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.deposits.iter().find(|d| d.txid == deposit.txid) {
            return Ok(existing.clone());
        }
        Ok(state.push_deposit(deposit, false))
    }

    async fn update_deposit_progress(
        &self,
        deposit_id: i64,
        confirmations: i64,
        status: DepositStatus,
    ) -> Result<(), DaemonError> {
        let mut state = self.state.lock().unwrap();
        if let Some(deposit) = state.deposits.iter_mut().find(|d| d.id == deposit_id) {
            deposit.confirmations = confirmations;
            deposit.status = status;
            deposit.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn credit_deposit(
        &self,
        wallet_id: i64,
        amount: &BigDecimal,
        deposit_id: i64,
    ) -> Result<bool, DaemonError> {
        let mut state = self.state.lock().unwrap();

        if state.failing_credits > 0 {
            state.failing_credits -= 1;
            return Err(DaemonError::Database(sqlx::Error::PoolTimedOut));
        }

        let Some(deposit_idx) = state.deposits.iter().position(|d| d.id == deposit_id) else {
            return Err(DaemonError::Database(sqlx::Error::RowNotFound));
        };
        if state.deposits[deposit_idx].credited {
            return Ok(false);
        }
        let Some(wallet_idx) = state.wallets.iter().position(|w| w.id == wallet_id) else {
            return Err(DaemonError::Crediting {
                deposit_id,
                reason: format!("wallet {} not found", wallet_id),
            });
        };

        let now = Utc::now();
        let wallet = &mut state.wallets[wallet_idx];
        wallet.spot_balance = &wallet.spot_balance + amount;
        wallet.updated_at = now;
        let deposit = &mut state.deposits[deposit_idx];
        deposit.credited = true;
        deposit.updated_at = now;
        state.credit_commits += 1;
        Ok(true)
    }

    async fn wallet_for(&self, user_id: &str, currency_id: i64) -> Result<Option<Wallet>, DaemonError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .wallets
            .iter()
            .find(|w| w.user_id == user_id && w.currency_id == currency_id)
            .cloned())
    }

    async fn wallet_by_id(&self, wallet_id: i64) -> Result<Option<Wallet>, DaemonError> {
        let state = self.state.lock().unwrap();
        Ok(state.wallets.iter().find(|w| w.id == wallet_id).cloned())
    }

    async fn create_wallet(&self, wallet: &NewWallet) -> Result<Option<Wallet>, DaemonError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.race_next_wallet_create) {
            state.push_wallet(&wallet.user_id, wallet.currency_id, &wallet.name, Some("raced-address"));
        }
        if state
            .wallets
            .iter()
            .any(|w| w.user_id == wallet.user_id && w.currency_id == wallet.currency_id)
        {
            return Ok(None);
        }
        let mut created = state.push_wallet(
            &wallet.user_id,
            wallet.currency_id,
            &wallet.name,
            Some(&wallet.address),
        );
        if let Some(memo) = &wallet.memo {
            created.memo = Some(memo.clone());
            if let Some(row) = state.wallets.iter_mut().find(|w| w.id == created.id) {
                row.memo = Some(memo.clone());
            }
        }
        Ok(Some(created))
    }

    async fn assign_wallet_address(
        &self,
        wallet_id: i64,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Wallet, DaemonError> {
        let mut state = self.state.lock().unwrap();
        let Some(wallet) = state.wallets.iter_mut().find(|w| w.id == wallet_id) else {
            return Err(DaemonError::Database(sqlx::Error::RowNotFound));
        };
        wallet.address = Some(address.to_string());
        wallet.memo = memo.map(str::to_string);
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn deposits_for_wallet(&self, wallet_id: i64, limit: i64) -> Result<Vec<Deposit>, DaemonError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Deposit> = state
            .deposits
            .iter()
            .filter(|d| d.wallet_id == wallet_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

// ============================================================
// Fixtures
// ============================================================

/// One active blockchain with one active currency.
pub struct ChainFixture {
    pub store: MemoryStore,
    pub node: DummyNode,
    pub blockchain_id: i64,
    pub currency_id: i64,
}

pub fn chain_fixture(blockchain: &str, symbol: &str, min_confirmations: i32) -> ChainFixture {
    let store = MemoryStore::new();
    let blockchain_id = store.add_blockchain(blockchain, min_confirmations);
    let currency_id = store.add_currency(Some(blockchain_id), symbol);
    ChainFixture {
        store,
        node: DummyNode::new(),
        blockchain_id,
        currency_id,
    }
}

pub async fn wallet_rpc_daemon(
    store: &MemoryStore,
    node: &DummyNode,
    blockchain: &str,
) -> WalletRpcDaemon<DummyNode> {
    let chain = resolve_chain(store, blockchain).await.unwrap();
    WalletRpcDaemon::new(
        blockchain.to_string(),
        Arc::new(store.clone()),
        chain,
        node.clone(),
        100,
    )
}

/// A registry factory that wires daemons to a scripted node.
pub fn dummy_factory(node: DummyNode) -> DaemonFactory {
    Arc::new(move |deps: ChainDeps| {
        let node = node.clone();
        async move {
            let chain = resolve_chain(deps.store.as_ref(), &deps.blockchain).await?;
            let daemon = WalletRpcDaemon::new(
                deps.blockchain,
                deps.store,
                chain,
                node,
                deps.settings.transaction_batch,
            );
            Ok::<_, DaemonError>(Arc::new(daemon) as Arc<dyn Daemon>)
        }
        .boxed()
    })
}
