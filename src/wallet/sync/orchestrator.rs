//! Wallet sync engine and integration point for all sync services.
//!
//! This module defines the `SyncEngine`, which owns one wallet's [`WalletState`] and keeps it in
//! step with the ledger service. Once started it runs four independent polling loops, each on
//! its own interval:
//!
//! - block height: `GET /height`, notifies on change
//! - addresses: probes every address up to the gap-limit frontier, reconciles the responses and
//!   recomputes balances once the whole pass is in
//! - transactions: fetches every queued txid and files it into the per-currency ledgers
//! - persistence: writes a snapshot whenever there are unsaved changes
//!
//! Within a cycle, ledger requests fan out concurrently, bounded by
//! `EngineConfig::max_concurrent_fetches`. All loops share the state behind a single mutex that
//! is only held for synchronous read-modify-write steps, never across an await. Callbacks are
//! dispatched after the lock is released.
//!
//! Loop errors are logged and swallowed; the next iteration retries. Host-invoked operations
//! return their errors.

use crate::config::{ConfigError, EngineConfig};
use crate::ledger::{HttpLedgerClient, LedgerClient};
use crate::transaction::{
    HexPayloadSigner, SpendBuilder, SpendError, SpendRequest, TransactionSender, TransactionSigner,
};
use crate::utils::NativeAmount;
use crate::wallet::WalletSyncError;
use crate::wallet::state::WalletState;
use crate::wallet::sync::{
    address_discovery::AddressDiscovery,
    events::{EventDispatcher, SyncEvent, WalletCallbacks},
    progress_tracker::SyncProgressTracker,
    repositories::{LocalStore, MemoryLocalStore},
    state_persistence::StatePersistenceService,
    transaction_processor::TransactionReconciler,
};
use crate::wallet::types::{StartOptions, Transaction, TransactionQuery};

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Mutable engine data, guarded by one mutex
struct EngineData {
    state: WalletState,
    /// Bumped on every mutation
    revision: u64,
    /// Revision of the last successful write
    saved_revision: u64,
    /// Ledger entries changed since the fetch queue last drained
    changed_transactions: Vec<Transaction>,
    progress: SyncProgressTracker,
}

impl EngineData {
    fn new(state: WalletState) -> Self {
        Self {
            state,
            revision: 0,
            saved_revision: 0,
            changed_transactions: Vec::new(),
            progress: SyncProgressTracker::new(),
        }
    }

    fn mark_dirty(&mut self) {
        self.revision += 1;
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }
}

/// Everything the polling loops share
struct EngineInner {
    config: EngineConfig,
    master_public_key: String,
    ledger: Arc<dyn LedgerClient>,
    persistence: StatePersistenceService,
    discovery: AddressDiscovery,
    reconciler: TransactionReconciler,
    dispatcher: EventDispatcher,
    signer: Arc<dyn TransactionSigner>,
    sender: TransactionSender,
    on: AtomicBool,
    shutdown: watch::Sender<bool>,
    data: Mutex<EngineData>,
}

impl EngineInner {
    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    fn primary_currency(&self) -> &str {
        self.config.currency.primary_code()
    }

    /// Run `f` with the state lock held. `f` must not block.
    fn with_data<R>(&self, f: impl FnOnce(&mut EngineData) -> R) -> R {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    async fn check_block_height(&self) -> Result<(), WalletSyncError> {
        let response = self.ledger.get_height().await?;
        if !self.is_on() {
            return Ok(());
        }

        let height = response.height;
        let changed = self.with_data(|d| {
            if d.state.block_height == height {
                return false;
            }
            d.state.block_height = height;
            d.mark_dirty();
            true
        });

        if changed {
            info!("Block height changed to {}", height);
            self.dispatcher
                .dispatch(&SyncEvent::BlockHeightChanged { height });
        } else {
            debug!("Block height unchanged at {}", height);
        }
        Ok(())
    }

    async fn check_addresses(&self) -> Result<(), WalletSyncError> {
        let addresses = self.with_data(|d| -> Result<Vec<String>, WalletSyncError> {
            if self.discovery.ensure_frontier(&mut d.state)? {
                d.mark_dirty();
            }
            let scan_len = self.discovery.scan_len(&d.state);
            let addresses = d.state.addresses[..scan_len]
                .iter()
                .map(|r| r.address.clone())
                .collect::<Vec<_>>();
            d.progress.begin_pass(addresses.len());
            Ok(addresses)
        })?;
        debug!("Checking {} addresses", addresses.len());

        let mut responses = stream::iter(addresses.into_iter().map(|address| {
            let ledger = self.ledger.clone();
            async move {
                let result = ledger.get_address(&address).await;
                (address, result)
            }
        }))
        .buffer_unordered(self.config.max_concurrent_fetches);

        let mut failures = 0usize;
        while let Some((address, result)) = responses.next().await {
            if !self.is_on() {
                return Ok(());
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to fetch address {}: {}", address, e);
                    // The record keeps its last known amounts rather than counting as zero
                    failures += 1;
                    continue;
                }
            };
            if response.address != address {
                return Err(WalletSyncError::IntegrityError(format!(
                    "Ledger answered for {} when {} was queried",
                    response.address, address
                )));
            }

            let progress = self.with_data(|d| -> Result<Option<f64>, WalletSyncError> {
                let before = d
                    .state
                    .find_address(&address)
                    .map(|idx| d.state.addresses[idx].clone());
                let outcome =
                    self.reconciler
                        .reconcile_address(&self.discovery, &mut d.state, response)?;
                if before.as_ref() != d.state.addresses.get(outcome.index)
                    || outcome.frontier_advanced
                {
                    d.mark_dirty();
                }
                if !outcome.queued.is_empty() {
                    debug!(
                        "Address {} queued {} transactions",
                        address,
                        outcome.queued.len()
                    );
                }
                Ok(d.progress.record_checked())
            })?;

            if let Some(progress) = progress {
                self.dispatcher
                    .dispatch(&SyncEvent::AddressesChecked { progress });
            }
        }
        drop(responses);

        let (balance_changes, first_pass) =
            self.with_data(|d| -> Result<(Vec<(String, NativeAmount)>, bool), WalletSyncError> {
                if self.discovery.ensure_frontier(&mut d.state)? {
                    d.mark_dirty();
                }
                let changes = self.reconciler.recompute_balances(&mut d.state);
                if !changes.is_empty() {
                    d.mark_dirty();
                }
                let first_pass = failures == 0 && d.progress.finish_pass();
                Ok((changes, first_pass))
            })?;

        if failures > 0 {
            warn!("Address pass finished with {} failed fetches", failures);
        }

        for (currency_code, balance) in balance_changes {
            info!("Balance of {} is now {}", currency_code, balance);
            self.dispatcher.dispatch(&SyncEvent::BalanceChanged {
                currency_code,
                balance,
            });
        }
        if first_pass {
            self.dispatcher
                .dispatch(&SyncEvent::AddressesChecked { progress: 1.0 });
        }
        Ok(())
    }

    async fn check_transactions(&self) -> Result<(), WalletSyncError> {
        let txids = self.with_data(|d| d.state.transactions_to_fetch.clone());
        if txids.is_empty() {
            return Ok(());
        }
        debug!("Fetching {} queued transactions", txids.len());

        let mut responses = stream::iter(txids.into_iter().map(|txid| {
            let ledger = self.ledger.clone();
            async move {
                let result = ledger.get_transaction(&txid).await;
                (txid, result)
            }
        }))
        .buffer_unordered(self.config.max_concurrent_fetches);

        while let Some((txid, result)) = responses.next().await {
            if !self.is_on() {
                return Ok(());
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to fetch transaction {}: {}", txid, e);
                    continue;
                }
            };

            let flushed = self.with_data(|d| {
                let queued_before = d.state.transactions_to_fetch.len();
                let changed = self
                    .reconciler
                    .process_transaction(&mut d.state, &txid, &response);
                if !changed.is_empty() || d.state.transactions_to_fetch.len() != queued_before {
                    d.mark_dirty();
                }
                d.changed_transactions.extend(changed);

                if d.state.transactions_to_fetch.is_empty() && !d.changed_transactions.is_empty() {
                    Some(std::mem::take(&mut d.changed_transactions))
                } else {
                    None
                }
            });

            if let Some(transactions) = flushed {
                info!("{} transactions changed", transactions.len());
                self.dispatcher
                    .dispatch(&SyncEvent::TransactionsChanged { transactions });
            }
        }
        Ok(())
    }

    /// Write a snapshot if anything changed since the last successful write.
    ///
    /// Returns `true` when a snapshot was written. On failure the state stays dirty.
    async fn save_if_dirty(&self) -> Result<bool, WalletSyncError> {
        let snapshot = self.with_data(|d| d.is_dirty().then(|| (d.state.clone(), d.revision)));
        let Some((state, revision)) = snapshot else {
            debug!("Wallet state clean");
            return Ok(false);
        };

        self.persistence.save(&state).await?;
        self.with_data(|d| d.saved_revision = d.saved_revision.max(revision));
        debug!("Saved wallet state revision {}", revision);
        Ok(true)
    }

    fn initial_events(&self) -> Vec<SyncEvent> {
        self.with_data(|d| {
            let mut events = vec![SyncEvent::BlockHeightChanged {
                height: d.state.block_height,
            }];
            for code in &d.state.enabled_tokens {
                let transactions = d.state.transactions.get(code).cloned().unwrap_or_default();
                if !transactions.is_empty() {
                    events.push(SyncEvent::TransactionsChanged { transactions });
                }
                events.push(SyncEvent::BalanceChanged {
                    currency_code: code.clone(),
                    balance: d.state.balance(code),
                });
            }
            events
        })
    }
}

/// Drive one polling cycle until the engine is switched off.
async fn run_loop<F, Fut>(inner: Arc<EngineInner>, name: &'static str, interval: Duration, cycle: F)
where
    F: Fn(Arc<EngineInner>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), WalletSyncError>> + Send,
{
    let mut shutdown = inner.shutdown.subscribe();
    info!("Starting {} loop every {:?}", name, interval);

    while inner.is_on() {
        tokio::select! {
            result = cycle(inner.clone()) => match result {
                Ok(()) => {}
                Err(e @ (WalletSyncError::IntegrityError(_) | WalletSyncError::StoreError(_))) => {
                    error!("{} cycle aborted: {}", name, e);
                }
                Err(e) => warn!("{} cycle failed: {}", name, e),
            },
            _ = shutdown.changed() => break,
        }

        if !inner.is_on() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("{} loop stopped", name);
}

/// One wallet's sync engine.
///
/// Construct it with [`SyncEngine::builder`]. Queries can be made at any time; before
/// [`start`](Self::start) they see an empty wallet.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_on()
    }

    /// Load or create the wallet state and start the polling loops.
    ///
    /// Persisted state is used unless `options.reset_data` is set. Fresh state is written to the
    /// store before anything else happens; if that write fails the engine does not start. A
    /// snapshot that cannot be parsed is an error, it is never silently replaced.
    pub async fn start(&self, options: StartOptions) -> Result<(), WalletSyncError> {
        let mut tasks = self.tasks.lock().await;
        if self.inner.is_on() || !tasks.is_empty() {
            return Err(WalletSyncError::AlreadyRunning);
        }

        let inner = &self.inner;
        let primary = inner.primary_currency();
        let loaded = if options.reset_data {
            info!("Resetting wallet data");
            None
        } else {
            inner.persistence.load(primary).await?
        };

        let (state, key_changed) = match loaded {
            Some(mut state) => {
                let key_changed = state.master_public_key != inner.master_public_key;
                if key_changed && !state.master_public_key.is_empty() {
                    warn!("Stored master public key differs from the configured key, replacing it");
                }
                state.master_public_key = inner.master_public_key.clone();
                (state, key_changed)
            }
            None => {
                let state = WalletState::new(&inner.master_public_key, primary);
                inner.persistence.save(&state).await?;
                info!("Created fresh wallet state at {}", inner.persistence.path());
                (state, false)
            }
        };

        inner.with_data(|d| {
            *d = EngineData::new(state);
            if key_changed {
                d.mark_dirty();
            }
        });

        inner.dispatcher.dispatch_all(inner.initial_events());
        inner.on.store(true, Ordering::SeqCst);

        let config = &inner.config;
        tasks.push(tokio::spawn(run_loop(
            inner.clone(),
            "block height",
            config.block_height_interval,
            |inner| async move { inner.check_block_height().await },
        )));
        tasks.push(tokio::spawn(run_loop(
            inner.clone(),
            "address",
            config.address_interval,
            |inner| async move { inner.check_addresses().await },
        )));
        tasks.push(tokio::spawn(run_loop(
            inner.clone(),
            "transaction",
            config.transaction_interval,
            |inner| async move { inner.check_transactions().await },
        )));
        tasks.push(tokio::spawn(run_loop(
            inner.clone(),
            "save",
            config.save_interval,
            |inner| async move { inner.save_if_dirty().await.map(|_| ()) },
        )));

        info!("Sync engine started for {}", inner.master_public_key);
        Ok(())
    }

    /// Stop all polling loops and flush unsaved state.
    ///
    /// In-flight requests are abandoned. Stopping an engine that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), WalletSyncError> {
        let mut tasks = self.tasks.lock().await;
        if !self.inner.is_on() && tasks.is_empty() {
            return Ok(());
        }

        info!("Stopping sync engine");
        self.inner.on.store(false, Ordering::SeqCst);
        self.inner.shutdown.send_replace(true);

        for handle in tasks.drain(..) {
            if let Err(e) = handle.await {
                error!("Sync task ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.inner.save_if_dirty().await {
            error!("Final save failed: {}", e);
            return Err(e);
        }
        info!("Sync engine stopped");
        Ok(())
    }

    pub fn get_block_height(&self) -> u64 {
        self.inner.with_data(|d| d.state.block_height)
    }

    /// Balance of a currency, the primary currency when `None`
    pub fn get_balance(&self, currency_code: Option<&str>) -> NativeAmount {
        let code = currency_code.unwrap_or(self.inner.primary_currency());
        self.inner.with_data(|d| d.state.balance(code))
    }

    pub fn get_num_transactions(&self, currency_code: Option<&str>) -> usize {
        let code = currency_code.unwrap_or(self.inner.primary_currency());
        self.inner.with_data(|d| d.state.num_transactions(code))
    }

    /// A page of one currency's ledger, newest first
    pub fn get_transactions(&self, query: &TransactionQuery) -> Vec<Transaction> {
        let primary = self.inner.primary_currency();
        self.inner
            .with_data(|d| d.state.transactions_page(primary, query))
    }

    /// The first address not known to be used
    pub fn get_fresh_address(&self) -> String {
        self.inner
            .with_data(|d| self.inner.discovery.fresh_address(&d.state))
    }

    /// Mark addresses as used even without on-chain activity.
    pub fn add_gap_limit_addresses(&self, addresses: &[String]) {
        let added = self.inner.with_data(|d| {
            let added = d.state.add_gap_limit_addresses(addresses);
            if added > 0 {
                d.mark_dirty();
            }
            added
        });
        debug!("Marked {} gap limit addresses", added);
    }

    pub fn is_address_used(&self, address: &str) -> bool {
        self.inner.with_data(|d| d.state.is_address_used(address))
    }

    /// Start tracking tokens. Codes this engine does not support are ignored.
    ///
    /// Returns the codes that were newly enabled.
    pub fn enable_tokens(&self, tokens: &[String]) -> Vec<String> {
        let supported = self.inner.config.currency.all_codes();
        let (known, unknown): (Vec<String>, Vec<String>) = tokens
            .iter()
            .cloned()
            .partition(|code| supported.contains(code));
        for code in &unknown {
            warn!("Ignoring unsupported token {}", code);
        }

        let added = self.inner.with_data(|d| {
            let added = d.state.enable_tokens(&known);
            if !added.is_empty() {
                d.mark_dirty();
            }
            added
        });
        if !added.is_empty() {
            info!("Enabled tokens: {}", added.join(", "));
        }
        added
    }

    pub fn get_token_status(&self, currency_code: &str) -> bool {
        self.inner
            .with_data(|d| d.state.is_token_enabled(currency_code))
    }

    /// Build an unsigned spend from the current state.
    pub fn build_spend(&self, request: &SpendRequest) -> Result<Transaction, SpendError> {
        let inner = &self.inner;
        inner.with_data(|d| {
            SpendBuilder::new(&d.state, inner.primary_currency())
                .with_fee_schedule(inner.config.fees.clone())
                .with_change_address(inner.discovery.fresh_address(&d.state))
                .build(request)
        })
    }

    /// Attach a signed payload produced by the configured signer.
    pub async fn sign_tx(&self, mut tx: Transaction) -> Result<Transaction, SpendError> {
        tx.signed_payload = self.inner.signer.sign(&tx).await?;
        Ok(tx)
    }

    /// Submit a signed transaction. The local ledger is not touched.
    pub async fn broadcast_tx(&self, tx: &Transaction) -> Result<Transaction, SpendError> {
        self.inner.sender.send_tx(tx).await
    }

    /// File a broadcast transaction into the local ledger.
    pub fn save_tx(&self, tx: Transaction) -> Result<(), SpendError> {
        if tx.txid.is_empty() {
            return Err(SpendError::InvalidRequest(
                "only broadcast transactions can be saved".to_string(),
            ));
        }

        let inserted = self.inner.with_data(|d| {
            if !d.state.is_token_enabled(&tx.currency_code) {
                return Err(SpendError::InvalidRequest(format!(
                    "currency {} is not enabled",
                    tx.currency_code
                )));
            }
            let inserted = d.state.upsert_transaction(tx.clone());
            d.mark_dirty();
            Ok(inserted)
        })?;

        info!(
            "{} transaction {}",
            if inserted { "Saved" } else { "Updated" },
            tx.txid
        );
        self.inner.dispatcher.dispatch(&SyncEvent::TransactionsChanged {
            transactions: vec![tx],
        });
        Ok(())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if self.inner.is_on() {
            self.inner.on.store(false, Ordering::SeqCst);
            self.inner.shutdown.send_replace(true);
        }
    }
}

/// Builder for [`SyncEngine`]
#[derive(Default)]
pub struct SyncEngineBuilder {
    config: Option<EngineConfig>,
    master_public_key: Option<String>,
    ledger: Option<Arc<dyn LedgerClient>>,
    store: Option<Arc<dyn LocalStore>>,
    signer: Option<Arc<dyn TransactionSigner>>,
    dispatcher: EventDispatcher,
}

impl SyncEngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_master_public_key(mut self, key: impl Into<String>) -> Self {
        self.master_public_key = Some(key.into());
        self
    }

    /// Ledger client to use instead of an HTTP client for `config.ledger_url`
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Register a callback handler. Handlers are called in registration order.
    pub fn register_handler(mut self, handler: Arc<dyn WalletCallbacks>) -> Self {
        self.dispatcher.register_handler(handler);
        self
    }

    pub fn build(self) -> Result<SyncEngine, WalletSyncError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let master_public_key = self
            .master_public_key
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::InvalidValue {
                field: "master_public_key",
                reason: "must be set".to_string(),
            })?;

        let ledger: Arc<dyn LedgerClient> = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(HttpLedgerClient::new(
                &config.ledger_url,
                config.request_timeout,
                config.retry_max_elapsed,
            )?),
        };
        let store: Arc<dyn LocalStore> = match self.store {
            Some(store) => store,
            None => {
                warn!("No local store configured, wallet state will not survive a restart");
                Arc::new(MemoryLocalStore::new())
            }
        };
        let signer: Arc<dyn TransactionSigner> = match self.signer {
            Some(signer) => signer,
            None => Arc::new(HexPayloadSigner),
        };

        if self.dispatcher.is_empty() {
            debug!("No callback handlers registered");
        }

        let primary = config.currency.primary_code().to_string();
        let (shutdown, _) = watch::channel(false);

        let inner = EngineInner {
            persistence: StatePersistenceService::new(store, config.data_path()),
            discovery: AddressDiscovery::new(
                master_public_key.clone(),
                config.gap_limit,
                config.address_zero_marker.clone(),
            ),
            reconciler: TransactionReconciler::new(),
            dispatcher: self.dispatcher,
            sender: TransactionSender::new(ledger.clone()),
            signer,
            ledger,
            on: AtomicBool::new(false),
            shutdown,
            data: Mutex::new(EngineData::new(WalletState::new(&master_public_key, &primary))),
            master_public_key,
            config,
        };

        Ok(SyncEngine {
            inner: Arc::new(inner),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }
}
