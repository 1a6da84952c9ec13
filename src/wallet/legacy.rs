//! `WalletLegacy`: the wallet facade.
//!
//! One mutex guards the cache and the session. Public entry points take it
//! only for their synchronous part; node calls, load and save run as tokio
//! tasks without it. Events are collected under the lock and dispatched
//! after it is released.
//!
//! Lifecycle: `NotInitialized -> Loading -> Initialized <-> Saving`, and
//! back to `NotInitialized` on shutdown.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::account::{AccountBase, AccountKeys, AccountPublicAddress};
use crate::config::{WalletConfig, WalletSettings};
use crate::constants::ACCOUNT_CREATE_TIME_ACCURACY;
use crate::crypto::SecretKey;
use crate::currency::Currency;
use crate::wallet::cache::WalletUserTransactionsCache;
use crate::wallet::error::WalletError;
use crate::wallet::events::{ObserverManager, WalletEvent, WalletObserver};
use crate::wallet::node::{Node, Synchronizer};
use crate::wallet::outputs::{OutputFilter, TransactionOutputInformation, TransfersContainer};
use crate::wallet::proofs;
use crate::wallet::request::{Continuation, WalletRequest};
use crate::wallet::sender::WalletTransactionSender;
use crate::wallet::serializer::{deserialize_wallet, serialize_wallet, WalletData};
use crate::wallet::types::{
    Deposit, DepositId, Payments, TransactionId, TransactionMessage, TransferId,
    WalletTransaction, WalletTransfer,
};
use crate::Hash;

/// Source of the current unix time.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletState {
    NotInitialized,
    Loading,
    Initialized,
    Saving,
}

/// Everything that exists only while the wallet is initialized.
struct Session {
    account: AccountBase,
    container: Arc<dyn TransfersContainer>,
    sender: Arc<WalletTransactionSender>,
}

struct State {
    lifecycle: WalletState,
    password: Zeroizing<String>,
    cache: WalletUserTransactionsCache,
    session: Option<Session>,
}

#[derive(Default)]
struct LastNotified {
    actual: AtomicU64,
    pending: AtomicU64,
    actual_deposit: AtomicU64,
    pending_deposit: AtomicU64,
}

struct Shared {
    currency: Currency,
    settings: WalletSettings,
    node: Arc<dyn Node>,
    synchronizer: Arc<dyn Synchronizer>,
    clock: Clock,
    state: Mutex<State>,
    observers: ObserverManager,
    last_notified: LastNotified,
    /// Outstanding background tasks.
    tasks: watch::Sender<usize>,
}

/// Decrements the task counter when a background task ends.
struct TaskGuard {
    shared: Arc<Shared>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.shared.tasks.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct WalletLegacy {
    shared: Arc<Shared>,
}

fn require_initialized(lifecycle: WalletState, session: &Option<Session>) -> Result<&Session, WalletError> {
    match (lifecycle, session) {
        (WalletState::Initialized, Some(session)) => Ok(session),
        _ => Err(WalletError::NotInitialized),
    }
}

fn runtime_handle() -> Result<Handle, WalletError> {
    Handle::try_current()
        .map_err(|_| WalletError::InternalWalletError("no async runtime available".into()))
}

fn deposits_amount(outputs: &[TransactionOutputInformation], currency: &Currency) -> u64 {
    outputs
        .iter()
        .map(|o| o.amount.saturating_add(currency.calculate_interest(o.amount, o.term)))
        .fold(0u64, u64::saturating_add)
}

impl WalletLegacy {
    pub fn new(config: &WalletConfig, node: Arc<dyn Node>, synchronizer: Arc<dyn Synchronizer>) -> Self {
        Self::with_clock(config, node, synchronizer, Arc::new(crate::unix_time))
    }

    pub fn with_clock(
        config: &WalletConfig,
        node: Arc<dyn Node>,
        synchronizer: Arc<dyn Synchronizer>,
        clock: Clock,
    ) -> Self {
        let (tasks, _) = watch::channel(0usize);
        WalletLegacy {
            shared: Arc::new(Shared {
                currency: config.currency(),
                settings: config.wallet.clone(),
                node,
                synchronizer,
                clock,
                state: Mutex::new(State {
                    lifecycle: WalletState::NotInitialized,
                    password: Zeroizing::new(String::new()),
                    cache: WalletUserTransactionsCache::new(),
                    session: None,
                }),
                observers: ObserverManager::new(),
                last_notified: LastNotified::default(),
                tasks,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> u64 {
        (self.shared.clock)()
    }

    fn enter_task(&self) -> TaskGuard {
        self.shared.tasks.send_modify(|n| *n += 1);
        TaskGuard {
            shared: self.shared.clone(),
        }
    }

    /// Resolve once no load, save or send task is running.
    pub async fn wait_for_pending_tasks(&self) {
        let mut rx = self.shared.tasks.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn state(&self) -> WalletState {
        self.lock().lifecycle
    }

    pub fn currency(&self) -> &Currency {
        &self.shared.currency
    }

    pub fn default_mixin(&self) -> u64 {
        self.shared.settings.default_mixin
    }

    pub fn add_observer(&self, observer: Arc<dyn WalletObserver>) {
        self.shared.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn WalletObserver>) -> bool {
        self.shared.observers.remove(observer)
    }

    // ── Lifecycle ──

    /// New wallet with independent random spend and view keys.
    pub fn init_and_generate(&self, password: &str) -> Result<(), WalletError> {
        let (account, _) = AccountBase::generate_key(None, false, true);
        self.init_with_account(account, password)
    }

    /// New wallet whose view key derives from the spend key, so the seed
    /// alone restores it.
    pub fn init_and_generate_deterministic(&self, password: &str) -> Result<(), WalletError> {
        self.init_with_account(AccountBase::generate(), password)
    }

    pub fn init_with_keys(&self, keys: AccountKeys, password: &str) -> Result<(), WalletError> {
        self.init_with_account(AccountBase::from_keys(keys), password)
    }

    pub fn init_from_seed(&self, seed: &SecretKey, password: &str) -> Result<(), WalletError> {
        self.init_with_account(AccountBase::from_seed(seed), password)
    }

    fn init_with_account(&self, account: AccountBase, password: &str) -> Result<(), WalletError> {
        {
            let mut state = self.lock();
            if state.lifecycle != WalletState::NotInitialized {
                return Err(WalletError::AlreadyInitialized);
            }
            state.password = Zeroizing::new(password.to_owned());
            state.cache.reset();
            self.init_sync(&mut state, account);
        }
        self.shared.synchronizer.start();
        tracing::info!("wallet initialized");
        self.shared.observers.notify(|o| o.init_completed(Ok(())));
        Ok(())
    }

    /// Subscribe the account and move to `Initialized`.
    fn init_sync(&self, state: &mut State, account: AccountBase) {
        let sync_start = account
            .creation_timestamp()
            .saturating_sub(ACCOUNT_CREATE_TIME_ACCURACY);
        let container = self
            .shared
            .synchronizer
            .add_subscription(account.keys(), sync_start);
        let sender = Arc::new(WalletTransactionSender::new(
            self.shared.currency.clone(),
            account.keys().clone(),
            container.clone(),
            self.shared.settings.dust_to_fee,
        ));
        state.session = Some(Session {
            account,
            container,
            sender,
        });
        state.lifecycle = WalletState::Initialized;
    }

    /// Load a saved wallet from `source` in the background. Completion is
    /// reported through [`WalletObserver::init_completed`].
    pub fn init_and_load<R>(&self, mut source: R, password: &str) -> Result<(), WalletError>
    where
        R: Read + Send + 'static,
    {
        let handle = runtime_handle()?;
        {
            let mut state = self.lock();
            if state.lifecycle != WalletState::NotInitialized {
                return Err(WalletError::AlreadyInitialized);
            }
            state.lifecycle = WalletState::Loading;
        }
        tracing::info!("loading wallet");

        let wallet = self.clone();
        let guard = self.enter_task();
        let password = Zeroizing::new(password.to_owned());
        handle.spawn(async move {
            let _guard = guard;
            let blocking_password = password.clone();
            let loaded = tokio::task::spawn_blocking(move || {
                let mut raw = Vec::new();
                source
                    .read_to_end(&mut raw)
                    .map_err(|e| WalletError::Persistence(format!("read failed: {}", e)))?;
                deserialize_wallet(&raw, &blocking_password)
            })
            .await
            .unwrap_or_else(|e| Err(WalletError::InternalWalletError(format!("load task failed: {}", e))));
            let result = wallet.finish_load(loaded, password);
            wallet.shared.observers.notify(|o| o.init_completed(result.clone()));
        });
        Ok(())
    }

    fn finish_load(
        &self,
        loaded: Result<WalletData, WalletError>,
        password: Zeroizing<String>,
    ) -> Result<(), WalletError> {
        let sync_state = {
            let mut state = self.lock();
            let data = match loaded {
                Ok(data) => data,
                Err(e) => {
                    state.lifecycle = WalletState::NotInitialized;
                    tracing::warn!("failed to load wallet: {}", e);
                    return Err(e);
                }
            };
            state.password = password;
            state.cache = data.cache.unwrap_or_default();
            self.init_sync(&mut state, data.account);
            data.sync_state
        };
        if let Some(sync_state) = sync_state {
            if let Err(e) = self.shared.synchronizer.load(&sync_state) {
                tracing::warn!("discarding cached synchronizer state: {}", e);
            }
        }
        self.shared.synchronizer.start();
        tracing::info!("wallet loaded");
        Ok(())
    }

    /// Write the wallet to `destination` in the background. Completion is
    /// reported through [`WalletObserver::save_completed`].
    pub fn save<W>(&self, mut destination: W, save_detailed: bool, save_cache: bool) -> Result<(), WalletError>
    where
        W: Write + Send + 'static,
    {
        let handle = runtime_handle()?;
        let (account, password, cache) = {
            let mut state = self.lock();
            if state.lifecycle != WalletState::Initialized {
                return Err(WalletError::WrongState);
            }
            let Some(session) = &state.session else {
                return Err(WalletError::WrongState);
            };
            let account = session.account.clone();
            let cache = save_detailed.then(|| state.cache.clone());
            let password = state.password.clone();
            state.lifecycle = WalletState::Saving;
            (account, password, cache)
        };
        let sync_state = save_cache.then(|| self.shared.synchronizer.save());

        let wallet = self.clone();
        let guard = self.enter_task();
        handle.spawn(async move {
            let _guard = guard;
            let result = tokio::task::spawn_blocking(move || {
                let bytes = serialize_wallet(&account, &password, cache.as_ref(), sync_state.as_deref())?;
                destination
                    .write_all(&bytes)
                    .and_then(|_| destination.flush())
                    .map_err(|e| WalletError::Persistence(format!("write failed: {}", e)))
            })
            .await
            .unwrap_or_else(|e| Err(WalletError::InternalWalletError(format!("save task failed: {}", e))));
            {
                let mut state = wallet.lock();
                if state.lifecycle == WalletState::Saving {
                    state.lifecycle = WalletState::Initialized;
                }
            }
            match &result {
                Ok(()) => tracing::info!("wallet saved"),
                Err(e) => tracing::warn!("failed to save wallet: {}", e),
            }
            wallet.shared.observers.notify(|o| o.save_completed(result.clone()));
        });
        Ok(())
    }

    /// [`save`](Self::save) with the configured detail and cache flags.
    pub fn save_with_defaults<W>(&self, destination: W) -> Result<(), WalletError>
    where
        W: Write + Send + 'static,
    {
        let settings = &self.shared.settings;
        self.save(destination, settings.save_detailed, settings.save_cache)
    }

    /// Stop sending, wait for background tasks and drop all state.
    pub async fn shutdown(&self) -> Result<(), WalletError> {
        let sender = {
            let state = self.lock();
            if state.lifecycle == WalletState::NotInitialized {
                return Err(WalletError::NotInitialized);
            }
            state.session.as_ref().map(|s| s.sender.clone())
        };
        if let Some(sender) = &sender {
            sender.stop();
        }
        self.wait_for_pending_tasks().await;

        let address = {
            let mut state = self.lock();
            let session = state.session.take();
            state.cache.reset();
            state.password = Zeroizing::new(String::new());
            state.lifecycle = WalletState::NotInitialized;
            session.map(|s| *s.account.address())
        };
        if let Some(address) = address {
            self.shared.synchronizer.stop();
            self.shared.synchronizer.remove_subscription(&address);
        }
        let last = &self.shared.last_notified;
        for value in [&last.actual, &last.pending, &last.actual_deposit, &last.pending_deposit] {
            value.store(0, Ordering::SeqCst);
        }
        tracing::info!("wallet shut down");
        Ok(())
    }

    /// Reload the keys alone and start synchronization from scratch.
    pub async fn reset(&self) -> Result<(), WalletError> {
        let (bytes, password) = {
            let state = self.lock();
            let session = require_initialized(state.lifecycle, &state.session)?;
            let bytes = serialize_wallet(&session.account, &state.password, None, None)?;
            (bytes, state.password.clone())
        };
        self.shutdown().await?;
        self.init_and_load(std::io::Cursor::new(bytes), &password)?;
        self.wait_for_pending_tasks().await;
        if self.state() != WalletState::Initialized {
            return Err(WalletError::InternalWalletError("reload after reset failed".into()));
        }
        Ok(())
    }

    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), WalletError> {
        let mut state = self.lock();
        require_initialized(state.lifecycle, &state.session)?;
        if !crate::constant_time_eq(old_password.as_bytes(), state.password.as_bytes()) {
            return Err(WalletError::WrongPassword);
        }
        state.password = Zeroizing::new(new_password.to_owned());
        Ok(())
    }

    // ── Queries ──

    fn query<T>(
        &self,
        f: impl FnOnce(&Session, &WalletUserTransactionsCache) -> T,
    ) -> Result<T, WalletError> {
        let state = self.lock();
        let session = require_initialized(state.lifecycle, &state.session)?;
        Ok(f(session, &state.cache))
    }

    pub fn get_address(&self) -> Result<String, WalletError> {
        self.query(|s, _| self.shared.currency.account_address_as_string(s.account.address()))
    }

    pub fn get_account_keys(&self) -> Result<AccountKeys, WalletError> {
        self.query(|s, _| s.account.keys().clone())
    }

    pub fn is_tracking_wallet(&self) -> Result<bool, WalletError> {
        self.query(|s, _| s.account.is_tracking())
    }

    pub fn get_seed(&self) -> Result<Option<String>, WalletError> {
        self.query(|s, _| s.account.seed())
    }

    pub fn actual_balance(&self) -> Result<u64, WalletError> {
        self.query(|s, cache| self.calculate_actual_balance(s, cache))
    }

    pub fn pending_balance(&self) -> Result<u64, WalletError> {
        self.query(|s, cache| self.calculate_pending_balance(s, cache))
    }

    pub fn actual_deposit_balance(&self) -> Result<u64, WalletError> {
        self.query(|s, cache| self.calculate_actual_deposit_balance(s, cache))
    }

    pub fn pending_deposit_balance(&self) -> Result<u64, WalletError> {
        self.query(|s, cache| self.calculate_pending_deposit_balance(s, cache))
    }

    pub fn get_transaction_count(&self) -> Result<usize, WalletError> {
        self.query(|_, cache| cache.get_transaction_count())
    }

    pub fn get_transfer_count(&self) -> Result<usize, WalletError> {
        self.query(|_, cache| cache.get_transfer_count())
    }

    pub fn get_deposit_count(&self) -> Result<usize, WalletError> {
        self.query(|_, cache| cache.get_deposit_count())
    }

    pub fn get_transaction(&self, id: TransactionId) -> Result<Option<WalletTransaction>, WalletError> {
        self.query(|_, cache| cache.get_transaction(id).cloned())
    }

    pub fn get_transfer(&self, id: TransferId) -> Result<Option<WalletTransfer>, WalletError> {
        self.query(|_, cache| cache.get_transfer(id).cloned())
    }

    pub fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, WalletError> {
        self.query(|_, cache| cache.get_deposit(id).cloned())
    }

    pub fn find_transaction_by_hash(&self, hash: &Hash) -> Result<Option<TransactionId>, WalletError> {
        self.query(|_, cache| cache.find_transaction_by_hash(hash))
    }

    pub fn find_transaction_by_transfer_id(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransactionId>, WalletError> {
        self.query(|_, cache| cache.find_transaction_by_transfer_id(transfer_id))
    }

    pub fn get_transactions_by_payment_ids(&self, payment_ids: &[Hash]) -> Result<Vec<Payments>, WalletError> {
        self.query(|_, cache| cache.get_transactions_by_payment_ids(payment_ids))
    }

    pub fn get_unlocked_outputs_count(&self) -> Result<usize, WalletError> {
        self.query(|s, _| s.container.outputs(OutputFilter::KEY_UNLOCKED).len())
    }

    /// Secret key of a transaction this wallet sent.
    pub fn get_tx_key(&self, txid: &Hash) -> Result<SecretKey, WalletError> {
        self.query(|_, cache| {
            cache
                .find_transaction_by_hash(txid)
                .and_then(|id| cache.get_transaction(id))
                .and_then(|t| t.secret_key.clone())
                .filter(|key| !key.is_null())
        })?
        .ok_or(WalletError::KeyNotFound)
    }

    // ── Balances ──

    fn calculate_actual_balance(&self, session: &Session, cache: &WalletUserTransactionsCache) -> u64 {
        session
            .container
            .balance(OutputFilter::KEY_UNLOCKED)
            .saturating_sub(cache.unconfirmed().unconfirmed_outs_amount())
    }

    fn calculate_pending_balance(&self, session: &Session, cache: &WalletUserTransactionsCache) -> u64 {
        let unconfirmed = cache.unconfirmed();
        let change = unconfirmed
            .unconfirmed_outs_amount()
            .saturating_sub(unconfirmed.unconfirmed_transactions_amount());
        session
            .container
            .balance(OutputFilter::KEY_NOT_UNLOCKED)
            .saturating_add(change)
            .saturating_add(unconfirmed.spent_deposits_profit())
    }

    fn calculate_actual_deposit_balance(&self, session: &Session, cache: &WalletUserTransactionsCache) -> u64 {
        let unlocked = session
            .container
            .outputs(OutputFilter::TYPE_DEPOSIT | OutputFilter::STATE_UNLOCKED);
        deposits_amount(&unlocked, &self.shared.currency)
            .saturating_sub(cache.unconfirmed().spent_deposits_total())
    }

    fn calculate_pending_deposit_balance(&self, session: &Session, cache: &WalletUserTransactionsCache) -> u64 {
        let locked = session.container.outputs(
            OutputFilter::TYPE_DEPOSIT | OutputFilter::STATE_LOCKED | OutputFilter::STATE_SOFT_LOCKED,
        );
        deposits_amount(&locked, &self.shared.currency)
            .saturating_add(cache.unconfirmed().created_deposits_sum())
    }

    /// Balance events for every balance that differs from the last one
    /// reported.
    fn balance_events(&self, state: &State) -> Vec<WalletEvent> {
        let Some(session) = &state.session else {
            return Vec::new();
        };
        let cache = &state.cache;
        let last = &self.shared.last_notified;
        let mut events = Vec::new();

        let actual = self.calculate_actual_balance(session, cache);
        if last.actual.swap(actual, Ordering::SeqCst) != actual {
            events.push(WalletEvent::ActualBalanceUpdated(actual));
        }
        let pending = self.calculate_pending_balance(session, cache);
        if last.pending.swap(pending, Ordering::SeqCst) != pending {
            events.push(WalletEvent::PendingBalanceUpdated(pending));
        }
        let actual_deposit = self.calculate_actual_deposit_balance(session, cache);
        if last.actual_deposit.swap(actual_deposit, Ordering::SeqCst) != actual_deposit {
            events.push(WalletEvent::ActualDepositBalanceUpdated(actual_deposit));
        }
        let pending_deposit = self.calculate_pending_deposit_balance(session, cache);
        if last.pending_deposit.swap(pending_deposit, Ordering::SeqCst) != pending_deposit {
            events.push(WalletEvent::PendingDepositBalanceUpdated(pending_deposit));
        }
        events
    }

    // ── Sending ──

    /// Send to `transfers`. `ttl` is relative, in seconds; a nonzero ttl
    /// requires a zero fee.
    #[allow(clippy::too_many_arguments)]
    pub fn send_transaction(
        &self,
        transfers: &[WalletTransfer],
        fee: u64,
        extra: &[u8],
        mix_in: u64,
        unlock_timestamp: u64,
        messages: &[TransactionMessage],
        ttl: u64,
    ) -> Result<TransactionId, WalletError> {
        let live_time = self.shared.currency.mempool_tx_live_time;
        self.launch(|sender, cache, now| {
            if ttl > live_time {
                return Err(WalletError::WrongAmount);
            }
            let expiry = if ttl == 0 { 0 } else { now.saturating_add(ttl) };
            sender.make_send_request(
                cache,
                transfers,
                fee,
                extra,
                mix_in,
                unlock_timestamp,
                messages,
                expiry,
                now,
            )
        })
    }

    /// Single-destination send without messages or ttl.
    pub fn send_transaction_to(
        &self,
        transfer: WalletTransfer,
        fee: u64,
        extra: &[u8],
        mix_in: u64,
        unlock_timestamp: u64,
    ) -> Result<TransactionId, WalletError> {
        self.send_transaction(&[transfer], fee, extra, mix_in, unlock_timestamp, &[], 0)
    }

    pub fn deposit(&self, term: u32, amount: u64, fee: u64, mix_in: u64) -> Result<TransactionId, WalletError> {
        let currency = self.shared.currency.clone();
        self.launch(|sender, cache, now| {
            if term < currency.deposit_min_term {
                return Err(WalletError::DepositTermTooSmall);
            }
            if term > currency.deposit_max_term {
                return Err(WalletError::DepositTermTooBig);
            }
            if amount < currency.deposit_min_amount {
                return Err(WalletError::DepositAmountTooSmall);
            }
            sender.make_deposit_request(cache, term, amount, fee, mix_in, now)
        })
    }

    pub fn withdraw_deposits(&self, deposit_ids: &[DepositId], fee: u64) -> Result<TransactionId, WalletError> {
        self.launch(|sender, cache, now| sender.make_withdraw_deposit_request(cache, deposit_ids, fee, now))
    }

    /// Relayed transactions cannot be recalled.
    pub fn cancel_transaction(&self, _transaction_id: TransactionId) -> Result<(), WalletError> {
        Err(WalletError::TxCancelImpossible)
    }

    /// Run the synchronous part of a send under the lock, then hand the
    /// request chain to the runtime.
    fn launch<F>(&self, start: F) -> Result<TransactionId, WalletError>
    where
        F: FnOnce(
            &WalletTransactionSender,
            &mut WalletUserTransactionsCache,
            u64,
        ) -> Result<(TransactionId, Continuation), WalletError>,
    {
        let handle = runtime_handle()?;
        let now = self.now();
        let (id, sender, request, events) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let session = require_initialized(state.lifecycle, &state.session)?;
            if session.account.is_tracking() {
                return Err(WalletError::TrackingWalletOnly);
            }
            let sender = session.sender.clone();
            let (id, (request, mut events)) = start(&*sender, &mut state.cache, now)?;
            events.extend(self.balance_events(state));
            (id, sender, request, events)
        };
        self.shared.observers.dispatch(&events);
        if let Some(request) = request {
            self.spawn_request_chain(&handle, sender, request);
        }
        Ok(id)
    }

    fn spawn_request_chain(&self, handle: &Handle, sender: Arc<WalletTransactionSender>, request: WalletRequest) {
        let wallet = self.clone();
        let guard = self.enter_task();
        handle.spawn(async move {
            let _guard = guard;
            let mut next = Some(request);
            while let Some(request) = next.take() {
                tracing::debug!("performing request for transaction {}", request.transaction_id());
                let outcome = request.perform(wallet.shared.node.as_ref()).await;
                let events = {
                    let mut guard = wallet.lock();
                    let state = &mut *guard;
                    let (request, mut events) = sender.on_request_completed(&mut state.cache, outcome, wallet.now());
                    next = request;
                    events.extend(wallet.balance_events(state));
                    events
                };
                wallet.shared.observers.dispatch(&events);
            }
        });
    }

    // ── Proofs ──

    pub fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        self.query(|s, _| proofs::sign_message(s.account.keys(), message))?
    }

    pub fn verify_message(&self, message: &str, address: &AccountPublicAddress, signature: &str) -> bool {
        proofs::verify_message(message, address, signature)
    }

    pub fn get_tx_proof(
        &self,
        txid: &Hash,
        address: &AccountPublicAddress,
        tx_key: &SecretKey,
    ) -> Result<String, WalletError> {
        self.query(|_, _| ())?;
        proofs::get_tx_proof(txid, address, tx_key)
    }

    /// Check a payment proof for a transaction known to this wallet.
    pub fn check_tx_proof(
        &self,
        txid: &Hash,
        address: &AccountPublicAddress,
        proof: &str,
    ) -> Result<bool, WalletError> {
        let extra = self.query(|_, cache| {
            cache
                .find_transaction_by_hash(txid)
                .and_then(|id| cache.get_transaction(id))
                .map(|t| t.extra.clone())
        })?;
        Ok(match extra {
            Some(extra) => proofs::check_tx_proof(txid, &extra, address, proof),
            None => {
                tracing::debug!("transaction {} is not known to this wallet", hex::encode(txid));
                false
            }
        })
    }

    pub fn get_reserve_proof(&self, reserve: u64, message: &str) -> Result<String, WalletError> {
        self.query(|s, cache| {
            let outputs: Vec<_> = s
                .container
                .outputs(OutputFilter::KEY_UNLOCKED)
                .into_iter()
                .filter(|o| !cache.is_used(&o.id()))
                .collect();
            let actual = self.calculate_actual_balance(s, cache);
            proofs::get_reserve_proof(s.account.keys(), outputs, actual, reserve, message)
        })?
    }

    // ── Synchronizer callbacks ──

    fn with_session_events(&self, f: impl FnOnce(&Session, &mut WalletUserTransactionsCache) -> Vec<WalletEvent>) {
        let events = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = &state.session else {
                return;
            };
            let mut events = f(session, &mut state.cache);
            events.extend(self.balance_events(state));
            events
        };
        self.shared.observers.dispatch(&events);
    }

    fn delete_outdated(&self, cache: &mut WalletUserTransactionsCache) -> Vec<WalletEvent> {
        let deleted = cache.delete_outdated_transactions(self.now(), self.shared.currency.mempool_tx_live_time);
        if !deleted.is_empty() {
            tracing::info!("dropped {} outdated unconfirmed transactions", deleted.len());
        }
        deleted.into_iter().map(WalletEvent::TransactionUpdated).collect()
    }

    pub fn synchronization_progress_updated(&self, current: u32, total: u32) {
        self.with_session_events(|_, cache| {
            let mut events = vec![WalletEvent::SynchronizationProgressUpdated { current, total }];
            events.extend(self.delete_outdated(cache));
            events
        });
    }

    pub fn synchronization_completed(&self, result: Result<(), WalletError>) {
        self.with_session_events(|_, cache| {
            let mut events = Vec::new();
            if result != Err(WalletError::OperationCancelled) {
                events.push(WalletEvent::SynchronizationCompleted(result.clone()));
            }
            if result.is_ok() {
                events.extend(self.delete_outdated(cache));
            }
            events
        });
    }

    /// The synchronizer added or updated `transaction_hash` in the
    /// container.
    pub fn on_transaction_updated(&self, transaction_hash: &Hash) {
        self.with_session_events(|session, cache| {
            let container = &session.container;
            let Some((info, amount_in, amount_out)) = container.transaction_information(transaction_hash) else {
                tracing::warn!(
                    "updated transaction {} is missing from the container",
                    hex::encode(transaction_hash)
                );
                return Vec::new();
            };
            let net = i64::try_from(i128::from(amount_out) - i128::from(amount_in)).unwrap_or_default();
            let deposit_filter = OutputFilter::TYPE_DEPOSIT | OutputFilter::STATE_ALL;
            let new_deposits = container.transaction_outputs(transaction_hash, deposit_filter);
            let spent_deposits = container.transaction_inputs(transaction_hash, deposit_filter);
            cache.on_transaction_updated(&info, net, &new_deposits, &spent_deposits, &self.shared.currency)
        });
    }

    pub fn on_transaction_deleted(&self, transaction_hash: &Hash) {
        self.with_session_events(|_, cache| cache.on_transaction_deleted(transaction_hash));
    }

    pub fn on_transfers_unlocked(&self, outputs: &[TransactionOutputInformation]) {
        self.with_session_events(|_, cache| {
            let unlocked = cache.unlock_deposits(outputs);
            if unlocked.is_empty() {
                Vec::new()
            } else {
                vec![WalletEvent::DepositsUpdated(unlocked)]
            }
        });
    }

    pub fn on_transfers_locked(&self, outputs: &[TransactionOutputInformation]) {
        self.with_session_events(|_, cache| {
            let locked = cache.lock_deposits(outputs);
            if locked.is_empty() {
                Vec::new()
            } else {
                vec![WalletEvent::DepositsUpdated(locked)]
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use crate::wallet::node::{NodeError, RandomOutputsForAmount};
    use crate::wallet::outputs::OutputLedger;
    use async_trait::async_trait;

    struct NullNode;

    #[async_trait]
    impl Node for NullNode {
        async fn get_random_outputs_for_amounts(
            &self,
            _amounts: Vec<u64>,
            _outs_count: u16,
        ) -> Result<Vec<RandomOutputsForAmount>, NodeError> {
            Err(NodeError("offline".into()))
        }

        async fn relay_transaction(&self, _transaction: &Transaction) -> Result<(), NodeError> {
            Err(NodeError("offline".into()))
        }

        fn last_local_block_height(&self) -> u32 {
            0
        }

        fn known_block_count(&self) -> u32 {
            0
        }
    }

    #[derive(Default)]
    struct LedgerSync {
        ledger: Arc<OutputLedger>,
    }

    impl Synchronizer for LedgerSync {
        fn add_subscription(&self, _keys: &AccountKeys, _start: u64) -> Arc<dyn TransfersContainer> {
            self.ledger.clone()
        }
        fn remove_subscription(&self, _address: &AccountPublicAddress) {}
        fn start(&self) {}
        fn stop(&self) {}
        fn save(&self) -> Vec<u8> {
            Vec::new()
        }
        fn load(&self, _state: &[u8]) -> Result<(), String> {
            Ok(())
        }
    }

    fn wallet() -> WalletLegacy {
        WalletLegacy::new(
            &WalletConfig::default(),
            Arc::new(NullNode),
            Arc::new(LedgerSync::default()),
        )
    }

    #[test]
    fn queries_require_initialization() {
        let wallet = wallet();
        assert_eq!(wallet.state(), WalletState::NotInitialized);
        assert_eq!(wallet.actual_balance(), Err(WalletError::NotInitialized));
        assert_eq!(wallet.get_transaction_count(), Err(WalletError::NotInitialized));
        assert_eq!(wallet.change_password("", "x"), Err(WalletError::NotInitialized));
    }

    #[test]
    fn double_init_is_rejected() {
        let wallet = wallet();
        wallet.init_and_generate("pw").unwrap();
        assert_eq!(wallet.state(), WalletState::Initialized);
        assert_eq!(wallet.init_and_generate("pw"), Err(WalletError::AlreadyInitialized));
        assert_eq!(wallet.actual_balance(), Ok(0));
    }

    #[test]
    fn deterministic_wallet_has_seed() {
        let wallet = wallet();
        wallet.init_and_generate_deterministic("").unwrap();
        let seed = wallet.get_seed().unwrap().unwrap();
        let keys = wallet.get_account_keys().unwrap();

        let restored = self::wallet();
        restored
            .init_from_seed(&SecretKey::from_hex(&seed).unwrap(), "")
            .unwrap();
        assert_eq!(restored.get_account_keys().unwrap(), keys);
    }

    #[test]
    fn change_password_checks_old() {
        let wallet = wallet();
        wallet.init_and_generate("old").unwrap();
        assert_eq!(wallet.change_password("nope", "new"), Err(WalletError::WrongPassword));
        wallet.change_password("old", "new").unwrap();
        wallet.change_password("new", "newer").unwrap();
    }

    #[test]
    fn sending_needs_a_runtime() {
        let wallet = wallet();
        wallet.init_and_generate("").unwrap();
        let transfer = WalletTransfer {
            address: wallet.get_address().unwrap(),
            amount: 1,
        };
        assert!(matches!(
            wallet.send_transaction_to(transfer, 0, &[], 0, 0),
            Err(WalletError::InternalWalletError(_))
        ));
    }

    #[test]
    fn cancel_is_impossible() {
        assert_eq!(wallet().cancel_transaction(0), Err(WalletError::TxCancelImpossible));
    }

    #[tokio::test]
    async fn tracking_wallet_cannot_send() {
        let wallet = wallet();
        let account = AccountBase::generate();
        let keys = AccountKeys::tracking(*account.address(), account.keys().view_secret_key.clone());
        wallet.init_with_keys(keys, "").unwrap();
        assert_eq!(wallet.is_tracking_wallet(), Ok(true));
        assert_eq!(wallet.get_seed(), Ok(None));
        let transfer = WalletTransfer {
            address: wallet.get_address().unwrap(),
            amount: 1,
        };
        assert_eq!(
            wallet.send_transaction_to(transfer, 0, &[], 0, 0),
            Err(WalletError::TrackingWalletOnly)
        );
        assert_eq!(wallet.sign_message("m"), Err(WalletError::TrackingWalletOnly));
    }

    #[tokio::test]
    async fn shutdown_returns_to_not_initialized() {
        let wallet = wallet();
        assert_eq!(wallet.shutdown().await, Err(WalletError::NotInitialized));
        wallet.init_and_generate("").unwrap();
        wallet.shutdown().await.unwrap();
        assert_eq!(wallet.state(), WalletState::NotInitialized);
        wallet.init_and_generate("").unwrap();
    }
}
