//! The wallet's own record of transactions, transfers and deposits.
//!
//! This is the only place financial state is mutated. Mutators return the
//! [`WalletEvent`]s they cause; the caller dispatches them after releasing
//! the wallet lock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::UNCONFIRMED_TRANSACTION_HEIGHT;
use crate::crypto::SecretKey;
use crate::currency::Currency;
use crate::transaction::extra::get_payment_id;
use crate::transaction::Transaction;
use crate::wallet::error::WalletError;
use crate::wallet::events::WalletEvent;
use crate::wallet::outputs::{OutputState, TransactionInformation, TransactionOutputInformation};
use crate::wallet::types::{
    Deposit, DepositId, Payments, TransactionId, TransactionMessage, TransactionState,
    TransferId, WalletTransaction, WalletTransfer,
};
use crate::wallet::unconfirmed::{OutputId, UnconfirmedTransactions};
use crate::Hash;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct DepositInfo {
    deposit: Deposit,
    output_in_transaction: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WalletUserTransactionsCache {
    transactions: Vec<WalletTransaction>,
    transfers: Vec<WalletTransfer>,
    deposits: Vec<DepositInfo>,
    unconfirmed: UnconfirmedTransactions,
    #[serde(skip)]
    output_to_deposit: HashMap<OutputId, DepositId>,
    #[serde(skip)]
    payments: HashMap<Hash, Vec<TransactionId>>,
}

impl WalletUserTransactionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Outgoing transactions ──

    /// Record a transaction this wallet is about to send. It starts in
    /// [`TransactionState::Sending`] with no hash.
    pub fn add_new_transaction(
        &mut self,
        total_amount: i64,
        fee: u64,
        extra: Vec<u8>,
        transfers: Vec<WalletTransfer>,
        unlock_time: u64,
        messages: Vec<TransactionMessage>,
    ) -> TransactionId {
        let first_transfer_id = (!transfers.is_empty()).then_some(self.transfers.len());
        let transfer_count = transfers.len();
        self.transfers.extend(transfers);

        let id = self.transactions.len();
        if let Some(payment_id) = get_payment_id(&extra) {
            self.payments.entry(payment_id).or_default().push(id);
        }
        self.transactions.push(WalletTransaction {
            first_transfer_id,
            transfer_count,
            first_deposit_id: None,
            deposit_count: 0,
            total_amount,
            fee,
            sent_time: 0,
            unlock_time,
            hash: [0u8; 32],
            secret_key: None,
            is_coinbase: false,
            block_height: UNCONFIRMED_TRANSACTION_HEIGHT,
            timestamp: 0,
            extra,
            state: TransactionState::Sending,
            messages: messages.into_iter().map(|m| m.message).collect(),
        });
        id
    }

    fn record_built(&mut self, id: TransactionId, tx: &Transaction, secret_key: SecretKey) -> Hash {
        let hash = tx.hash();
        if let Some(record) = self.transactions.get_mut(id) {
            record.hash = hash;
            record.extra = tx.prefix.extra.clone();
            record.secret_key = Some(secret_key);
        }
        hash
    }

    /// Change dust of `dust` went to the miner instead of back to us.
    pub fn add_dust_to_fee(&mut self, id: TransactionId, dust: u64) {
        if dust == 0 {
            return;
        }
        if let Some(record) = self.transactions.get_mut(id) {
            record.fee = record.fee.saturating_add(dust);
            record.total_amount = record.total_amount.saturating_sub_unsigned(dust);
        }
    }

    /// Attach the built transaction to record `id` and count it as
    /// unconfirmed: `amount` leaves the wallet, paid for by `used_outputs`.
    pub fn update_transaction(
        &mut self,
        id: TransactionId,
        tx: &Transaction,
        amount: u64,
        used_outputs: &[TransactionOutputInformation],
        secret_key: SecretKey,
        now: u64,
    ) {
        let hash = self.record_built(id, tx, secret_key);
        let outs_amount = used_outputs.iter().map(|o| o.amount).sum();
        let ids = used_outputs.iter().map(|o| o.id()).collect();
        self.unconfirmed.add(hash, id, amount, ids, outs_amount, now);
    }

    /// Attach a built withdrawal to record `id` and mark `deposit_ids` as
    /// spent by it.
    pub fn update_withdraw_transaction(
        &mut self,
        id: TransactionId,
        tx: &Transaction,
        secret_key: SecretKey,
        deposit_ids: &[DepositId],
        deposits_sum: u64,
        fee: u64,
        now: u64,
    ) {
        let hash = self.record_built(id, tx, secret_key);
        for deposit_id in deposit_ids {
            if let Some(info) = self.deposits.get_mut(*deposit_id) {
                info.deposit.spending_transaction_id.get_or_insert(id);
            }
        }
        self.unconfirmed
            .add_deposit_spending_transaction(hash, id, deposits_sum, fee, now);
    }

    /// A deposit of `total` (principal plus interest) is being created by
    /// `id`; the record itself appears once the chain shows the output.
    pub fn add_created_deposit(&mut self, id: TransactionId, total: u64) {
        self.unconfirmed.add_created_deposit(id, total);
    }

    /// Apply the outcome of relaying transaction `id`.
    pub fn update_transaction_sending_state(
        &mut self,
        id: TransactionId,
        result: &Result<(), WalletError>,
        now: u64,
    ) -> Vec<WalletEvent> {
        let Some(record) = self.transactions.get_mut(id) else {
            return Vec::new();
        };
        match result {
            Ok(()) => {
                record.sent_time = now;
                if record.state == TransactionState::Sending {
                    record.state = TransactionState::Active;
                }
                Vec::new()
            }
            Err(WalletError::OperationCancelled) => {
                record.state = TransactionState::Cancelled;
                self.rollback(id)
            }
            Err(_) => {
                record.state = TransactionState::Failed;
                self.rollback(id)
            }
        }
    }

    /// Undo every provisional effect of transaction `id`.
    fn rollback(&mut self, id: TransactionId) -> Vec<WalletEvent> {
        if let Some(record) = self.transactions.get(id) {
            let hash = record.hash;
            if hash != [0u8; 32] {
                self.unconfirmed.erase(&hash);
            }
        }
        self.unconfirmed.erase_created_deposit(id);
        let released = self.release_deposits_spent_by(id);
        if released.is_empty() {
            Vec::new()
        } else {
            vec![WalletEvent::DepositsUpdated(released)]
        }
    }

    fn release_deposits_spent_by(&mut self, id: TransactionId) -> Vec<DepositId> {
        let mut released = Vec::new();
        for (deposit_id, info) in self.deposits.iter_mut().enumerate() {
            if info.deposit.spending_transaction_id == Some(id) {
                info.deposit.spending_transaction_id = None;
                released.push(deposit_id);
            }
        }
        released
    }

    // ── Synchronizer updates ──

    /// Reconcile a transaction reported by the synchronizer.
    ///
    /// `net_amount` is its effect on the wallet. `new_deposit_outputs` are
    /// deposit outputs it created for this wallet; `spent_deposit_outputs`
    /// are deposit outputs it spent.
    pub fn on_transaction_updated(
        &mut self,
        info: &TransactionInformation,
        net_amount: i64,
        new_deposit_outputs: &[TransactionOutputInformation],
        spent_deposit_outputs: &[TransactionOutputInformation],
        currency: &Currency,
    ) -> Vec<WalletEvent> {
        let mut events = Vec::new();

        let existing = match self.unconfirmed.find_transaction_id(&info.transaction_hash) {
            Some(id) => {
                self.unconfirmed.erase(&info.transaction_hash);
                Some(id)
            }
            None => self.find_transaction_by_hash(&info.transaction_hash),
        };

        let id = match existing.and_then(|id| self.transactions.get_mut(id).map(|r| (id, r))) {
            Some((id, record)) => {
                record.block_height = info.block_height;
                record.timestamp = info.timestamp;
                record.state = TransactionState::Active;
                events.push(WalletEvent::TransactionUpdated(id));
                id
            }
            None => {
                let id = self.transactions.len();
                let is_coinbase = info.total_amount_in == 0;
                let fee = if is_coinbase {
                    0
                } else {
                    info.total_amount_in.saturating_sub(info.total_amount_out)
                };
                if let Some(payment_id) = info.payment_id {
                    self.payments.entry(payment_id).or_default().push(id);
                }
                self.transactions.push(WalletTransaction {
                    first_transfer_id: None,
                    transfer_count: 0,
                    first_deposit_id: None,
                    deposit_count: 0,
                    total_amount: net_amount,
                    fee,
                    sent_time: info.timestamp,
                    unlock_time: info.unlock_time,
                    hash: info.transaction_hash,
                    secret_key: None,
                    is_coinbase,
                    block_height: info.block_height,
                    timestamp: info.timestamp,
                    extra: info.extra.clone(),
                    state: TransactionState::Active,
                    messages: info.messages.clone(),
                });
                events.push(WalletEvent::ExternalTransactionCreated(id));
                id
            }
        };

        let mut updated_deposits = self.create_deposits(id, new_deposit_outputs, currency);
        for output in spent_deposit_outputs {
            let Some(deposit_id) = self.output_to_deposit.get(&output.id()).copied() else {
                continue;
            };
            let deposit = &mut self.deposits[deposit_id].deposit;
            if deposit.locked {
                tracing::warn!(
                    "transaction {} spends deposit {} which is still locked, ignoring",
                    id,
                    deposit_id
                );
                continue;
            }
            if deposit.spending_transaction_id.is_none() {
                deposit.spending_transaction_id = Some(id);
                updated_deposits.push(deposit_id);
            }
        }
        if !updated_deposits.is_empty() {
            events.push(WalletEvent::DepositsUpdated(updated_deposits));
        }
        events
    }

    fn create_deposits(
        &mut self,
        creating_id: TransactionId,
        outputs: &[TransactionOutputInformation],
        currency: &Currency,
    ) -> Vec<DepositId> {
        let mut created = Vec::new();
        for output in outputs {
            if self.output_to_deposit.contains_key(&output.id()) {
                continue;
            }
            let deposit_id = self.deposits.len();
            self.deposits.push(DepositInfo {
                deposit: Deposit {
                    creating_transaction_id: creating_id,
                    spending_transaction_id: None,
                    term: output.term,
                    amount: output.amount,
                    interest: currency.calculate_interest(output.amount, output.term),
                    locked: output.state != OutputState::Unlocked,
                },
                output_in_transaction: output.output_in_transaction,
            });
            self.output_to_deposit.insert(output.id(), deposit_id);
            created.push(deposit_id);
        }
        if !created.is_empty() {
            self.unconfirmed.erase_created_deposit(creating_id);
            if let Some(record) = self.transactions.get_mut(creating_id) {
                record.first_deposit_id.get_or_insert(created[0]);
                record.deposit_count += created.len();
            }
        }
        created
    }

    /// The synchronizer dropped `hash` from the chain or the pool.
    pub fn on_transaction_deleted(&mut self, hash: &Hash) -> Vec<WalletEvent> {
        let id = match self.unconfirmed.find_transaction_id(hash) {
            Some(id) => {
                self.unconfirmed.erase(hash);
                id
            }
            None => match self.find_transaction_by_hash(hash) {
                Some(id) => id,
                None => return Vec::new(),
            },
        };
        self.unconfirmed.erase_created_deposit(id);

        let mut events = Vec::new();
        if let Some(record) = self.transactions.get_mut(id) {
            record.block_height = UNCONFIRMED_TRANSACTION_HEIGHT;
            record.timestamp = 0;
            record.state = TransactionState::Deleted;
            events.push(WalletEvent::TransactionUpdated(id));
        }
        let released = self.release_deposits_spent_by(id);
        if !released.is_empty() {
            events.push(WalletEvent::DepositsUpdated(released));
        }
        events
    }

    /// Mark unconfirmed transactions older than `live_time` as deleted.
    pub fn delete_outdated_transactions(&mut self, now: u64, live_time: u64) -> Vec<TransactionId> {
        let deleted = self.unconfirmed.delete_outdated(now, live_time);
        for id in &deleted {
            if let Some(record) = self.transactions.get_mut(*id) {
                record.state = TransactionState::Deleted;
            }
            self.release_deposits_spent_by(*id);
        }
        deleted
    }

    pub fn unlock_deposits(&mut self, outputs: &[TransactionOutputInformation]) -> Vec<DepositId> {
        self.set_deposits_locked(outputs, false)
    }

    pub fn lock_deposits(&mut self, outputs: &[TransactionOutputInformation]) -> Vec<DepositId> {
        self.set_deposits_locked(outputs, true)
    }

    fn set_deposits_locked(
        &mut self,
        outputs: &[TransactionOutputInformation],
        locked: bool,
    ) -> Vec<DepositId> {
        let mut changed = Vec::new();
        for output in outputs {
            let Some(deposit_id) = self.output_to_deposit.get(&output.id()).copied() else {
                continue;
            };
            let deposit = &mut self.deposits[deposit_id].deposit;
            if deposit.locked != locked {
                deposit.locked = locked;
                changed.push(deposit_id);
            }
        }
        changed
    }

    // ── Queries ──

    /// Transactions that have not been deleted.
    pub fn get_transaction_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.state != TransactionState::Deleted)
            .count()
    }

    pub fn get_transfer_count(&self) -> usize {
        self.transfers.len()
    }

    pub fn get_deposit_count(&self) -> usize {
        self.deposits.len()
    }

    pub fn get_transaction(&self, id: TransactionId) -> Option<&WalletTransaction> {
        self.transactions.get(id)
    }

    /// Every record, deleted ones included, indexed by id.
    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    pub fn get_transfer(&self, id: TransferId) -> Option<&WalletTransfer> {
        self.transfers.get(id)
    }

    pub fn get_deposit(&self, id: DepositId) -> Option<&Deposit> {
        self.deposits.get(id).map(|d| &d.deposit)
    }

    /// `(creating transaction hash, index in transaction)` of a deposit.
    pub fn deposit_output(&self, id: DepositId) -> Option<OutputId> {
        let info = self.deposits.get(id)?;
        let creating = self.transactions.get(info.deposit.creating_transaction_id)?;
        Some((creating.hash, info.output_in_transaction))
    }

    pub fn find_transaction_by_hash(&self, hash: &Hash) -> Option<TransactionId> {
        self.transactions.iter().position(|t| t.hash == *hash)
    }

    pub fn find_transaction_by_transfer_id(&self, transfer_id: TransferId) -> Option<TransactionId> {
        self.transactions
            .iter()
            .position(|t| t.transfer_ids().contains(&transfer_id))
    }

    pub fn get_transactions_by_payment_ids(&self, payment_ids: &[Hash]) -> Vec<Payments> {
        payment_ids
            .iter()
            .map(|payment_id| Payments {
                payment_id: *payment_id,
                transactions: self
                    .payments
                    .get(payment_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| self.transactions.get(*id))
                    .filter(|t| t.state == TransactionState::Active)
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Whether an unconfirmed send already spends `output`.
    pub fn is_used(&self, output: &OutputId) -> bool {
        self.unconfirmed.is_used(output)
    }

    pub fn unconfirmed(&self) -> &UnconfirmedTransactions {
        &self.unconfirmed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Rebuild the lookup tables that are not persisted.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.unconfirmed.rebuild_index();
        self.output_to_deposit.clear();
        for (deposit_id, info) in self.deposits.iter().enumerate() {
            if let Some(creating) = self.transactions.get(info.deposit.creating_transaction_id) {
                self.output_to_deposit
                    .insert((creating.hash, info.output_in_transaction), deposit_id);
            }
        }
        self.payments.clear();
        for (id, record) in self.transactions.iter().enumerate() {
            if let Some(payment_id) = get_payment_id(&record.extra) {
                self.payments.entry(payment_id).or_default().push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountBase;
    use crate::crypto::{KeyPair, PublicKey};
    use crate::transaction::builder::{TransactionBuilder, TransactionSourceEntry};
    use crate::transaction::extra;
    use crate::wallet::outputs::OutputType;

    fn info(hash: u8, height: u32, amount_in: u64, amount_out: u64) -> TransactionInformation {
        TransactionInformation {
            transaction_hash: [hash; 32],
            public_key: PublicKey::default(),
            block_height: height,
            timestamp: 1_000,
            unlock_time: 0,
            total_amount_in: amount_in,
            total_amount_out: amount_out,
            extra: Vec::new(),
            payment_id: None,
            messages: Vec::new(),
        }
    }

    fn deposit_output(hash: u8, index: u32, amount: u64, term: u32, state: OutputState) -> TransactionOutputInformation {
        TransactionOutputInformation {
            output_type: OutputType::Multisignature,
            amount,
            global_output_index: index,
            output_in_transaction: index,
            transaction_hash: [hash; 32],
            transaction_public_key: PublicKey::default(),
            output_key: PublicKey::default(),
            required_signatures: 1,
            term,
            state,
        }
    }

    fn built_transaction() -> Transaction {
        let owner = AccountBase::generate();
        let earlier = KeyPair::generate();
        let key = owner.keys().derive_output_key(&earlier.public, 0).unwrap();
        TransactionBuilder::new(owner.keys())
            .add_key_input(TransactionSourceEntry {
                outputs: vec![(1, key)],
                real_output: 0,
                real_transaction_public_key: earlier.public,
                real_output_in_transaction: 0,
                amount: 1000,
            })
            .add_output(*owner.address(), 900)
            .build()
            .unwrap()
            .0
    }

    fn used_output(amount: u64) -> TransactionOutputInformation {
        TransactionOutputInformation {
            output_type: OutputType::Key,
            ..deposit_output(3, 0, amount, 0, OutputState::Unlocked)
        }
    }

    fn transfer(amount: i64) -> WalletTransfer {
        WalletTransfer {
            address: "addr".into(),
            amount,
        }
    }

    #[test]
    fn sent_transaction_lifecycle() {
        let mut cache = WalletUserTransactionsCache::new();
        let id = cache.add_new_transaction(-1000, 100, Vec::new(), vec![transfer(900)], 0, Vec::new());
        assert_eq!(cache.get_transaction(id).unwrap().state, TransactionState::Sending);
        assert_eq!(cache.find_transaction_by_transfer_id(0), Some(id));

        let tx = built_transaction();
        cache.update_transaction(id, &tx, 1000, &[used_output(1000)], SecretKey::random(), 50);
        assert!(cache.is_used(&([3; 32], 0)));
        assert_eq!(cache.unconfirmed().unconfirmed_outs_amount(), 1000);

        let events = cache.update_transaction_sending_state(id, &Ok(()), 60);
        assert!(events.is_empty());
        let record = cache.get_transaction(id).unwrap();
        assert_eq!(record.state, TransactionState::Active);
        assert_eq!(record.hash, tx.hash());
        assert!(record.secret_key.is_some());

        // Confirmation clears the unconfirmed entry but keeps the id.
        let mut confirmed = info(0, 10, 1000, 900);
        confirmed.transaction_hash = tx.hash();
        let events = cache.on_transaction_updated(&confirmed, -1000, &[], &[], &Currency::default());
        assert_eq!(events, vec![WalletEvent::TransactionUpdated(id)]);
        assert_eq!(cache.unconfirmed().unconfirmed_outs_amount(), 0);
        assert_eq!(cache.get_transaction(id).unwrap().block_height, 10);
    }

    #[test]
    fn failed_send_rolls_back() {
        let mut cache = WalletUserTransactionsCache::new();
        let id = cache.add_new_transaction(-1000, 100, Vec::new(), vec![transfer(900)], 0, Vec::new());
        cache.add_created_deposit(id, 777);
        let tx = built_transaction();
        cache.update_transaction(id, &tx, 1000, &[used_output(1000)], SecretKey::random(), 50);

        cache.update_transaction_sending_state(id, &Err(WalletError::Node("refused".into())), 60);
        assert_eq!(cache.get_transaction(id).unwrap().state, TransactionState::Failed);
        assert!(!cache.is_used(&([3; 32], 0)));
        assert_eq!(cache.unconfirmed().created_deposits_sum(), 0);

        let other = cache.add_new_transaction(-5, 0, Vec::new(), Vec::new(), 0, Vec::new());
        cache.update_transaction_sending_state(other, &Err(WalletError::OperationCancelled), 60);
        assert_eq!(cache.get_transaction(other).unwrap().state, TransactionState::Cancelled);
    }

    #[test]
    fn external_transaction_and_deposits() {
        let mut cache = WalletUserTransactionsCache::new();
        let currency = Currency::default();
        let term = currency.deposit_min_term;
        let amount = currency.deposit_min_amount;
        let output = deposit_output(1, 0, amount, term, OutputState::Locked);

        let events = cache.on_transaction_updated(&info(1, 5, 2 * amount, 2 * amount - 10), 0, &[output.clone()], &[], &currency);
        assert_eq!(
            events,
            vec![
                WalletEvent::ExternalTransactionCreated(0),
                WalletEvent::DepositsUpdated(vec![0])
            ]
        );
        let record = cache.get_transaction(0).unwrap();
        assert_eq!(record.fee, 10);
        assert!(!record.is_coinbase);
        assert_eq!(record.first_deposit_id, Some(0));
        let deposit = cache.get_deposit(0).unwrap();
        assert!(deposit.locked);
        assert_eq!(deposit.interest, currency.calculate_interest(amount, term));

        // Reporting the same output again does not duplicate the deposit.
        cache.on_transaction_updated(&info(1, 6, 2 * amount, 2 * amount - 10), 0, &[output.clone()], &[], &currency);
        assert_eq!(cache.get_deposit_count(), 1);

        assert_eq!(cache.unlock_deposits(&[output.clone()]), vec![0]);
        assert!(cache.unlock_deposits(&[output.clone()]).is_empty());

        // A withdrawal marks it spent once.
        let events = cache.on_transaction_updated(&info(2, 7, amount, amount - 10), 0, &[], &[output.clone()], &currency);
        assert!(events.contains(&WalletEvent::DepositsUpdated(vec![0])));
        assert_eq!(cache.get_deposit(0).unwrap().spending_transaction_id, Some(1));
        let events = cache.on_transaction_updated(&info(3, 8, amount, amount - 10), 0, &[], &[output.clone()], &currency);
        assert!(!events.iter().any(|e| matches!(e, WalletEvent::DepositsUpdated(_))));

        // Dropping the withdrawal releases the deposit.
        let events = cache.on_transaction_deleted(&[2; 32]);
        assert_eq!(
            events,
            vec![
                WalletEvent::TransactionUpdated(1),
                WalletEvent::DepositsUpdated(vec![0])
            ]
        );
        assert_eq!(cache.get_deposit(0).unwrap().spending_transaction_id, None);
        assert_eq!(cache.get_transaction(1).unwrap().state, TransactionState::Deleted);
    }

    #[test]
    fn locked_deposit_is_not_marked_spent() {
        let mut cache = WalletUserTransactionsCache::new();
        let currency = Currency::default();
        let amount = currency.deposit_min_amount;
        let output = deposit_output(1, 0, amount, currency.deposit_min_term, OutputState::Locked);
        cache.on_transaction_updated(&info(1, 5, 2 * amount, 2 * amount - 10), 0, &[output.clone()], &[], &currency);

        let events = cache.on_transaction_updated(&info(2, 7, amount, amount - 10), 0, &[], &[output.clone()], &currency);
        assert!(!events.iter().any(|e| matches!(e, WalletEvent::DepositsUpdated(_))));
        let deposit = cache.get_deposit(0).unwrap();
        assert!(deposit.locked);
        assert_eq!(deposit.spending_transaction_id, None);
    }

    #[test]
    fn coinbase_has_no_fee() {
        let mut cache = WalletUserTransactionsCache::new();
        cache.on_transaction_updated(&info(1, 5, 0, 500), 500, &[], &[], &Currency::default());
        let record = cache.get_transaction(0).unwrap();
        assert!(record.is_coinbase);
        assert_eq!(record.fee, 0);
        assert!(cache.on_transaction_deleted(&[9; 32]).is_empty());
    }

    #[test]
    fn outdated_transactions_leave_the_count() {
        let mut cache = WalletUserTransactionsCache::new();
        let id = cache.add_new_transaction(-1000, 100, Vec::new(), vec![transfer(900)], 0, Vec::new());
        cache.update_transaction(id, &built_transaction(), 1000, &[used_output(1000)], SecretKey::random(), 50);
        cache.update_transaction_sending_state(id, &Ok(()), 50);
        assert_eq!(cache.get_transaction_count(), 1);

        assert!(cache.delete_outdated_transactions(100, 100).is_empty());
        assert_eq!(cache.delete_outdated_transactions(150, 100), vec![id]);
        assert_eq!(cache.get_transaction_count(), 0);
        assert_eq!(cache.unconfirmed().unconfirmed_transactions_amount(), 0);
    }

    #[test]
    fn payment_index_survives_serialization() {
        let mut cache = WalletUserTransactionsCache::new();
        let mut tx_extra = Vec::new();
        extra::add_payment_id(&mut tx_extra, &[4; 32]);
        let mut incoming = info(1, 5, 100, 90);
        incoming.extra = tx_extra;
        incoming.payment_id = Some([4; 32]);
        cache.on_transaction_updated(&incoming, 90, &[], &[], &Currency::default());

        let bytes = crate::serialize(&cache).unwrap();
        let mut loaded: WalletUserTransactionsCache = crate::deserialize(&bytes).unwrap();
        loaded.rebuild_indexes();
        let payments = loaded.get_transactions_by_payment_ids(&[[4; 32], [5; 32]]);
        assert_eq!(payments[0].transactions.len(), 1);
        assert!(payments[1].transactions.is_empty());
    }
}
