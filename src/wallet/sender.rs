//! Builds, signs and relays wallet transactions.
//!
//! A send starts synchronously under the wallet lock: validate, select
//! outputs, record the transaction as `Sending`. What follows is a chain of
//! [`WalletRequest`]s performed without the lock; each outcome is fed back
//! through [`WalletTransactionSender::on_request_completed`] to get the next
//! one. Cache effects are only recorded once the transaction is built, and
//! any later failure rolls them back.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::account::{AccountKeys, AccountPublicAddress};
use crate::constants::{MAX_MESSAGES_PER_TX, MAX_MESSAGE_SIZE};
use crate::crypto::PublicKey;
use crate::currency::{decompose_amount, Currency};
use crate::transaction::builder::{
    MultisignatureSourceEntry, TransactionBuilder, TransactionSourceEntry,
};
use crate::transaction::extra::parse_extra;
use crate::transaction::Transaction;
use crate::wallet::cache::WalletUserTransactionsCache;
use crate::wallet::error::WalletError;
use crate::wallet::events::WalletEvent;
use crate::wallet::node::{NodeError, RandomOutputsForAmount};
use crate::wallet::outputs::{OutputFilter, TransactionOutputInformation, TransfersContainer};
use crate::wallet::request::{
    Continuation, RequestOutcome, SendKind, SendTransactionContext, WalletRequest,
};
use crate::wallet::types::{DepositId, TransactionId, TransactionMessage, WalletTransfer};

pub struct WalletTransactionSender {
    currency: Currency,
    keys: AccountKeys,
    container: Arc<dyn TransfersContainer>,
    /// Drop change below the dust threshold into the fee.
    dust_to_fee: bool,
    is_stopping: AtomicBool,
}

impl WalletTransactionSender {
    pub fn new(
        currency: Currency,
        keys: AccountKeys,
        container: Arc<dyn TransfersContainer>,
        dust_to_fee: bool,
    ) -> Self {
        WalletTransactionSender {
            currency,
            keys,
            container,
            dust_to_fee,
            is_stopping: AtomicBool::new(false),
        }
    }

    pub fn init(&self) {
        self.is_stopping.store(false, Ordering::SeqCst);
    }

    /// Refuse to continue any request chain in flight.
    pub fn stop(&self) {
        self.is_stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.is_stopping.load(Ordering::SeqCst)
    }

    // ── Entry points ──

    /// Start an ordinary transfer. `ttl` is an absolute expiry time or zero.
    #[allow(clippy::too_many_arguments)]
    pub fn make_send_request(
        &self,
        cache: &mut WalletUserTransactionsCache,
        transfers: &[WalletTransfer],
        fee: u64,
        extra: &[u8],
        mix_in: u64,
        unlock_timestamp: u64,
        messages: &[TransactionMessage],
        ttl: u64,
        now: u64,
    ) -> Result<(TransactionId, Continuation), WalletError> {
        let destinations = self.validate_transfers(transfers)?;
        let destinations_sum = destinations
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(WalletError::SumOverflow)?;
        if !self.currency.is_valid_mixin(mix_in) {
            return Err(WalletError::WrongMixin);
        }
        if ttl != 0 && fee != 0 {
            return Err(WalletError::WrongAmount);
        }
        if ttl == 0 && fee < self.currency.minimum_fee {
            return Err(WalletError::FeeTooSmall);
        }
        if !extra.is_empty() && parse_extra(extra).is_err() {
            return Err(WalletError::WrongPaymentId);
        }
        self.validate_messages(messages)?;

        let needed_money = destinations_sum
            .checked_add(fee)
            .ok_or(WalletError::SumOverflow)?;
        let total_amount = i64::try_from(needed_money).map_err(|_| WalletError::SumOverflow)?;
        let (found_money, selected) = self.select_transfers_to_send(cache, needed_money, mix_in == 0);
        if found_money < needed_money {
            return Err(WalletError::InsufficientFunds);
        }

        let transaction_id = cache.add_new_transaction(
            -total_amount,
            fee,
            extra.to_vec(),
            transfers.to_vec(),
            unlock_timestamp,
            messages.to_vec(),
        );
        tracing::info!(
            "sending transaction {}: {} to {} destinations, fee {}, mixin {}",
            transaction_id,
            self.currency.format_amount(destinations_sum),
            destinations.len(),
            self.currency.format_amount(fee),
            mix_in
        );
        let context = Box::new(SendTransactionContext {
            transaction_id,
            kind: SendKind::Transfer { destinations },
            selected_transfers: selected,
            outs: Vec::new(),
            found_money,
            needed_money,
            mix_in,
            fee,
            extra: extra.to_vec(),
            unlock_time: unlock_timestamp,
            messages: messages.to_vec(),
            ttl,
        });
        Ok((transaction_id, self.first_step(cache, context, now)))
    }

    /// Start a deposit of `amount` locked for `term` blocks. Term and amount
    /// bounds are checked by the caller.
    pub fn make_deposit_request(
        &self,
        cache: &mut WalletUserTransactionsCache,
        term: u32,
        amount: u64,
        fee: u64,
        mix_in: u64,
        now: u64,
    ) -> Result<(TransactionId, Continuation), WalletError> {
        if !self.currency.is_valid_mixin(mix_in) {
            return Err(WalletError::WrongMixin);
        }
        if fee < self.currency.minimum_fee {
            return Err(WalletError::FeeTooSmall);
        }
        let needed_money = amount.checked_add(fee).ok_or(WalletError::SumOverflow)?;
        let total_amount = i64::try_from(needed_money).map_err(|_| WalletError::SumOverflow)?;
        let (found_money, selected) = self.select_transfers_to_send(cache, needed_money, mix_in == 0);
        if found_money < needed_money {
            return Err(WalletError::InsufficientFunds);
        }

        let transaction_id =
            cache.add_new_transaction(-total_amount, fee, Vec::new(), Vec::new(), 0, Vec::new());
        tracing::info!(
            "creating deposit {}: {} for {} blocks",
            transaction_id,
            self.currency.format_amount(amount),
            term
        );
        let context = Box::new(SendTransactionContext {
            transaction_id,
            kind: SendKind::Deposit { amount, term },
            selected_transfers: selected,
            outs: Vec::new(),
            found_money,
            needed_money,
            mix_in,
            fee,
            extra: Vec::new(),
            unlock_time: 0,
            messages: Vec::new(),
            ttl: 0,
        });
        Ok((transaction_id, self.first_step(cache, context, now)))
    }

    /// Withdraw unlocked deposits to the wallet's own address.
    pub fn make_withdraw_deposit_request(
        &self,
        cache: &mut WalletUserTransactionsCache,
        deposit_ids: &[DepositId],
        fee: u64,
        now: u64,
    ) -> Result<(TransactionId, Continuation), WalletError> {
        let mut seen = HashSet::with_capacity(deposit_ids.len());
        if !deposit_ids.iter().all(|id| seen.insert(*id)) {
            return Err(WalletError::WrongAmount);
        }
        let mut selected = Vec::with_capacity(deposit_ids.len());
        let mut found_money = 0u64;
        for id in deposit_ids {
            let deposit = cache.get_deposit(*id).ok_or(WalletError::DepositDoesNotExist)?;
            if deposit.locked {
                return Err(WalletError::DepositLocked);
            }
            if deposit.spending_transaction_id.is_some() {
                return Err(WalletError::DepositAlreadySpent);
            }
            let (hash, index) = cache.deposit_output(*id).ok_or(WalletError::DepositDoesNotExist)?;
            let output = self
                .container
                .transaction_outputs(&hash, OutputFilter::TYPE_DEPOSIT | OutputFilter::STATE_ALL)
                .into_iter()
                .find(|o| o.output_in_transaction == index)
                .ok_or(WalletError::DepositDoesNotExist)?;
            found_money = deposit
                .amount
                .checked_add(deposit.interest)
                .and_then(|total| found_money.checked_add(total))
                .ok_or(WalletError::SumOverflow)?;
            selected.push((output, deposit.interest));
        }
        if found_money < fee {
            return Err(WalletError::WrongAmount);
        }
        let payout = found_money - fee;
        let total_amount = i64::try_from(payout).map_err(|_| WalletError::SumOverflow)?;

        let transaction_id =
            cache.add_new_transaction(total_amount, fee, Vec::new(), Vec::new(), 0, Vec::new());
        tracing::info!(
            "withdrawing {} deposits in transaction {}: {}",
            deposit_ids.len(),
            transaction_id,
            self.currency.format_amount(payout)
        );

        let built = self.build_withdraw_transaction(&selected, payout).and_then(|built| {
            self.check_size(&built.0)?;
            Ok(built)
        });
        let (transaction, secret_key, dropped_dust) = match built {
            Ok(built) => built,
            Err(e) => {
                tracing::error!("failed to build withdrawal {}: {}", transaction_id, e);
                return Ok((transaction_id, self.fail(cache, transaction_id, e, now)));
            }
        };
        let fee = fee + dropped_dust;
        cache.add_dust_to_fee(transaction_id, dropped_dust);
        cache.update_withdraw_transaction(
            transaction_id,
            &transaction,
            secret_key,
            deposit_ids,
            found_money,
            fee,
            now,
        );
        let context = Box::new(SendTransactionContext {
            transaction_id,
            kind: SendKind::Withdraw {
                deposit_ids: deposit_ids.to_vec(),
                deposits_sum: found_money,
            },
            selected_transfers: selected.into_iter().map(|(o, _)| o).collect(),
            outs: Vec::new(),
            found_money,
            needed_money: fee,
            mix_in: 0,
            fee,
            extra: Vec::new(),
            unlock_time: 0,
            messages: Vec::new(),
            ttl: 0,
        });
        Ok((
            transaction_id,
            (Some(WalletRequest::Relay { context, transaction }), Vec::new()),
        ))
    }

    /// Feed a performed request back and get the next step.
    pub fn on_request_completed(
        &self,
        cache: &mut WalletUserTransactionsCache,
        outcome: RequestOutcome,
        now: u64,
    ) -> Continuation {
        match outcome {
            RequestOutcome::RandomOutputs { context, result } => {
                self.on_random_outputs(cache, context, result, now)
            }
            RequestOutcome::Relayed { context, result } => self.on_relayed(cache, context, result, now),
        }
    }

    // ── Stages ──

    fn first_step(
        &self,
        cache: &mut WalletUserTransactionsCache,
        context: Box<SendTransactionContext>,
        now: u64,
    ) -> Continuation {
        if context.mix_in == 0 {
            return self.do_send_transaction(cache, context, now);
        }
        let amounts = context.selected_transfers.iter().map(|o| o.amount).collect();
        let outs_count = u16::try_from(context.mix_in + 1).unwrap_or(u16::MAX);
        (
            Some(WalletRequest::GetRandomOutputs {
                context,
                amounts,
                outs_count,
            }),
            Vec::new(),
        )
    }

    fn on_random_outputs(
        &self,
        cache: &mut WalletUserTransactionsCache,
        mut context: Box<SendTransactionContext>,
        result: Result<Vec<RandomOutputsForAmount>, NodeError>,
        now: u64,
    ) -> Continuation {
        let id = context.transaction_id;
        if self.is_stopping() {
            return self.fail(cache, id, WalletError::OperationCancelled, now);
        }
        context.outs = match result {
            Ok(outs) => outs,
            Err(e) => {
                tracing::warn!("failed to get random outputs for transaction {}: {}", id, e);
                return self.fail(cache, id, WalletError::Node(e.0), now);
            }
        };
        if !check_if_enough_mixins(&context.outs, &context.selected_transfers, context.mix_in) {
            return self.fail(cache, id, WalletError::MixinTooLow, now);
        }
        self.do_send_transaction(cache, context, now)
    }

    fn do_send_transaction(
        &self,
        cache: &mut WalletUserTransactionsCache,
        context: Box<SendTransactionContext>,
        now: u64,
    ) -> Continuation {
        match self.build_transaction(cache, &context, now) {
            Ok(transaction) => (Some(WalletRequest::Relay { context, transaction }), Vec::new()),
            Err(e) => {
                tracing::error!("failed to build transaction {}: {}", context.transaction_id, e);
                self.fail(cache, context.transaction_id, e, now)
            }
        }
    }

    fn on_relayed(
        &self,
        cache: &mut WalletUserTransactionsCache,
        context: Box<SendTransactionContext>,
        result: Result<(), NodeError>,
        now: u64,
    ) -> Continuation {
        let id = context.transaction_id;
        let result = if self.is_stopping() {
            Err(WalletError::OperationCancelled)
        } else {
            result.map_err(|e| {
                tracing::warn!("relay of transaction {} failed: {}", id, e);
                WalletError::Node(e.0)
            })
        };
        let mut events = cache.update_transaction_sending_state(id, &result, now);
        events.push(WalletEvent::SendTransactionCompleted {
            transaction_id: id,
            result,
        });
        (None, events)
    }

    fn fail(
        &self,
        cache: &mut WalletUserTransactionsCache,
        id: TransactionId,
        error: WalletError,
        now: u64,
    ) -> Continuation {
        let result = Err(error);
        let mut events = cache.update_transaction_sending_state(id, &result, now);
        events.push(WalletEvent::SendTransactionCompleted {
            transaction_id: id,
            result,
        });
        (None, events)
    }

    // ── Building ──

    fn build_transaction(
        &self,
        cache: &mut WalletUserTransactionsCache,
        context: &SendTransactionContext,
        now: u64,
    ) -> Result<Transaction, WalletError> {
        let own = self.keys.address;
        let threshold = self.currency.default_dust_threshold;
        let change = context
            .found_money
            .checked_sub(context.needed_money)
            .ok_or_else(|| WalletError::InternalWalletError("selected less than needed".into()))?;

        let mut builder = TransactionBuilder::new(&self.keys)
            .set_extra(context.extra.clone())
            .set_unlock_time(context.unlock_time);
        for source in self.prepare_key_inputs(context)? {
            builder = builder.add_key_input(source);
        }

        let mut key_outputs: Vec<(AccountPublicAddress, u64)> = Vec::new();
        match &context.kind {
            SendKind::Transfer { destinations } => {
                for (address, amount) in destinations {
                    let (chunks, dust) = decompose_amount(*amount, threshold);
                    key_outputs.extend(chunks.into_iter().map(|c| (*address, c)));
                    if dust != 0 {
                        key_outputs.push((*address, dust));
                    }
                }
            }
            SendKind::Deposit { amount, term } => {
                builder = builder.add_deposit_output(own, *amount, *term);
            }
            SendKind::Withdraw { .. } => {
                return Err(WalletError::InternalWalletError(
                    "withdrawals are built without decoys".into(),
                ));
            }
        }
        let change_outputs = self.split_change(change);
        let dropped_dust = change - change_outputs.iter().map(|(_, a)| *a).sum::<u64>();
        key_outputs.extend(change_outputs);
        key_outputs.shuffle(&mut rand::rng());
        for (address, amount) in key_outputs {
            builder = builder.add_output(address, amount);
        }

        for message in &context.messages {
            let address = self
                .currency
                .parse_account_address_string(&message.address)?;
            builder = builder.add_message(address, message.message.clone());
        }
        if context.ttl != 0 {
            builder = builder.set_ttl(context.ttl);
        }

        let (transaction, secret_key) = builder.build()?;
        self.check_size(&transaction)?;

        cache.add_dust_to_fee(context.transaction_id, dropped_dust);
        cache.update_transaction(
            context.transaction_id,
            &transaction,
            context.needed_money + dropped_dust,
            &context.selected_transfers,
            secret_key,
            now,
        );
        if let SendKind::Deposit { amount, term } = &context.kind {
            let interest = self.currency.calculate_interest(*amount, *term);
            cache.add_created_deposit(context.transaction_id, amount.saturating_add(interest));
        }
        Ok(transaction)
    }

    fn build_withdraw_transaction(
        &self,
        deposits: &[(TransactionOutputInformation, u64)],
        payout: u64,
    ) -> Result<(Transaction, crate::crypto::SecretKey, u64), WalletError> {
        let mut builder = TransactionBuilder::new(&self.keys);
        for (output, interest) in deposits {
            builder = builder.add_multisignature_input(MultisignatureSourceEntry {
                amount: output.amount,
                interest: *interest,
                global_output_index: output.global_output_index,
                term: output.term,
                required_signatures: output.required_signatures,
                transaction_public_key: output.transaction_public_key,
                output_in_transaction: output.output_in_transaction as usize,
            });
        }
        let outputs = self.split_change(payout);
        let dropped_dust = payout - outputs.iter().map(|(_, a)| *a).sum::<u64>();
        for (address, amount) in outputs {
            builder = builder.add_output(address, amount);
        }
        let (tx, key) = builder.build()?;
        Ok((tx, key, dropped_dust))
    }

    /// Digit-split an amount returning to the wallet.
    fn split_change(&self, change: u64) -> Vec<(AccountPublicAddress, u64)> {
        let own = self.keys.address;
        let (chunks, dust) = decompose_amount(change, self.currency.default_dust_threshold);
        let mut outputs: Vec<_> = chunks.into_iter().map(|c| (own, c)).collect();
        if dust != 0 && !self.dust_to_fee {
            outputs.push((own, dust));
        }
        outputs
    }

    /// Rings for every selected output: decoys sorted by global index with
    /// the real output inserted in order.
    fn prepare_key_inputs(
        &self,
        context: &SendTransactionContext,
    ) -> Result<Vec<TransactionSourceEntry>, WalletError> {
        let mut sources = Vec::with_capacity(context.selected_transfers.len());
        for (i, selected) in context.selected_transfers.iter().enumerate() {
            let mut ring: Vec<(u32, PublicKey)> = Vec::new();
            if let Some(decoys) = context.outs.get(i) {
                let mut candidates = decoys.outs.clone();
                candidates.sort_by_key(|o| o.global_amount_index);
                for candidate in candidates {
                    if ring.len() as u64 >= context.mix_in {
                        break;
                    }
                    if candidate.global_amount_index == selected.global_output_index {
                        continue;
                    }
                    ring.push((candidate.global_amount_index, candidate.out_key));
                }
            }
            let real_output = ring
                .iter()
                .position(|(index, _)| *index >= selected.global_output_index)
                .unwrap_or(ring.len());
            ring.insert(real_output, (selected.global_output_index, selected.output_key));

            let (ephemeral, _) = self.keys.derive_ephemeral(
                &selected.transaction_public_key,
                selected.output_in_transaction as usize,
            )?;
            if ephemeral.public != selected.output_key {
                tracing::error!(
                    "derived public key mismatch for output {} of transaction {}",
                    selected.output_in_transaction,
                    hex::encode(selected.transaction_hash)
                );
                return Err(WalletError::InternalWalletError(
                    "derived public key does not match output key".into(),
                ));
            }

            sources.push(TransactionSourceEntry {
                outputs: ring,
                real_output,
                real_transaction_public_key: selected.transaction_public_key,
                real_output_in_transaction: selected.output_in_transaction as usize,
                amount: selected.amount,
            });
        }
        Ok(sources)
    }

    fn check_size(&self, transaction: &Transaction) -> Result<(), WalletError> {
        let size = transaction.size();
        if size > self.currency.max_transaction_size {
            tracing::warn!(
                "transaction size {} exceeds limit {}",
                size,
                self.currency.max_transaction_size
            );
            return Err(WalletError::TransactionSizeTooBig);
        }
        Ok(())
    }

    // ── Validation and selection ──

    fn validate_transfers(
        &self,
        transfers: &[WalletTransfer],
    ) -> Result<Vec<(AccountPublicAddress, u64)>, WalletError> {
        if transfers.is_empty() {
            return Err(WalletError::ZeroDestination);
        }
        transfers
            .iter()
            .map(|transfer| {
                if transfer.amount <= 0 {
                    return Err(WalletError::ZeroDestination);
                }
                let address = self
                    .currency
                    .parse_account_address_string(&transfer.address)
                    .map_err(|_| WalletError::BadAddress)?;
                Ok((address, transfer.amount.unsigned_abs()))
            })
            .collect()
    }

    fn validate_messages(&self, messages: &[TransactionMessage]) -> Result<(), WalletError> {
        if messages.len() > MAX_MESSAGES_PER_TX
            || messages.iter().any(|m| m.message.len() > MAX_MESSAGE_SIZE)
        {
            return Err(WalletError::TransactionSizeTooBig);
        }
        for message in messages {
            self.currency
                .parse_account_address_string(&message.address)
                .map_err(|_| WalletError::BadAddress)?;
        }
        Ok(())
    }

    /// Pick unlocked key outputs not already spent by an unconfirmed send
    /// until `needed` is covered. Outputs above the dust threshold are taken
    /// in random order; with `add_dust` one dust output goes first.
    fn select_transfers_to_send(
        &self,
        cache: &WalletUserTransactionsCache,
        needed: u64,
        add_dust: bool,
    ) -> (u64, Vec<TransactionOutputInformation>) {
        let threshold = self.currency.default_dust_threshold;
        let (mut unused, mut dust): (Vec<_>, Vec<_>) = self
            .container
            .outputs(OutputFilter::KEY_UNLOCKED)
            .into_iter()
            .filter(|o| !cache.is_used(&o.id()))
            .partition(|o| o.amount > threshold);

        let mut rng = rand::rng();
        let mut select_one_dust = add_dust && !dust.is_empty();
        let mut found = 0u64;
        let mut selected = Vec::new();
        while found < needed && (!unused.is_empty() || !dust.is_empty()) {
            let pool = if select_one_dust || unused.is_empty() {
                select_one_dust = false;
                &mut dust
            } else {
                &mut unused
            };
            let output = pool.swap_remove(rng.random_range(0..pool.len()));
            found = found.saturating_add(output.amount);
            selected.push(output);
        }
        (found, selected)
    }
}

/// The real output does not count towards its own ring.
fn check_if_enough_mixins(
    outs: &[RandomOutputsForAmount],
    selected: &[TransactionOutputInformation],
    mix_in: u64,
) -> bool {
    outs.len() >= selected.len()
        && outs.iter().zip(selected).all(|(decoys, real)| {
            let usable = decoys
                .outs
                .iter()
                .filter(|o| o.global_amount_index != real.global_output_index)
                .count();
            usable as u64 >= mix_in
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountBase;
    use crate::constants::COIN;
    use crate::crypto::signature::check_ring_signature;
    use crate::crypto::KeyPair;
    use crate::transaction::{TransactionInput, TransactionOutputTarget};
    use crate::wallet::node::RandomOutputEntry;
    use crate::wallet::outputs::{OutputLedger, OutputState, OutputType, TransactionInformation};
    use crate::wallet::types::TransactionState;

    const FEE: u64 = COIN / 100;

    struct Fixture {
        ledger: Arc<OutputLedger>,
        sender: WalletTransactionSender,
        cache: WalletUserTransactionsCache,
        currency: Currency,
    }

    fn fixture(amounts: &[u64]) -> Fixture {
        fixture_with(amounts, false)
    }

    fn fixture_with(amounts: &[u64], dust_to_fee: bool) -> Fixture {
        let account = AccountBase::generate();
        let ledger = Arc::new(OutputLedger::new());
        for (i, amount) in amounts.iter().enumerate() {
            ledger.add_output(owned_output(&account, *amount, 100 + i as u32));
        }
        let currency = Currency::default();
        let sender = WalletTransactionSender::new(
            currency.clone(),
            account.keys().clone(),
            ledger.clone(),
            dust_to_fee,
        );
        Fixture {
            ledger,
            sender,
            cache: WalletUserTransactionsCache::new(),
            currency,
        }
    }

    fn owned_output(account: &AccountBase, amount: u64, global_index: u32) -> TransactionOutputInformation {
        let tx_key = KeyPair::generate();
        TransactionOutputInformation {
            output_type: OutputType::Key,
            amount,
            global_output_index: global_index,
            output_in_transaction: 0,
            transaction_hash: crate::cn_fast_hash(tx_key.public.as_bytes()),
            transaction_public_key: tx_key.public,
            output_key: account.keys().derive_output_key(&tx_key.public, 0).unwrap(),
            required_signatures: 0,
            term: 0,
            state: OutputState::Unlocked,
        }
    }

    fn decoys(amount: u64, count: usize) -> RandomOutputsForAmount {
        RandomOutputsForAmount {
            amount,
            outs: (0..count)
                .map(|i| RandomOutputEntry {
                    global_amount_index: 500 - 7 * i as u32,
                    out_key: KeyPair::generate().public,
                })
                .collect(),
        }
    }

    fn transfer_to(f: &Fixture, account: &AccountBase, amount: u64) -> WalletTransfer {
        WalletTransfer {
            address: f.currency.account_address_as_string(account.address()),
            amount: amount as i64,
        }
    }

    fn expect_relay(continuation: Continuation) -> (Box<SendTransactionContext>, Transaction) {
        match continuation {
            (Some(WalletRequest::Relay { context, transaction }), events) => {
                assert!(events.is_empty());
                (context, transaction)
            }
            other => panic!("expected relay request, got {:?}", other),
        }
    }

    #[test]
    fn transfer_with_mixin_splits_change_by_digit() {
        let mut f = fixture(&[10 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, 3 * COIN)];

        let (id, (request, events)) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 3, 0, &[], 0, 1_000)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(f.cache.get_transaction(id).unwrap().total_amount, -(3 * COIN as i64 + FEE as i64));
        let Some(WalletRequest::GetRandomOutputs { context, amounts, outs_count }) = request else {
            panic!("expected random outputs request");
        };
        assert_eq!(amounts, vec![10 * COIN]);
        assert_eq!(outs_count, 4);

        let outcome = RequestOutcome::RandomOutputs {
            context,
            result: Ok(vec![decoys(10 * COIN, 4)]),
        };
        let (context, tx) = expect_relay(f.sender.on_request_completed(&mut f.cache, outcome, 1_001));

        let mut change: Vec<u64> = tx
            .prefix
            .outputs
            .iter()
            .map(|o| o.amount)
            .filter(|a| *a != 3 * COIN)
            .collect();
        change.sort_unstable();
        assert_eq!(change, vec![9_000_000, 90_000_000, 600_000_000]);
        assert_eq!(tx.output_amount(), Some(10 * COIN - FEE));

        let TransactionInput::Key(input) = &tx.prefix.inputs[0] else {
            panic!("expected key input");
        };
        assert_eq!(input.output_indexes.len(), 4);
        assert!(f.cache.is_used(&context.selected_transfers[0].id()));

        let outcome = RequestOutcome::Relayed {
            context,
            result: Ok(()),
        };
        let (next, events) = f.sender.on_request_completed(&mut f.cache, outcome, 1_002);
        assert!(next.is_none());
        assert_eq!(
            events,
            vec![WalletEvent::SendTransactionCompleted {
                transaction_id: id,
                result: Ok(())
            }]
        );
        assert_eq!(f.cache.get_transaction(id).unwrap().state, TransactionState::Active);
    }

    #[test]
    fn ring_members_are_sorted_and_signature_verifies() {
        let mut f = fixture(&[5 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, COIN)];
        let (_, (request, _)) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 3, 0, &[], 0, 0)
            .unwrap();
        let Some(WalletRequest::GetRandomOutputs { context, .. }) = request else {
            panic!("expected random outputs request");
        };
        let real = context.selected_transfers[0].clone();
        let mut outs = decoys(5 * COIN, 3);
        // The node may return the real output among the decoys.
        outs.outs.push(RandomOutputEntry {
            global_amount_index: real.global_output_index,
            out_key: real.output_key,
        });
        let outcome = RequestOutcome::RandomOutputs {
            context,
            result: Ok(vec![outs.clone()]),
        };
        let (_, tx) = expect_relay(f.sender.on_request_completed(&mut f.cache, outcome, 0));

        let TransactionInput::Key(input) = &tx.prefix.inputs[0] else {
            panic!("expected key input");
        };
        let absolute = crate::transaction::relative_to_absolute_offsets(&input.output_indexes);
        assert_eq!(absolute, vec![real.global_output_index, 486, 493, 500]);
        let ring: Vec<PublicKey> = absolute
            .iter()
            .map(|index| {
                outs.outs
                    .iter()
                    .find(|o| o.global_amount_index == *index)
                    .map(|o| o.out_key)
                    .unwrap()
            })
            .collect();
        assert!(check_ring_signature(&tx.prefix_hash(), &input.key_image, &ring, &tx.signatures[0]));
    }

    #[test]
    fn send_validation_errors() {
        let mut f = fixture(&[COIN]);
        let recipient = AccountBase::generate();
        let good = vec![transfer_to(&f, &recipient, COIN / 2)];
        let too_much = vec![transfer_to(&f, &recipient, COIN)];
        let mut send = |transfers: &[WalletTransfer], fee: u64, mixin: u64, ttl: u64| {
            f.sender
                .make_send_request(&mut f.cache, transfers, fee, &[], mixin, 0, &[], ttl, 0)
                .map(|_| ())
        };

        assert_eq!(send(&[], FEE, 3, 0), Err(WalletError::ZeroDestination));
        let zero = vec![WalletTransfer { amount: 0, ..good[0].clone() }];
        assert_eq!(send(&zero, FEE, 3, 0), Err(WalletError::ZeroDestination));
        let bad = vec![WalletTransfer {
            address: "not-an-address".into(),
            amount: 5,
        }];
        assert_eq!(send(&bad, FEE, 3, 0), Err(WalletError::BadAddress));
        assert_eq!(send(&good, FEE, 1, 0), Err(WalletError::WrongMixin));
        assert_eq!(send(&good, FEE, 13, 0), Err(WalletError::WrongMixin));
        assert_eq!(send(&good, FEE, 3, 60), Err(WalletError::WrongAmount));
        assert_eq!(send(&good, FEE - 1, 3, 0), Err(WalletError::FeeTooSmall));
        let overflow = vec![
            WalletTransfer { amount: i64::MAX, ..good[0].clone() },
            WalletTransfer { amount: i64::MAX, ..good[0].clone() },
            WalletTransfer { amount: i64::MAX, ..good[0].clone() },
        ];
        assert_eq!(send(&overflow, FEE, 3, 0), Err(WalletError::SumOverflow));
        assert_eq!(send(&too_much, FEE, 3, 0), Err(WalletError::InsufficientFunds));
        assert_eq!(f.cache.get_transaction_count(), 0);
    }

    #[test]
    fn too_few_decoys_fail_with_mixin_too_low() {
        let mut f = fixture(&[2 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, COIN)];
        let (id, (request, _)) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 3, 0, &[], 0, 0)
            .unwrap();
        let Some(WalletRequest::GetRandomOutputs { context, .. }) = request else {
            panic!("expected random outputs request");
        };
        let outcome = RequestOutcome::RandomOutputs {
            context,
            result: Ok(vec![decoys(2 * COIN, 2)]),
        };
        let (next, events) = f.sender.on_request_completed(&mut f.cache, outcome, 0);
        assert!(next.is_none());
        assert_eq!(
            events,
            vec![WalletEvent::SendTransactionCompleted {
                transaction_id: id,
                result: Err(WalletError::MixinTooLow)
            }]
        );
        assert_eq!(f.cache.get_transaction(id).unwrap().state, TransactionState::Failed);
        assert_eq!(f.cache.unconfirmed().unconfirmed_outs_amount(), 0);
    }

    #[test]
    fn real_output_among_decoys_is_not_counted() {
        let mut f = fixture(&[2 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, COIN)];
        let (id, (request, _)) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 3, 0, &[], 0, 0)
            .unwrap();
        let Some(WalletRequest::GetRandomOutputs { context, .. }) = request else {
            panic!("expected random outputs request");
        };
        let real = context.selected_transfers[0].clone();
        let mut outs = decoys(2 * COIN, 2);
        outs.outs.push(RandomOutputEntry {
            global_amount_index: real.global_output_index,
            out_key: real.output_key,
        });
        let outcome = RequestOutcome::RandomOutputs {
            context,
            result: Ok(vec![outs]),
        };
        let (next, events) = f.sender.on_request_completed(&mut f.cache, outcome, 0);
        assert!(next.is_none());
        assert_eq!(
            events,
            vec![WalletEvent::SendTransactionCompleted {
                transaction_id: id,
                result: Err(WalletError::MixinTooLow)
            }]
        );
    }

    #[test]
    fn stop_cancels_the_chain() {
        let mut f = fixture(&[2 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, COIN)];
        let (id, (request, _)) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 3, 0, &[], 0, 0)
            .unwrap();
        let Some(WalletRequest::GetRandomOutputs { context, .. }) = request else {
            panic!("expected random outputs request");
        };
        f.sender.stop();
        let outcome = RequestOutcome::RandomOutputs {
            context,
            result: Ok(vec![decoys(2 * COIN, 4)]),
        };
        let (next, events) = f.sender.on_request_completed(&mut f.cache, outcome, 0);
        assert!(next.is_none());
        assert!(events.contains(&WalletEvent::SendTransactionCompleted {
            transaction_id: id,
            result: Err(WalletError::OperationCancelled)
        }));
        assert_eq!(f.cache.get_transaction(id).unwrap().state, TransactionState::Cancelled);

        f.sender.init();
        assert!(!f.sender.is_stopping());
    }

    #[test]
    fn relay_failure_releases_outputs() {
        let mut f = fixture(&[2 * COIN]);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, COIN)];
        let (id, continuation) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE, &[], 0, 0, &[], 0, 0)
            .unwrap();
        let (context, _) = expect_relay(continuation);
        let output = context.selected_transfers[0].id();
        assert!(f.cache.is_used(&output));

        let outcome = RequestOutcome::Relayed {
            context,
            result: Err(NodeError("rejected".into())),
        };
        let (_, events) = f.sender.on_request_completed(&mut f.cache, outcome, 0);
        assert_eq!(
            events,
            vec![WalletEvent::SendTransactionCompleted {
                transaction_id: id,
                result: Err(WalletError::Node("rejected".into()))
            }]
        );
        assert!(!f.cache.is_used(&output));
    }

    #[test]
    fn change_dust_is_recorded_as_fee() {
        let mut f = fixture_with(&[10 * COIN], true);
        let recipient = AccountBase::generate();
        let transfers = vec![transfer_to(&f, &recipient, 3 * COIN)];
        let (id, continuation) = f
            .sender
            .make_send_request(&mut f.cache, &transfers, FEE + 500, &[], 0, 0, &[], 0, 0)
            .unwrap();
        let (_, tx) = expect_relay(continuation);

        // 6.98999500 of change leaves 0.00999500 of dust.
        assert_eq!(tx.output_amount(), Some(10 * COIN - 2 * FEE));
        let record = f.cache.get_transaction(id).unwrap();
        assert_eq!(record.fee, 2 * FEE);
        assert_eq!(record.total_amount, -(3 * COIN as i64 + 2 * FEE as i64));
        assert_eq!(
            f.cache.unconfirmed().unconfirmed_transactions_amount(),
            3 * COIN + 2 * FEE
        );
    }

    #[test]
    fn dust_goes_first_without_mixin() {
        let f = fixture(&[5 * COIN, 500]);
        let (found, selected) = f.sender.select_transfers_to_send(&f.cache, 5 * COIN, true);
        assert_eq!(found, 5 * COIN + 500);
        assert_eq!(selected[0].amount, 500);

        let (found, selected) = f.sender.select_transfers_to_send(&f.cache, COIN, false);
        assert_eq!(found, 5 * COIN);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn deposit_and_withdrawal() {
        let currency = Currency::default();
        let amount = currency.deposit_min_amount;
        let term = currency.deposit_min_term;
        let mut f = fixture(&[amount + COIN]);

        let (deposit_id, continuation) = f
            .sender
            .make_deposit_request(&mut f.cache, term, amount, FEE, 0, 0)
            .unwrap();
        let (_, deposit_tx) = expect_relay(continuation);
        let interest = currency.calculate_interest(amount, term);
        assert_eq!(f.cache.unconfirmed().created_deposits_sum(), amount + interest);
        let deposit_index = deposit_tx
            .prefix
            .outputs
            .iter()
            .position(|o| matches!(o.target, TransactionOutputTarget::Multisignature { .. }))
            .unwrap();
        let TransactionOutputTarget::Multisignature { keys, .. } =
            &deposit_tx.prefix.outputs[deposit_index].target
        else {
            unreachable!();
        };

        // The chain confirms the deposit output.
        let deposit_output = TransactionOutputInformation {
            output_type: OutputType::Multisignature,
            amount,
            global_output_index: 3,
            output_in_transaction: deposit_index as u32,
            transaction_hash: deposit_tx.hash(),
            transaction_public_key: deposit_tx.public_key().unwrap(),
            output_key: keys[0],
            required_signatures: 1,
            term,
            state: OutputState::Locked,
        };
        f.ledger.add_output(deposit_output.clone());
        f.cache.on_transaction_updated(
            &TransactionInformation {
                transaction_hash: deposit_tx.hash(),
                public_key: deposit_tx.public_key().unwrap(),
                block_height: 10,
                timestamp: 0,
                unlock_time: 0,
                total_amount_in: amount + COIN,
                total_amount_out: amount + COIN - FEE,
                extra: deposit_tx.prefix.extra.clone(),
                payment_id: None,
                messages: Vec::new(),
            },
            -((amount + FEE) as i64),
            &[deposit_output.clone()],
            &[],
            &currency,
        );
        assert_eq!(f.cache.get_transaction(deposit_id).unwrap().deposit_count, 1);
        assert_eq!(f.cache.unconfirmed().created_deposits_sum(), 0);

        assert_eq!(
            f.sender
                .make_withdraw_deposit_request(&mut f.cache, &[0], FEE, 0)
                .map(|_| ()),
            Err(WalletError::DepositLocked)
        );
        assert_eq!(
            f.sender
                .make_withdraw_deposit_request(&mut f.cache, &[7], FEE, 0)
                .map(|_| ()),
            Err(WalletError::DepositDoesNotExist)
        );

        f.cache.unlock_deposits(&[deposit_output]);
        assert_eq!(
            f.sender
                .make_withdraw_deposit_request(&mut f.cache, &[0, 0], FEE, 0)
                .map(|_| ()),
            Err(WalletError::WrongAmount)
        );
        assert_eq!(f.cache.get_transaction_count(), 1);
        assert_eq!(f.cache.unconfirmed().spent_deposits_profit(), 0);

        let (withdraw_id, continuation) = f
            .sender
            .make_withdraw_deposit_request(&mut f.cache, &[0], FEE, 0)
            .unwrap();
        let (_, withdraw_tx) = expect_relay(continuation);
        assert_eq!(withdraw_tx.output_amount(), Some(amount + interest - FEE));
        assert_eq!(currency.calculate_total_transaction_interest(&withdraw_tx), interest);
        assert_eq!(
            f.cache.get_transaction(withdraw_id).unwrap().total_amount,
            (amount + interest - FEE) as i64
        );
        assert_eq!(f.cache.get_deposit(0).unwrap().spending_transaction_id, Some(withdraw_id));
        assert_eq!(f.cache.unconfirmed().spent_deposits_profit(), amount + interest - FEE);

        assert_eq!(
            f.sender
                .make_withdraw_deposit_request(&mut f.cache, &[0], FEE, 0)
                .map(|_| ()),
            Err(WalletError::DepositAlreadySpent)
        );
    }
}
