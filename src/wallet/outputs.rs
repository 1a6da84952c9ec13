//! The view of owned outputs supplied by chain synchronization.
//!
//! [`TransfersContainer`] is what the wallet reads; [`OutputLedger`] is an
//! in-memory implementation that a synchronizer (or a test) fills in.

use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::Hash;

// ── Filters ──

/// Bit set selecting outputs by state (low byte) and type (high byte).
/// An output matches when both its state bit and its type bit are set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputFilter(pub u32);

impl OutputFilter {
    pub const STATE_UNLOCKED: OutputFilter = OutputFilter(0x01);
    pub const STATE_LOCKED: OutputFilter = OutputFilter(0x02);
    pub const STATE_SOFT_LOCKED: OutputFilter = OutputFilter(0x04);
    pub const STATE_SPENT: OutputFilter = OutputFilter(0x08);
    pub const STATE_ALL: OutputFilter = OutputFilter(0xff);

    pub const TYPE_KEY: OutputFilter = OutputFilter(0x100);
    pub const TYPE_MULTISIGNATURE: OutputFilter = OutputFilter(0x200);
    pub const TYPE_DEPOSIT: OutputFilter = OutputFilter(0x400);
    pub const TYPE_ALL: OutputFilter = OutputFilter(0xff00);

    pub const KEY_UNLOCKED: OutputFilter = OutputFilter(0x100 | 0x01);
    pub const KEY_NOT_UNLOCKED: OutputFilter = OutputFilter(0x100 | 0x02 | 0x04);
    pub const ALL_LOCKED: OutputFilter = OutputFilter(0xff00 | 0x02 | 0x04);
    pub const ALL_UNLOCKED: OutputFilter = OutputFilter(0xff00 | 0x01);
    pub const ALL: OutputFilter = OutputFilter(0xff00 | 0xff);

    pub fn contains(self, other: OutputFilter) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn matches(self, output: &TransactionOutputInformation) -> bool {
        let state = output.state.filter_bit();
        let kind = output.filter_type_bit();
        self.0 & state.0 != 0 && self.0 & kind.0 != 0
    }
}

impl BitOr for OutputFilter {
    type Output = OutputFilter;

    fn bitor(self, rhs: OutputFilter) -> OutputFilter {
        OutputFilter(self.0 | rhs.0)
    }
}

// ── Records ──

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    Key,
    Multisignature,
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputState {
    Unlocked,
    Locked,
    SoftLocked,
    Spent,
}

impl OutputState {
    fn filter_bit(self) -> OutputFilter {
        match self {
            OutputState::Unlocked => OutputFilter::STATE_UNLOCKED,
            OutputState::Locked => OutputFilter::STATE_LOCKED,
            OutputState::SoftLocked => OutputFilter::STATE_SOFT_LOCKED,
            OutputState::Spent => OutputFilter::STATE_SPENT,
        }
    }
}

/// An owned output as seen by the synchronizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutputInformation {
    pub output_type: OutputType,
    pub amount: u64,
    pub global_output_index: u32,
    pub output_in_transaction: u32,
    pub transaction_hash: Hash,
    pub transaction_public_key: PublicKey,
    /// One-time key of a key output, or the single key of a deposit.
    pub output_key: PublicKey,
    pub required_signatures: u8,
    /// Deposit term in blocks; zero for anything that is not a deposit.
    pub term: u32,
    pub state: OutputState,
}

impl TransactionOutputInformation {
    pub fn is_deposit(&self) -> bool {
        self.output_type == OutputType::Multisignature && self.term > 0
    }

    /// `(transaction hash, index in transaction)` identifying this output.
    pub fn id(&self) -> (Hash, u32) {
        (self.transaction_hash, self.output_in_transaction)
    }

    fn filter_type_bit(&self) -> OutputFilter {
        match self.output_type {
            OutputType::Key => OutputFilter::TYPE_KEY,
            OutputType::Multisignature if self.term > 0 => OutputFilter::TYPE_DEPOSIT,
            OutputType::Multisignature => OutputFilter::TYPE_MULTISIGNATURE,
            OutputType::Invalid => OutputFilter(0),
        }
    }
}

/// A transaction touching the wallet, as seen by the synchronizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInformation {
    pub transaction_hash: Hash,
    pub public_key: PublicKey,
    /// [`crate::constants::UNCONFIRMED_TRANSACTION_HEIGHT`] while in the pool.
    pub block_height: u32,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub total_amount_in: u64,
    pub total_amount_out: u64,
    pub extra: Vec<u8>,
    pub payment_id: Option<Hash>,
    pub messages: Vec<String>,
}

/// Read access to the outputs owned by one subscription.
pub trait TransfersContainer: Send + Sync {
    fn outputs(&self, filter: OutputFilter) -> Vec<TransactionOutputInformation>;

    fn balance(&self, filter: OutputFilter) -> u64 {
        self.outputs(filter).iter().map(|o| o.amount).sum()
    }

    /// Transaction info with the amounts it moved out of and into the wallet.
    fn transaction_information(&self, hash: &Hash) -> Option<(TransactionInformation, u64, u64)>;

    /// Owned outputs created by `hash`.
    fn transaction_outputs(&self, hash: &Hash, filter: OutputFilter)
        -> Vec<TransactionOutputInformation>;

    /// Owned outputs spent by `hash`.
    fn transaction_inputs(&self, hash: &Hash, filter: OutputFilter)
        -> Vec<TransactionOutputInformation>;
}

// ── In-memory ledger ──

#[derive(Clone, Debug)]
struct LedgerOutput {
    info: TransactionOutputInformation,
    spent_by: Option<Hash>,
}

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<Hash, TransactionInformation>,
    outputs: Vec<LedgerOutput>,
}

/// A [`TransfersContainer`] kept entirely in memory.
#[derive(Default)]
pub struct OutputLedger {
    state: RwLock<LedgerState>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_transaction(&self, info: TransactionInformation) {
        self.write().transactions.insert(info.transaction_hash, info);
    }

    /// Record an owned output. Replaces an earlier record with the same id.
    pub fn add_output(&self, info: TransactionOutputInformation) {
        let mut state = self.write();
        let id = info.id();
        state.outputs.retain(|o| o.info.id() != id);
        state.outputs.push(LedgerOutput {
            info,
            spent_by: None,
        });
    }

    /// Change the state of an output. Returns the updated record.
    pub fn set_output_state(
        &self,
        transaction_hash: &Hash,
        output_in_transaction: u32,
        new_state: OutputState,
    ) -> Option<TransactionOutputInformation> {
        let mut state = self.write();
        let output = state
            .outputs
            .iter_mut()
            .find(|o| o.info.id() == (*transaction_hash, output_in_transaction))?;
        output.info.state = new_state;
        Some(output.info.clone())
    }

    /// Mark an output spent by `spending_transaction`.
    pub fn mark_spent(
        &self,
        transaction_hash: &Hash,
        output_in_transaction: u32,
        spending_transaction: Hash,
    ) -> Option<TransactionOutputInformation> {
        let mut state = self.write();
        let output = state
            .outputs
            .iter_mut()
            .find(|o| o.info.id() == (*transaction_hash, output_in_transaction))?;
        output.info.state = OutputState::Spent;
        output.spent_by = Some(spending_transaction);
        Some(output.info.clone())
    }

    /// Forget a transaction: drop its outputs and unspend what it spent.
    pub fn remove_transaction(&self, hash: &Hash) -> bool {
        let mut state = self.write();
        let existed = state.transactions.remove(hash).is_some();
        state.outputs.retain(|o| o.info.transaction_hash != *hash);
        for output in state.outputs.iter_mut() {
            if output.spent_by == Some(*hash) {
                output.spent_by = None;
                output.info.state = OutputState::Unlocked;
            }
        }
        existed
    }

    pub fn transaction_count(&self) -> usize {
        self.read().transactions.len()
    }
}

impl TransfersContainer for OutputLedger {
    fn outputs(&self, filter: OutputFilter) -> Vec<TransactionOutputInformation> {
        self.read()
            .outputs
            .iter()
            .filter(|o| filter.matches(&o.info))
            .map(|o| o.info.clone())
            .collect()
    }

    fn transaction_information(&self, hash: &Hash) -> Option<(TransactionInformation, u64, u64)> {
        let state = self.read();
        let info = state.transactions.get(hash)?.clone();
        let amount_in = state
            .outputs
            .iter()
            .filter(|o| o.spent_by == Some(*hash))
            .map(|o| o.info.amount)
            .sum();
        let amount_out = state
            .outputs
            .iter()
            .filter(|o| o.info.transaction_hash == *hash)
            .map(|o| o.info.amount)
            .sum();
        Some((info, amount_in, amount_out))
    }

    fn transaction_outputs(
        &self,
        hash: &Hash,
        filter: OutputFilter,
    ) -> Vec<TransactionOutputInformation> {
        self.read()
            .outputs
            .iter()
            .filter(|o| o.info.transaction_hash == *hash && filter.matches(&o.info))
            .map(|o| o.info.clone())
            .collect()
    }

    fn transaction_inputs(
        &self,
        hash: &Hash,
        filter: OutputFilter,
    ) -> Vec<TransactionOutputInformation> {
        self.read()
            .outputs
            .iter()
            .filter(|o| o.spent_by == Some(*hash) && filter.matches(&o.info))
            .map(|o| o.info.clone())
            .collect()
    }
}
