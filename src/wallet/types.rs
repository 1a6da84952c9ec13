//! Records kept by the transaction cache.

use serde::{Deserialize, Serialize};

use crate::constants::UNCONFIRMED_TRANSACTION_HEIGHT;
use crate::crypto::SecretKey;
use crate::Hash;

pub type TransactionId = usize;
pub type TransferId = usize;
pub type DepositId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Relayed or confirmed.
    Active,
    /// Stopped by the user or by shutdown before relay.
    Cancelled,
    /// Dropped from the chain or mempool; kept as a tombstone.
    Deleted,
    Failed,
    /// Being built or relayed.
    Sending,
}

/// One leg of a transaction's destination list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransfer {
    pub address: String,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub message: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub first_transfer_id: Option<TransferId>,
    pub transfer_count: usize,
    pub first_deposit_id: Option<DepositId>,
    pub deposit_count: usize,
    /// Net effect on the wallet: negative for outgoing.
    pub total_amount: i64,
    pub fee: u64,
    pub sent_time: u64,
    pub unlock_time: u64,
    pub hash: Hash,
    pub secret_key: Option<SecretKey>,
    pub is_coinbase: bool,
    /// [`UNCONFIRMED_TRANSACTION_HEIGHT`] until mined.
    pub block_height: u32,
    pub timestamp: u64,
    pub extra: Vec<u8>,
    pub state: TransactionState,
    pub messages: Vec<String>,
}

impl WalletTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.block_height != UNCONFIRMED_TRANSACTION_HEIGHT
    }

    pub fn transfer_ids(&self) -> std::ops::Range<TransferId> {
        match self.first_transfer_id {
            Some(first) => first..first + self.transfer_count,
            None => 0..0,
        }
    }

    pub fn deposit_ids(&self) -> std::ops::Range<DepositId> {
        match self.first_deposit_id {
            Some(first) => first..first + self.deposit_count,
            None => 0..0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub creating_transaction_id: TransactionId,
    pub spending_transaction_id: Option<TransactionId>,
    /// Lock period in blocks.
    pub term: u32,
    pub amount: u64,
    pub interest: u64,
    pub locked: bool,
}

/// Transactions carrying one payment id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payments {
    pub payment_id: Hash,
    pub transactions: Vec<WalletTransaction>,
}
