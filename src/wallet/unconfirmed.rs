//! Transactions sent by this wallet that the synchronizer has not seen yet.
//!
//! Their effect on balances is tracked here until the chain confirms them
//! or they outlive the mempool.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::wallet::types::TransactionId;
use crate::Hash;

/// `(transaction hash, index in transaction)` of an owned output.
pub type OutputId = (Hash, u32);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfirmedTransferDetails {
    /// Money leaving the wallet: destinations plus fee.
    pub amount: u64,
    /// Sum of the outputs selected to pay for it.
    pub outs_amount: u64,
    pub sent_time: u64,
    pub transaction_id: TransactionId,
    pub used_outputs: Vec<OutputId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfirmedSpentDepositDetails {
    pub transaction_id: TransactionId,
    /// Principal plus interest of the withdrawn deposits.
    pub deposits_sum: u64,
    pub fee: u64,
    pub sent_time: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UnconfirmedTransactions {
    transactions: HashMap<Hash, UnconfirmedTransferDetails>,
    #[serde(skip)]
    used_outputs: HashSet<OutputId>,
    created_deposits: HashMap<TransactionId, u64>,
    spent_deposits: HashMap<Hash, UnconfirmedSpentDepositDetails>,
}

impl UnconfirmedTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        hash: Hash,
        transaction_id: TransactionId,
        amount: u64,
        used_outputs: Vec<OutputId>,
        outs_amount: u64,
        sent_time: u64,
    ) {
        self.used_outputs.extend(used_outputs.iter().copied());
        self.transactions.insert(
            hash,
            UnconfirmedTransferDetails {
                amount,
                outs_amount,
                sent_time,
                transaction_id,
                used_outputs,
            },
        );
    }

    pub fn find_transaction_id(&self, hash: &Hash) -> Option<TransactionId> {
        self.transactions
            .get(hash)
            .map(|d| d.transaction_id)
            .or_else(|| self.spent_deposits.get(hash).map(|d| d.transaction_id))
    }

    /// Drop the entry for `hash` from both the transfer and the
    /// deposit-spending sets. Returns whether anything was removed.
    pub fn erase(&mut self, hash: &Hash) -> bool {
        let transfer = self.erase_transfer(hash);
        let spending = self.spent_deposits.remove(hash).is_some();
        transfer || spending
    }

    fn erase_transfer(&mut self, hash: &Hash) -> bool {
        match self.transactions.remove(hash) {
            Some(details) => {
                for output in &details.used_outputs {
                    self.used_outputs.remove(output);
                }
                true
            }
            None => false,
        }
    }

    pub fn is_used(&self, output: &OutputId) -> bool {
        self.used_outputs.contains(output)
    }

    // ── Deposits ──

    /// A deposit being created by `transaction_id`; `total` is principal
    /// plus expected interest.
    pub fn add_created_deposit(&mut self, transaction_id: TransactionId, total: u64) {
        self.created_deposits.insert(transaction_id, total);
    }

    pub fn erase_created_deposit(&mut self, transaction_id: TransactionId) -> bool {
        self.created_deposits.remove(&transaction_id).is_some()
    }

    pub fn add_deposit_spending_transaction(
        &mut self,
        hash: Hash,
        transaction_id: TransactionId,
        deposits_sum: u64,
        fee: u64,
        sent_time: u64,
    ) {
        self.spent_deposits.insert(
            hash,
            UnconfirmedSpentDepositDetails {
                transaction_id,
                deposits_sum,
                fee,
                sent_time,
            },
        );
    }

    // ── Sums ──

    pub fn unconfirmed_outs_amount(&self) -> u64 {
        self.transactions.values().map(|d| d.outs_amount).sum()
    }

    pub fn unconfirmed_transactions_amount(&self) -> u64 {
        self.transactions.values().map(|d| d.amount).sum()
    }

    pub fn created_deposits_sum(&self) -> u64 {
        self.created_deposits.values().sum()
    }

    /// What withdrawals in flight will add to the spendable balance.
    pub fn spent_deposits_profit(&self) -> u64 {
        self.spent_deposits
            .values()
            .map(|d| d.deposits_sum.saturating_sub(d.fee))
            .sum()
    }

    pub fn spent_deposits_total(&self) -> u64 {
        self.spent_deposits.values().map(|d| d.deposits_sum).sum()
    }

    // ── Maintenance ──

    /// Remove entries sent at least `live_time` seconds before `now`.
    /// Returns the ids of the transactions they belonged to.
    pub fn delete_outdated(&mut self, now: u64, live_time: u64) -> Vec<TransactionId> {
        let outdated = |sent_time: u64| now.saturating_sub(sent_time) >= live_time;

        let stale_transfers: Vec<Hash> = self
            .transactions
            .iter()
            .filter(|(_, d)| outdated(d.sent_time))
            .map(|(hash, _)| *hash)
            .collect();
        let mut deleted = Vec::with_capacity(stale_transfers.len());
        for hash in stale_transfers {
            if let Some(details) = self.transactions.get(&hash) {
                let id = details.transaction_id;
                self.created_deposits.remove(&id);
                deleted.push(id);
            }
            self.erase_transfer(&hash);
        }

        let stale_spendings: Vec<Hash> = self
            .spent_deposits
            .iter()
            .filter(|(_, d)| outdated(d.sent_time))
            .map(|(hash, _)| *hash)
            .collect();
        for hash in stale_spendings {
            if let Some(details) = self.spent_deposits.remove(&hash) {
                deleted.push(details.transaction_id);
            }
        }

        deleted.sort_unstable();
        deleted.dedup();
        deleted
    }

    /// Recompute the used-output index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.used_outputs = self
            .transactions
            .values()
            .flat_map(|d| d.used_outputs.iter().copied())
            .collect();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(n: u8) -> OutputId {
        ([n; 32], 0)
    }

    #[test]
    fn sums_and_used_outputs() {
        let mut u = UnconfirmedTransactions::new();
        u.add([1; 32], 0, 301, vec![out(1), out(2)], 1000, 100);
        u.add([2; 32], 1, 50, vec![out(3)], 60, 100);

        assert_eq!(u.unconfirmed_outs_amount(), 1060);
        assert_eq!(u.unconfirmed_transactions_amount(), 351);
        assert!(u.is_used(&out(2)));
        assert_eq!(u.find_transaction_id(&[2; 32]), Some(1));

        assert!(u.erase(&[1; 32]));
        assert!(!u.is_used(&out(2)));
        assert!(!u.erase(&[1; 32]));
        assert_eq!(u.unconfirmed_outs_amount(), 60);
    }

    #[test]
    fn deposit_sums() {
        let mut u = UnconfirmedTransactions::new();
        u.add_created_deposit(3, 5_100);
        u.add_deposit_spending_transaction([7; 32], 4, 2_000, 100, 10);

        assert_eq!(u.created_deposits_sum(), 5_100);
        assert_eq!(u.spent_deposits_profit(), 1_900);
        assert_eq!(u.spent_deposits_total(), 2_000);
        assert_eq!(u.find_transaction_id(&[7; 32]), Some(4));

        assert!(u.erase(&[7; 32]));
        assert_eq!(u.spent_deposits_total(), 0);
        assert!(u.erase_created_deposit(3));
        assert!(!u.erase_created_deposit(3));
    }

    #[test]
    fn outdated_entries_are_swept() {
        let mut u = UnconfirmedTransactions::new();
        u.add([1; 32], 0, 10, vec![out(1)], 20, 100);
        u.add([2; 32], 1, 10, vec![out(2)], 20, 500);
        u.add_created_deposit(0, 99);
        u.add_deposit_spending_transaction([3; 32], 2, 40, 1, 100);

        let deleted = u.delete_outdated(600, 400);
        assert_eq!(deleted, vec![0, 2]);
        assert!(!u.is_used(&out(1)));
        assert!(u.is_used(&out(2)));
        assert_eq!(u.created_deposits_sum(), 0);
        assert_eq!(u.spent_deposits_total(), 0);
    }

    #[test]
    fn index_is_rebuilt_after_decode() {
        let mut u = UnconfirmedTransactions::new();
        u.add([1; 32], 0, 10, vec![out(5)], 20, 100);
        let bytes = crate::serialize(&u).unwrap();
        let mut decoded: UnconfirmedTransactions = crate::deserialize(&bytes).unwrap();
        assert!(!decoded.is_used(&out(5)));
        decoded.rebuild_index();
        assert!(decoded.is_used(&out(5)));
    }
}
