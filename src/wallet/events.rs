//! Wallet events and observer fan-out.
//!
//! State changes produce [`WalletEvent`] values while the wallet lock is
//! held; they are dispatched to observers only after the lock is released,
//! so an observer may call back into the wallet.

use std::sync::{Arc, Mutex};

use crate::wallet::error::WalletError;
use crate::wallet::types::{DepositId, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    ActualBalanceUpdated(u64),
    PendingBalanceUpdated(u64),
    ActualDepositBalanceUpdated(u64),
    PendingDepositBalanceUpdated(u64),
    ExternalTransactionCreated(TransactionId),
    SendTransactionCompleted {
        transaction_id: TransactionId,
        result: Result<(), WalletError>,
    },
    TransactionUpdated(TransactionId),
    DepositsUpdated(Vec<DepositId>),
    SynchronizationProgressUpdated { current: u32, total: u32 },
    SynchronizationCompleted(Result<(), WalletError>),
}

/// Receives wallet notifications. Every method defaults to a no-op.
pub trait WalletObserver: Send + Sync {
    fn init_completed(&self, _result: Result<(), WalletError>) {}
    fn save_completed(&self, _result: Result<(), WalletError>) {}
    fn synchronization_progress_updated(&self, _current: u32, _total: u32) {}
    fn synchronization_completed(&self, _result: Result<(), WalletError>) {}
    fn actual_balance_updated(&self, _balance: u64) {}
    fn pending_balance_updated(&self, _balance: u64) {}
    fn actual_deposit_balance_updated(&self, _balance: u64) {}
    fn pending_deposit_balance_updated(&self, _balance: u64) {}
    fn external_transaction_created(&self, _transaction_id: TransactionId) {}
    fn send_transaction_completed(
        &self,
        _transaction_id: TransactionId,
        _result: Result<(), WalletError>,
    ) {
    }
    fn transaction_updated(&self, _transaction_id: TransactionId) {}
    fn deposits_updated(&self, _deposit_ids: &[DepositId]) {}
}

impl WalletEvent {
    pub fn notify(&self, observer: &dyn WalletObserver) {
        match self {
            WalletEvent::ActualBalanceUpdated(b) => observer.actual_balance_updated(*b),
            WalletEvent::PendingBalanceUpdated(b) => observer.pending_balance_updated(*b),
            WalletEvent::ActualDepositBalanceUpdated(b) => {
                observer.actual_deposit_balance_updated(*b)
            }
            WalletEvent::PendingDepositBalanceUpdated(b) => {
                observer.pending_deposit_balance_updated(*b)
            }
            WalletEvent::ExternalTransactionCreated(id) => observer.external_transaction_created(*id),
            WalletEvent::SendTransactionCompleted {
                transaction_id,
                result,
            } => observer.send_transaction_completed(*transaction_id, result.clone()),
            WalletEvent::TransactionUpdated(id) => observer.transaction_updated(*id),
            WalletEvent::DepositsUpdated(ids) => observer.deposits_updated(ids),
            WalletEvent::SynchronizationProgressUpdated { current, total } => {
                observer.synchronization_progress_updated(*current, *total)
            }
            WalletEvent::SynchronizationCompleted(result) => {
                observer.synchronization_completed(result.clone())
            }
        }
    }
}

/// Registered observers.
#[derive(Default)]
pub struct ObserverManager {
    observers: Mutex<Vec<Arc<dyn WalletObserver>>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn WalletObserver>) {
        self.lock().push(observer);
    }

    /// Remove by identity. Returns whether the observer was registered.
    pub fn remove(&self, observer: &Arc<dyn WalletObserver>) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    /// Call `f` on every observer. The list is copied first so observers
    /// may register or unregister from inside a callback.
    pub fn notify(&self, f: impl Fn(&dyn WalletObserver)) {
        let observers = self.lock().clone();
        for observer in observers {
            f(observer.as_ref());
        }
    }

    pub fn dispatch(&self, events: &[WalletEvent]) {
        if events.is_empty() {
            return;
        }
        let observers = self.lock().clone();
        for event in events {
            for observer in &observers {
                event.notify(observer.as_ref());
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn WalletObserver>>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
