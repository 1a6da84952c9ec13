//! Wallet engine.
//!
//! - [`cache`] keeps wallet-visible transactions, transfers and deposits
//! - [`sender`] turns send, deposit and withdraw requests into relayed
//!   transactions
//! - [`proofs`] produces and checks payment, reserve and message proofs
//! - [`legacy`] ties them together behind [`WalletLegacy`]

pub mod cache;
pub mod error;
pub mod events;
pub mod legacy;
pub mod node;
pub mod outputs;
pub mod proofs;
pub mod request;
pub mod sender;
pub mod serializer;
pub mod types;
pub mod unconfirmed;

pub use cache::WalletUserTransactionsCache;
pub use error::WalletError;
pub use events::{WalletEvent, WalletObserver};
pub use legacy::{Clock, WalletLegacy, WalletState};
pub use node::{Node, NodeError, RandomOutputEntry, RandomOutputsForAmount, Synchronizer};
pub use outputs::{
    OutputFilter, OutputLedger, OutputState, OutputType, TransactionInformation,
    TransactionOutputInformation, TransfersContainer,
};
pub use types::{
    Deposit, DepositId, Payments, TransactionId, TransactionMessage, TransactionState,
    TransferId, WalletTransaction, WalletTransfer,
};
