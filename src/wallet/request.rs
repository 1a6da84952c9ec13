//! Request chain driving a send through the node.
//!
//! Each stage of a send is a [`WalletRequest`]: a node call plus the
//! context needed to continue. Performing it yields a [`RequestOutcome`]
//! which the sender turns into the next request (or none) and a batch of
//! events. No wallet lock is held while a request is performed.

use crate::transaction::Transaction;
use crate::wallet::events::WalletEvent;
use crate::wallet::node::{Node, NodeError, RandomOutputsForAmount};
use crate::wallet::outputs::TransactionOutputInformation;
use crate::wallet::types::{DepositId, TransactionId, TransactionMessage};

/// What is being sent.
#[derive(Clone, Debug)]
pub enum SendKind {
    Transfer {
        /// Parsed destinations with their amounts.
        destinations: Vec<(crate::account::AccountPublicAddress, u64)>,
    },
    Deposit {
        amount: u64,
        term: u32,
    },
    Withdraw {
        deposit_ids: Vec<DepositId>,
        /// Principal plus interest of every withdrawn deposit.
        deposits_sum: u64,
    },
}

/// State threaded through one send, owned by its request chain.
#[derive(Clone, Debug)]
pub struct SendTransactionContext {
    pub transaction_id: TransactionId,
    pub kind: SendKind,
    pub selected_transfers: Vec<TransactionOutputInformation>,
    pub outs: Vec<RandomOutputsForAmount>,
    pub found_money: u64,
    pub needed_money: u64,
    pub mix_in: u64,
    pub fee: u64,
    pub extra: Vec<u8>,
    pub unlock_time: u64,
    pub messages: Vec<TransactionMessage>,
    /// Absolute expiry time, zero for none.
    pub ttl: u64,
}

#[derive(Debug)]
pub enum WalletRequest {
    GetRandomOutputs {
        context: Box<SendTransactionContext>,
        amounts: Vec<u64>,
        outs_count: u16,
    },
    Relay {
        context: Box<SendTransactionContext>,
        transaction: Transaction,
    },
}

/// A performed request, ready to be fed back to the sender.
#[derive(Debug)]
pub enum RequestOutcome {
    RandomOutputs {
        context: Box<SendTransactionContext>,
        result: Result<Vec<RandomOutputsForAmount>, NodeError>,
    },
    Relayed {
        context: Box<SendTransactionContext>,
        result: Result<(), NodeError>,
    },
}

/// The next request to perform, if any, and the events raised so far.
pub type Continuation = (Option<WalletRequest>, Vec<WalletEvent>);

impl WalletRequest {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            WalletRequest::GetRandomOutputs { context, .. } | WalletRequest::Relay { context, .. } => {
                context.transaction_id
            }
        }
    }

    pub async fn perform(self, node: &dyn Node) -> RequestOutcome {
        match self {
            WalletRequest::GetRandomOutputs {
                context,
                amounts,
                outs_count,
            } => {
                tracing::debug!(
                    "requesting {} random outputs for {} amounts",
                    outs_count,
                    amounts.len()
                );
                let result = node.get_random_outputs_for_amounts(amounts, outs_count).await;
                RequestOutcome::RandomOutputs { context, result }
            }
            WalletRequest::Relay {
                context,
                transaction,
            } => {
                let result = node.relay_transaction(&transaction).await;
                RequestOutcome::Relayed { context, result }
            }
        }
    }
}
