//! Collaborators the wallet drives but does not own: the node it relays
//! through and the synchronizer that feeds it chain data.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::{AccountKeys, AccountPublicAddress};
use crate::crypto::PublicKey;
use crate::transaction::Transaction;
use crate::wallet::outputs::TransfersContainer;

/// Error reported by a node call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct NodeError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomOutputEntry {
    pub global_amount_index: u32,
    pub out_key: PublicKey,
}

/// Decoy candidates for one amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomOutputsForAmount {
    pub amount: u64,
    pub outs: Vec<RandomOutputEntry>,
}

#[async_trait]
pub trait Node: Send + Sync {
    /// `outs_count` random outputs for each of `amounts`.
    async fn get_random_outputs_for_amounts(
        &self,
        amounts: Vec<u64>,
        outs_count: u16,
    ) -> Result<Vec<RandomOutputsForAmount>, NodeError>;

    async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError>;

    fn last_local_block_height(&self) -> u32;

    fn known_block_count(&self) -> u32;
}

/// Chain synchronization for the wallet's account.
///
/// The synchronizer calls back into
/// [`WalletLegacy`](crate::wallet::WalletLegacy) as it observes
/// transactions; this trait covers the calls going the other way.
pub trait Synchronizer: Send + Sync {
    /// Start tracking `keys` from `sync_start_timestamp` and return the
    /// container holding its outputs.
    fn add_subscription(
        &self,
        keys: &AccountKeys,
        sync_start_timestamp: u64,
    ) -> Arc<dyn TransfersContainer>;

    fn remove_subscription(&self, address: &AccountPublicAddress);

    fn start(&self);

    fn stop(&self);

    /// Opaque checkpoint state persisted with the wallet.
    fn save(&self) -> Vec<u8>;

    fn load(&self, state: &[u8]) -> Result<(), String>;
}
