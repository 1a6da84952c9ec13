//! Account key custody.
//!
//! An account is a spend key pair and a view key pair. The view secret of a
//! deterministic account is `Hs(spend_secret)`, so the spend secret alone is
//! enough to restore it. A tracking (view-only) account carries a null spend
//! secret and can watch incoming funds but never sign.

use serde::{Deserialize, Serialize};

use crate::constants::{ACCOUNT_CREATE_TIME_ACCURACY, RESTORED_ACCOUNT_TIMESTAMP};
use crate::crypto::keys::{hash_to_secret_key, KeyPair};
use crate::crypto::stealth::{
    derive_public_key, derive_secret_key, generate_key_derivation, generate_key_image,
};
use crate::crypto::{CryptoError, KeyImage, PublicKey, SecretKey};

/// The public half of an account, encoded as the user-facing address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountPublicAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

impl AccountPublicAddress {
    /// `spend || view`, the byte form used when hashing an address.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.spend_public_key.as_bytes());
        out[32..].copy_from_slice(self.view_public_key.as_bytes());
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKeys {
    pub address: AccountPublicAddress,
    pub spend_secret_key: SecretKey,
    pub view_secret_key: SecretKey,
}

impl AccountKeys {
    /// Keys for a view-only wallet.
    pub fn tracking(address: AccountPublicAddress, view_secret_key: SecretKey) -> Self {
        AccountKeys {
            address,
            spend_secret_key: SecretKey::default(),
            view_secret_key,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.spend_secret_key.is_null()
    }

    /// One-time public key this account expects at `output_index` of a
    /// transaction with public key `tx_public_key`.
    pub fn derive_output_key(
        &self,
        tx_public_key: &PublicKey,
        output_index: usize,
    ) -> Result<PublicKey, CryptoError> {
        let derivation = generate_key_derivation(tx_public_key, &self.view_secret_key)?;
        derive_public_key(&derivation, output_index, &self.address.spend_public_key)
    }

    /// One-time key pair and key image for an output owned by this account.
    pub fn derive_ephemeral(
        &self,
        tx_public_key: &PublicKey,
        output_index: usize,
    ) -> Result<(KeyPair, KeyImage), CryptoError> {
        let derivation = generate_key_derivation(tx_public_key, &self.view_secret_key)?;
        let public = derive_public_key(&derivation, output_index, &self.address.spend_public_key)?;
        let secret = derive_secret_key(&derivation, output_index, &self.spend_secret_key);
        let image = generate_key_image(&public, &secret);
        Ok((KeyPair { public, secret }, image))
    }
}

/// Key custody for one wallet: keys plus the account creation timestamp
/// (synchronization never needs to look at blocks older than that).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBase {
    keys: AccountKeys,
    creation_timestamp: u64,
}

impl AccountBase {
    /// New deterministic account with a random spend key.
    pub fn generate() -> Self {
        let (account, _) = Self::generate_key(None, false, false);
        account
    }

    /// Generate an account, returning it with its spend secret (the seed).
    ///
    /// With `recover` the spend secret is `recovery_key` and the creation
    /// timestamp falls back to the network's restore epoch. With `two_random`
    /// the view key is random instead of derived from the spend key.
    pub fn generate_key(
        recovery_key: Option<&SecretKey>,
        recover: bool,
        two_random: bool,
    ) -> (Self, SecretKey) {
        let spend = match (recover, recovery_key) {
            (true, Some(key)) => KeyPair::from_secret(key.clone()),
            _ => KeyPair::generate(),
        };
        let view = if two_random {
            KeyPair::generate()
        } else {
            KeyPair::from_secret(view_key_from_spend(&spend.secret))
        };
        let creation_timestamp = if recover {
            RESTORED_ACCOUNT_TIMESTAMP
        } else {
            crate::unix_time()
        };
        let seed = spend.secret.clone();
        let account = AccountBase {
            keys: AccountKeys {
                address: AccountPublicAddress {
                    spend_public_key: spend.public,
                    view_public_key: view.public,
                },
                spend_secret_key: spend.secret,
                view_secret_key: view.secret,
            },
            creation_timestamp,
        };
        (account, seed)
    }

    /// Restore a deterministic account from its spend secret.
    pub fn from_seed(seed: &SecretKey) -> Self {
        Self::generate_key(Some(seed), true, false).0
    }

    /// Wrap imported keys. The creation timestamp is "now" rounded down to
    /// the creation-time accuracy.
    pub fn from_keys(keys: AccountKeys) -> Self {
        let now = crate::unix_time();
        AccountBase {
            keys,
            creation_timestamp: now - now % ACCOUNT_CREATE_TIME_ACCURACY,
        }
    }

    pub(crate) fn from_parts(keys: AccountKeys, creation_timestamp: u64) -> Self {
        AccountBase {
            keys,
            creation_timestamp,
        }
    }

    pub fn keys(&self) -> &AccountKeys {
        &self.keys
    }

    pub fn address(&self) -> &AccountPublicAddress {
        &self.keys.address
    }

    pub fn creation_timestamp(&self) -> u64 {
        self.creation_timestamp
    }

    pub fn set_creation_timestamp(&mut self, timestamp: u64) {
        self.creation_timestamp = timestamp;
    }

    pub fn is_tracking(&self) -> bool {
        self.keys.is_tracking()
    }

    /// Hex seed of a deterministic account; `None` when the view key is not
    /// derived from the spend key or the account is view-only.
    pub fn seed(&self) -> Option<String> {
        if self.is_tracking() {
            return None;
        }
        let expected_view = view_key_from_spend(&self.keys.spend_secret_key);
        (expected_view == self.keys.view_secret_key).then(|| self.keys.spend_secret_key.to_hex())
    }
}

fn view_key_from_spend(spend: &SecretKey) -> SecretKey {
    hash_to_secret_key(&crate::cn_fast_hash(spend.as_bytes()))
}
