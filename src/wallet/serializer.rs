//! Encrypted wallet container.
//!
//! Layout: `MAGIC || salt(32) || nonce(24) || mac(32) || ciphertext`. The
//! body is bincode, XORed with a BLAKE3 keystream derived from the password
//! and salt; the MAC is keyed BLAKE3 over `nonce || ciphertext`. An empty
//! password is allowed and goes through the same path.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::account::AccountBase;
use crate::wallet::cache::WalletUserTransactionsCache;
use crate::wallet::error::WalletError;

const WALLET_FILE_VERSION: u32 = 1;
const WALLET_MAGIC: [u8; 4] = [0x48, 0x41, 0x4C, 0x57];
const WALLET_SALT_SIZE: usize = 32;
const WALLET_NONCE_SIZE: usize = 24;
const WALLET_MAC_SIZE: usize = 32;
const HEADER_SIZE: usize = 4 + WALLET_SALT_SIZE + WALLET_NONCE_SIZE + WALLET_MAC_SIZE;

#[derive(Serialize)]
struct WalletBodyRef<'a> {
    version: u32,
    account: &'a AccountBase,
    cache: Option<&'a WalletUserTransactionsCache>,
    sync_state: Option<&'a [u8]>,
}

#[derive(Deserialize)]
struct WalletBody {
    version: u32,
    account: AccountBase,
    cache: Option<WalletUserTransactionsCache>,
    sync_state: Option<Vec<u8>>,
}

/// Contents of a loaded wallet.
#[derive(Debug)]
pub struct WalletData {
    pub account: AccountBase,
    /// Absent when the wallet was saved without details.
    pub cache: Option<WalletUserTransactionsCache>,
    /// Opaque synchronizer state, absent when saved without it.
    pub sync_state: Option<Vec<u8>>,
}

fn derive_key(domain: &str, password: &str, salt: &[u8; WALLET_SALT_SIZE]) -> [u8; 32] {
    let mut input = Vec::with_capacity(salt.len() + password.len());
    input.extend_from_slice(salt);
    input.extend_from_slice(password.as_bytes());
    let key = crate::hash_domain(domain, &input);
    input.zeroize();
    key
}

fn derive_wallet_key(password: &str, salt: &[u8; WALLET_SALT_SIZE]) -> [u8; 32] {
    derive_key("halo.wallet.file.key", password, salt)
}

fn derive_wallet_mac_key(password: &str, salt: &[u8; WALLET_SALT_SIZE]) -> [u8; 32] {
    derive_key("halo.wallet.file.mac", password, salt)
}

fn wallet_xor_keystream(key: &[u8; 32], nonce: &[u8; WALLET_NONCE_SIZE], data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut block_input = Vec::with_capacity(32 + WALLET_NONCE_SIZE + 8);
    for (block_idx, chunk) in data.chunks(32).enumerate() {
        block_input.clear();
        block_input.extend_from_slice(key);
        block_input.extend_from_slice(nonce);
        block_input.extend_from_slice(&(block_idx as u64).to_le_bytes());
        let block = crate::hash_domain("halo.wallet.file.stream", &block_input);
        result.extend(chunk.iter().zip(block.iter()).map(|(d, k)| d ^ k));
    }
    block_input.zeroize();
    result
}

fn wallet_mac(mac_key: &[u8; 32], nonce: &[u8; WALLET_NONCE_SIZE], ciphertext: &[u8]) -> blake3::Hash {
    let mut mac_input = Vec::with_capacity(WALLET_NONCE_SIZE + ciphertext.len());
    mac_input.extend_from_slice(nonce);
    mac_input.extend_from_slice(ciphertext);
    blake3::keyed_hash(mac_key, &mac_input)
}

/// Encrypt the wallet state under `password`.
pub fn serialize_wallet(
    account: &AccountBase,
    password: &str,
    cache: Option<&WalletUserTransactionsCache>,
    sync_state: Option<&[u8]>,
) -> Result<Vec<u8>, WalletError> {
    let body = WalletBodyRef {
        version: WALLET_FILE_VERSION,
        account,
        cache,
        sync_state,
    };
    let mut plaintext = crate::serialize(&body)?;

    let salt: [u8; WALLET_SALT_SIZE] = rand::random();
    let mut nonce = [0u8; WALLET_NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    let mut enc_key = derive_wallet_key(password, &salt);
    let mut mac_key = derive_wallet_mac_key(password, &salt);
    let ciphertext = wallet_xor_keystream(&enc_key, &nonce, &plaintext);
    plaintext.zeroize();
    enc_key.zeroize();
    let mac = wallet_mac(&mac_key, &nonce, &ciphertext);
    mac_key.zeroize();

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(&WALLET_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(mac.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and decode a wallet. A MAC mismatch is reported as
/// [`WalletError::WrongPassword`].
pub fn deserialize_wallet(raw: &[u8], password: &str) -> Result<WalletData, WalletError> {
    if raw.len() < HEADER_SIZE || raw[..4] != WALLET_MAGIC {
        return Err(WalletError::Persistence("not a wallet file".into()));
    }
    let salt: [u8; WALLET_SALT_SIZE] = raw[4..4 + WALLET_SALT_SIZE]
        .try_into()
        .map_err(|_| WalletError::Persistence("truncated salt".into()))?;
    let nonce: [u8; WALLET_NONCE_SIZE] = raw[4 + WALLET_SALT_SIZE..4 + WALLET_SALT_SIZE + WALLET_NONCE_SIZE]
        .try_into()
        .map_err(|_| WalletError::Persistence("truncated nonce".into()))?;
    let stored_mac = &raw[4 + WALLET_SALT_SIZE + WALLET_NONCE_SIZE..HEADER_SIZE];
    let ciphertext = &raw[HEADER_SIZE..];

    let mut mac_key = derive_wallet_mac_key(password, &salt);
    let expected_mac = wallet_mac(&mac_key, &nonce, ciphertext);
    mac_key.zeroize();
    if !crate::constant_time_eq(stored_mac, expected_mac.as_bytes()) {
        return Err(WalletError::WrongPassword);
    }
    let mut enc_key = derive_wallet_key(password, &salt);
    let mut plaintext = wallet_xor_keystream(&enc_key, &nonce, ciphertext);
    enc_key.zeroize();

    let body: Result<WalletBody, _> = crate::deserialize(&plaintext);
    plaintext.zeroize();
    let body = body?;
    if body.version != WALLET_FILE_VERSION {
        return Err(WalletError::Persistence(format!(
            "unsupported wallet version: {} (expected {})",
            body.version, WALLET_FILE_VERSION
        )));
    }
    let cache = body.cache.map(|mut cache| {
        cache.rebuild_indexes();
        cache
    });
    Ok(WalletData {
        account: body.account,
        cache,
        sync_state: body.sync_state,
    })
}
