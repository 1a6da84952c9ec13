//! # Halo wallet core
//!
//! Wallet engine for the Halo CryptoNote network:
//! - **Key custody**: spend/view key pairs, deterministic restore, tracking wallets
//! - **Transaction cache**: wallet-visible transactions, transfers and interest-bearing deposits
//! - **Sender pipeline**: output selection, decoy fetching, ring signing, relay
//! - **Proofs**: payment proofs, reserve proofs and signed messages
//!
//! Chain synchronization and node transport are consumed through the traits in
//! [`wallet::outputs`] and [`wallet::node`]; the public entry point is
//! [`wallet::WalletLegacy`].

pub mod account;
pub mod config;
pub mod crypto;
pub mod currency;
pub mod transaction;
pub mod wallet;

/// Protocol and wallet constants
pub mod constants {
    /// Atomic units per coin (8 decimal places).
    pub const COIN: u64 = 100_000_000;
    /// Number of decimal places shown when formatting amounts.
    pub const DISPLAY_DECIMAL_POINT: usize = 8;
    /// Coin ticker used in formatted output.
    pub const CRYPTONOTE_TICKER: &str = "ADON";
    /// Network name.
    pub const CRYPTONOTE_NAME: &str = "halo";

    /// Base58 address prefix (varint encoded in front of the keys).
    pub const PUBLIC_ADDRESS_BASE58_PREFIX: u64 = 0xf0ec6;
    /// Minimum fee for a transfer that carries no TTL.
    pub const MINIMUM_FEE: u64 = 1_000_000;
    /// Outputs at or below this amount are dust.
    pub const DEFAULT_DUST_THRESHOLD: u64 = 1_000_000;
    /// Smallest non-zero mixin accepted for a transfer.
    pub const MIN_TX_MIXIN_SIZE: u64 = 3;
    /// Largest mixin accepted for a transfer.
    pub const MAX_TX_MIXIN_SIZE: u64 = 12;
    /// Target block interval in seconds.
    pub const DIFFICULTY_TARGET: u64 = 120;
    /// Expected number of blocks per day.
    pub const EXPECTED_NUMBER_OF_BLOCKS_PER_DAY: u32 = (24 * 60 * 60 / DIFFICULTY_TARGET) as u32;

    /// Smallest amount that can be locked in a deposit.
    pub const DEPOSIT_MIN_AMOUNT: u64 = 5_000 * COIN;
    /// Shortest deposit term in blocks (30 days).
    pub const DEPOSIT_MIN_TERM: u32 = 30 * EXPECTED_NUMBER_OF_BLOCKS_PER_DAY;
    /// Longest deposit term in blocks (12 months).
    pub const DEPOSIT_MAX_TERM: u32 = 12 * DEPOSIT_MIN_TERM;
    /// Rate factor subtracted from `term * max_total_rate` when computing interest.
    pub const DEPOSIT_MIN_TOTAL_RATE_FACTOR: u64 = 0;
    /// Interest in percent paid for a deposit held for the maximum term.
    pub const DEPOSIT_MAX_TOTAL_RATE: u64 = 3;

    /// Seconds an unconfirmed transaction stays in the pool before the wallet drops it.
    pub const MEMPOOL_TX_LIVETIME: u64 = 60 * 60 * 12;
    /// Upper bound on the serialized size of a transaction the wallet will relay.
    pub const MAX_TRANSACTION_SIZE: usize = 100_000;
    /// Granularity of account creation timestamps (one day).
    pub const ACCOUNT_CREATE_TIME_ACCURACY: u64 = 24 * 60 * 60;
    /// Creation timestamp given to accounts restored from a seed (2016-05-30).
    pub const RESTORED_ACCOUNT_TIMESTAMP: u64 = 1_464_595_534;

    /// Block height recorded for transactions that are not in a block yet.
    pub const UNCONFIRMED_TRANSACTION_HEIGHT: u32 = u32::MAX;
    /// Current transaction format version.
    pub const CURRENT_TRANSACTION_VERSION: u8 = 1;
    /// Maximum plaintext bytes in a single transaction message.
    pub const MAX_MESSAGE_SIZE: usize = 1024;
    /// Maximum number of messages attached to one transaction.
    pub const MAX_MESSAGES_PER_TX: usize = 16;
    /// Upper bound on a persisted wallet container (256 MiB).
    pub const MAX_WALLET_FILE_BYTES: usize = 256 * 1024 * 1024;
}

/// 32-byte hash used throughout the wallet
pub type Hash = [u8; 32];

/// Keccak-256, the network's fast hash.
pub fn cn_fast_hash(data: &[u8]) -> Hash {
    use sha3::{Digest, Keccak256};
    Keccak256::digest(data).into()
}

/// Keccak-256 of length-prefixed concatenated slices.
///
/// Each part is prefixed with its length as a varint so that `["AB","C"]`
/// and `["A","BC"]` hash differently.
pub fn cn_fast_hash_concat(parts: &[&[u8]]) -> Hash {
    let mut buf = Vec::new();
    for part in parts {
        write_varint(&mut buf, part.len() as u64);
        buf.extend_from_slice(part);
    }
    cn_fast_hash(&buf)
}

/// Compute a domain-separated BLAKE3 hash.
///
/// Used for wallet-local key material (file encryption, message keystreams),
/// never for anything that goes on chain.
pub fn hash_domain(domain: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(domain);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Constant-time comparison of two byte slices.
///
/// Returns true only if the slices have equal length and identical contents.
/// The length comparison itself is not constant time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Append `value` as a little-endian base-128 varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Read a varint from the front of `data`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in data.iter().enumerate().take(10) {
        let bits = (*byte & 0x7f) as u64;
        if i == 9 && bits > 1 {
            return None;
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Seconds since the Unix epoch.
pub fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Serialize a value using bincode with legacy (v1-compatible) encoding.
pub fn serialize<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(val, bincode::config::legacy())
}

/// Deserialize a value using bincode with legacy (v1-compatible) encoding.
///
/// Rejects inputs larger than `MAX_WALLET_FILE_BYTES`.
pub fn deserialize<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, bincode::error::DecodeError> {
    if bytes.len() > constants::MAX_WALLET_FILE_BYTES {
        return Err(bincode::error::DecodeError::LimitExceeded);
    }
    let (val, _len) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
    Ok(val)
}
