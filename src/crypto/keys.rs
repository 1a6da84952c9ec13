//! Fixed-size key types over the Ristretto group.
//!
//! Public keys, key images and derivations are compressed Ristretto points;
//! secret keys are canonical scalars. Each gets its own newtype so that
//! converting between them is always an explicit call.

use std::fmt;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Hash;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid curve point")]
    InvalidPoint,
    #[error("invalid scalar")]
    InvalidScalar,
    #[error("secret index {index} out of range for ring of size {size}")]
    RingIndex { index: usize, size: usize },
}

// ── Public keys ──

/// A compressed Ristretto point used as a public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub(crate) [u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Some(PublicKey(bytes.try_into().ok()?))
    }

    pub(crate) fn from_point(point: &RistrettoPoint) -> Self {
        PublicKey(point.compress().to_bytes())
    }

    pub(crate) fn to_point(&self) -> Result<RistrettoPoint, CryptoError> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(CryptoError::InvalidPoint)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// ── Secret keys ──

/// A secret scalar. Zeroized on drop; `Debug` output is redacted.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct SecretKey(pub(crate) [u8; 32]);

impl SecretKey {
    /// Wrap raw bytes, reducing them to a canonical scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SecretKey(Scalar::from_bytes_mod_order(bytes).to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
        scalar.map(|s| SecretKey(s.to_bytes()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The all-zero key marks a missing spend key (tracking wallets).
    pub fn is_null(&self) -> bool {
        crate::constant_time_eq(&self.0, &[0u8; 32])
    }

    pub fn random() -> Self {
        SecretKey(random_scalar().to_bytes())
    }

    pub(crate) fn from_scalar(scalar: &Scalar) -> Self {
        SecretKey(scalar.to_bytes())
    }

    pub(crate) fn to_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        crate::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

// ── Key images and derivations ──

/// `x * Hp(P)` for the one-time key pair `(x, P)` of a spent output.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyImage(pub(crate) [u8; 32]);

impl KeyImage {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn to_point(&self) -> Result<RistrettoPoint, CryptoError> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(CryptoError::InvalidPoint)
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({})", hex::encode(self.0))
    }
}

/// Shared secret `a * R` between a transaction key and a view key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivation(pub(crate) [u8; 32]);

impl KeyDerivation {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reinterpret as a public key (proofs publish the shared secret).
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }

    pub fn from_public_key(key: &PublicKey) -> Self {
        KeyDerivation(key.0)
    }
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyDerivation([REDACTED])")
    }
}

// ── Key pairs ──

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random())
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        KeyPair {
            public: secret_key_to_public_key(&secret),
            secret,
        }
    }
}

/// Derive a key pair from a 32-byte seed, reduced modulo the group order.
pub fn generate_deterministic_keys(seed: &[u8; 32]) -> KeyPair {
    KeyPair::from_secret(SecretKey::from_bytes(*seed))
}

pub fn secret_key_to_public_key(secret: &SecretKey) -> PublicKey {
    PublicKey::from_point(&RistrettoPoint::mul_base(&secret.to_scalar()))
}

/// Returns true if the bytes decode to a valid group element.
pub fn check_key(key: &PublicKey) -> bool {
    key.to_point().is_ok()
}

pub(crate) fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    rand::rng().fill_bytes(&mut wide);
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    scalar
}

/// `Hs(data)`: Keccak-256 reduced to a scalar.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(crate::cn_fast_hash(data))
}

/// `Hp(data)`: Keccak-512 mapped onto the group with the Elligator map.
pub fn hash_to_point(data: &[u8]) -> RistrettoPoint {
    let wide: [u8; 64] = Keccak512::digest(data).into();
    RistrettoPoint::from_uniform_bytes(&wide)
}

/// Reduce a hash to a secret key (used to derive view keys from spend keys).
pub fn hash_to_secret_key(hash: &Hash) -> SecretKey {
    SecretKey::from_bytes(*hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_valid_points() {
        let pair = KeyPair::generate();
        assert!(check_key(&pair.public));
        assert_eq!(secret_key_to_public_key(&pair.secret), pair.public);
    }

    #[test]
    fn deterministic_keys_repeat() {
        let seed = [7u8; 32];
        assert_eq!(generate_deterministic_keys(&seed), generate_deterministic_keys(&seed));
    }

    #[test]
    fn check_key_rejects_garbage() {
        // Non-canonical encodings never decompress.
        assert!(!check_key(&PublicKey([0xff; 32])));
    }

    #[test]
    fn secret_key_debug_redacted() {
        let sk = SecretKey::from_bytes([42u8; 32]);
        let debug_str = format!("{:?}", sk);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("42"));
    }

    #[test]
    fn secret_key_hex_roundtrip_is_canonical() {
        let sk = SecretKey::random();
        assert_eq!(SecretKey::from_hex(&sk.to_hex()), Some(sk));
        assert!(SecretKey::from_hex(&"ff".repeat(32)).is_none());
        assert!(SecretKey::from_hex("abcd").is_none());
    }

    #[test]
    fn null_secret_key() {
        assert!(SecretKey::default().is_null());
        assert!(!SecretKey::random().is_null());
    }

    #[test]
    fn hash_to_point_is_deterministic() {
        assert_eq!(hash_to_point(b"abc"), hash_to_point(b"abc"));
        assert_ne!(hash_to_point(b"abc"), hash_to_point(b"abd"));
    }
}
