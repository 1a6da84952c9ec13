//! One-time output keys.
//!
//! A sender picks a transaction key `r` and publishes `R = r*G`. For the
//! output at index `i` paid to address `(A, B)` the one-time key is
//! `P = Hs(r*A || i)*G + B`. The recipient recomputes the shared secret as
//! `a*R` and recovers the one-time secret `x = Hs(a*R || i) + b`.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use super::keys::{
    hash_to_point, hash_to_scalar, CryptoError, KeyDerivation, KeyImage, PublicKey, SecretKey,
};

/// Shared secret `secret * public`.
pub fn generate_key_derivation(
    public: &PublicKey,
    secret: &SecretKey,
) -> Result<KeyDerivation, CryptoError> {
    let point = public.to_point()?;
    Ok(KeyDerivation(
        (point * secret.to_scalar()).compress().to_bytes(),
    ))
}

/// `Hs(derivation || varint(output_index))`.
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: usize) -> Scalar {
    let mut buf = Vec::with_capacity(32 + 10);
    buf.extend_from_slice(&derivation.0);
    crate::write_varint(&mut buf, output_index as u64);
    hash_to_scalar(&buf)
}

/// One-time public key for an output: `Hs(D || i)*G + base`.
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: usize,
    base: &PublicKey,
) -> Result<PublicKey, CryptoError> {
    let base_point = base.to_point()?;
    let scalar = derivation_to_scalar(derivation, output_index);
    Ok(PublicKey::from_point(
        &(RistrettoPoint::mul_base(&scalar) + base_point),
    ))
}

/// One-time secret key for an output: `Hs(D || i) + base`.
pub fn derive_secret_key(
    derivation: &KeyDerivation,
    output_index: usize,
    base: &SecretKey,
) -> SecretKey {
    let scalar = derivation_to_scalar(derivation, output_index) + base.to_scalar();
    SecretKey::from_scalar(&scalar)
}

/// Key image `x * Hp(P)`.
pub fn generate_key_image(public: &PublicKey, secret: &SecretKey) -> KeyImage {
    let point = hash_to_point(&public.0) * secret.to_scalar();
    KeyImage(point.compress().to_bytes())
}

/// `secret * point`, returned as a public key.
pub fn scalarmult_key(point: &PublicKey, secret: &SecretKey) -> Result<PublicKey, CryptoError> {
    Ok(PublicKey::from_point(&(point.to_point()? * secret.to_scalar())))
}
