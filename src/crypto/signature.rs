//! Schnorr-style signatures, transaction proofs and ring signatures.
//!
//! All three share the `(c, r)` signature shape: `c` is a Fiat-Shamir
//! challenge and `r = k - c*x` the response for nonce `k` and secret `x`.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::keys::{
    hash_to_point, hash_to_scalar, random_scalar, CryptoError, KeyImage, PublicKey, SecretKey,
};
use crate::Hash;

/// Encoded signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub(crate) c: [u8; 32],
    pub(crate) r: [u8; 32],
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let mut out = [0u8; SIGNATURE_SIZE];
        out[..32].copy_from_slice(&self.c);
        out[32..].copy_from_slice(&self.r);
        out
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return None;
        }
        let mut sig = Signature::default();
        sig.c.copy_from_slice(&bytes[..32]);
        sig.r.copy_from_slice(&bytes[32..]);
        Some(sig)
    }

    fn new(c: &Scalar, r: &Scalar) -> Self {
        Signature {
            c: c.to_bytes(),
            r: r.to_bytes(),
        }
    }

    fn scalars(&self) -> Option<(Scalar, Scalar)> {
        let c: Option<Scalar> = Scalar::from_canonical_bytes(self.c).into();
        let r: Option<Scalar> = Scalar::from_canonical_bytes(self.r).into();
        Some((c?, r?))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.to_bytes()))
    }
}

fn challenge(parts: &[&[u8]]) -> Scalar {
    let mut buf = Vec::with_capacity(32 * parts.len());
    for part in parts {
        buf.extend_from_slice(part);
    }
    hash_to_scalar(&buf)
}

// ── Plain signatures ──

pub fn generate_signature(prefix_hash: &Hash, public: &PublicKey, secret: &SecretKey) -> Signature {
    let k = random_scalar();
    let commitment = RistrettoPoint::mul_base(&k).compress();
    let c = challenge(&[prefix_hash, &public.0, commitment.as_bytes()]);
    let r = k - c * secret.to_scalar();
    Signature::new(&c, &r)
}

pub fn check_signature(prefix_hash: &Hash, public: &PublicKey, sig: &Signature) -> bool {
    let Ok(point) = public.to_point() else {
        return false;
    };
    let Some((c, r)) = sig.scalars() else {
        return false;
    };
    let commitment = (RistrettoPoint::mul_base(&r) + point * c).compress();
    challenge(&[prefix_hash, &public.0, commitment.as_bytes()]) == c
}

// ── Transaction proofs ──

/// Prove knowledge of `r` with `R = r*G` and `D = r*A`.
///
/// Used both for payment proofs (`r` is the transaction key, `A` the
/// recipient's view key) and inside reserve proofs (`r` is the view secret).
pub fn generate_tx_proof(
    prefix_hash: &Hash,
    r_pub: &PublicKey,
    a: &PublicKey,
    d: &PublicKey,
    r: &SecretKey,
) -> Result<Signature, CryptoError> {
    let a_point = a.to_point()?;
    let k = random_scalar();
    let x = RistrettoPoint::mul_base(&k).compress();
    let y = (a_point * k).compress();
    let c = challenge(&[prefix_hash, &r_pub.0, &a.0, &d.0, x.as_bytes(), y.as_bytes()]);
    Ok(Signature::new(&c, &(k - c * r.to_scalar())))
}

pub fn check_tx_proof(
    prefix_hash: &Hash,
    r_pub: &PublicKey,
    a: &PublicKey,
    d: &PublicKey,
    sig: &Signature,
) -> bool {
    let (Ok(r_point), Ok(a_point), Ok(d_point)) = (r_pub.to_point(), a.to_point(), d.to_point())
    else {
        return false;
    };
    let Some((c, resp)) = sig.scalars() else {
        return false;
    };
    let x = (RistrettoPoint::mul_base(&resp) + r_point * c).compress();
    let y = (a_point * resp + d_point * c).compress();
    challenge(&[prefix_hash, &r_pub.0, &a.0, &d.0, x.as_bytes(), y.as_bytes()]) == c
}

// ── Ring signatures ──

/// Sign `prefix_hash` with the key at `secret_index` in `ring`, linked to
/// `image`. Returns one `(c, r)` pair per ring member.
pub fn generate_ring_signature(
    prefix_hash: &Hash,
    image: &KeyImage,
    ring: &[PublicKey],
    secret: &SecretKey,
    secret_index: usize,
) -> Result<Vec<Signature>, CryptoError> {
    if secret_index >= ring.len() {
        return Err(CryptoError::RingIndex {
            index: secret_index,
            size: ring.len(),
        });
    }
    let image_point = image.to_point()?;
    let mut transcript = Vec::with_capacity(32 + 64 * ring.len());
    transcript.extend_from_slice(prefix_hash);
    let mut scalars = vec![(Scalar::ZERO, Scalar::ZERO); ring.len()];
    let mut sum = Scalar::ZERO;
    let k = random_scalar();

    for (i, member) in ring.iter().enumerate() {
        let point = member.to_point()?;
        let hp = hash_to_point(&member.0);
        let (l, r) = if i == secret_index {
            (RistrettoPoint::mul_base(&k), hp * k)
        } else {
            let c = random_scalar();
            let r = random_scalar();
            scalars[i] = (c, r);
            sum += c;
            (
                RistrettoPoint::mul_base(&r) + point * c,
                hp * r + image_point * c,
            )
        };
        transcript.extend_from_slice(l.compress().as_bytes());
        transcript.extend_from_slice(r.compress().as_bytes());
    }

    let h = hash_to_scalar(&transcript);
    let c = h - sum;
    scalars[secret_index] = (c, k - c * secret.to_scalar());
    Ok(scalars.iter().map(|(c, r)| Signature::new(c, r)).collect())
}

pub fn check_ring_signature(
    prefix_hash: &Hash,
    image: &KeyImage,
    ring: &[PublicKey],
    sigs: &[Signature],
) -> bool {
    if ring.is_empty() || ring.len() != sigs.len() {
        return false;
    }
    let Ok(image_point) = image.to_point() else {
        return false;
    };
    let mut transcript = Vec::with_capacity(32 + 64 * ring.len());
    transcript.extend_from_slice(prefix_hash);
    let mut sum = Scalar::ZERO;
    for (member, sig) in ring.iter().zip(sigs) {
        let Ok(point) = member.to_point() else {
            return false;
        };
        let Some((c, r)) = sig.scalars() else {
            return false;
        };
        let hp = hash_to_point(&member.0);
        let l = RistrettoPoint::mul_base(&r) + point * c;
        let rr = hp * r + image_point * c;
        transcript.extend_from_slice(l.compress().as_bytes());
        transcript.extend_from_slice(rr.compress().as_bytes());
        sum += c;
    }
    hash_to_scalar(&transcript) == sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::crypto::stealth::{generate_key_image, scalarmult_key};

    #[test]
    fn sign_and_verify() {
        let pair = KeyPair::generate();
        let msg = crate::cn_fast_hash(b"hello");
        let sig = generate_signature(&msg, &pair.public, &pair.secret);
        assert!(check_signature(&msg, &pair.public, &sig));
        assert!(!check_signature(&crate::cn_fast_hash(b"other"), &pair.public, &sig));
        assert!(!check_signature(&msg, &KeyPair::generate().public, &sig));
    }

    #[test]
    fn signature_bytes_roundtrip() {
        let pair = KeyPair::generate();
        let sig = generate_signature(&[1u8; 32], &pair.public, &pair.secret);
        assert_eq!(Signature::from_slice(&sig.to_bytes()), Some(sig));
        assert!(Signature::from_slice(&[0u8; 63]).is_none());
    }

    #[test]
    fn non_canonical_scalar_fails_closed() {
        let pair = KeyPair::generate();
        let mut sig = generate_signature(&[1u8; 32], &pair.public, &pair.secret);
        sig.r = [0xff; 32];
        assert!(!check_signature(&[1u8; 32], &pair.public, &sig));
    }

    #[test]
    fn tx_proof_verifies_and_binds_shared_secret() {
        let tx_key = KeyPair::generate();
        let view = KeyPair::generate();
        let d = scalarmult_key(&view.public, &tx_key.secret).unwrap();
        let prefix = [9u8; 32];
        let sig = generate_tx_proof(&prefix, &tx_key.public, &view.public, &d, &tx_key.secret)
            .unwrap();
        assert!(check_tx_proof(&prefix, &tx_key.public, &view.public, &d, &sig));

        let wrong_d = scalarmult_key(&view.public, &SecretKey::random()).unwrap();
        assert!(!check_tx_proof(&prefix, &tx_key.public, &view.public, &wrong_d, &sig));
    }

    #[test]
    fn ring_signature_hides_signer_and_verifies() {
        let members: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let ring: Vec<PublicKey> = members.iter().map(|m| m.public).collect();
        let signer = &members[2];
        let image = generate_key_image(&signer.public, &signer.secret);
        let prefix = [3u8; 32];
        let sigs = generate_ring_signature(&prefix, &image, &ring, &signer.secret, 2).unwrap();
        assert_eq!(sigs.len(), 4);
        assert!(check_ring_signature(&prefix, &image, &ring, &sigs));

        let other = &members[1];
        let wrong_image = generate_key_image(&other.public, &other.secret);
        assert!(!check_ring_signature(&prefix, &wrong_image, &ring, &sigs));
    }

    #[test]
    fn ring_signature_of_size_one() {
        let pair = KeyPair::generate();
        let image = generate_key_image(&pair.public, &pair.secret);
        let sigs =
            generate_ring_signature(&[0u8; 32], &image, &[pair.public], &pair.secret, 0).unwrap();
        assert!(check_ring_signature(&[0u8; 32], &image, &[pair.public], &sigs));
    }

    #[test]
    fn ring_signature_rejects_bad_index() {
        let pair = KeyPair::generate();
        let image = generate_key_image(&pair.public, &pair.secret);
        let result = generate_ring_signature(&[0u8; 32], &image, &[pair.public], &pair.secret, 1);
        assert_eq!(result, Err(CryptoError::RingIndex { index: 1, size: 1 }));
    }
}
