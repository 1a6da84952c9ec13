//! Message signatures, payment proofs and reserve proofs.
//!
//! All three are text tokens: a version header followed by base58. Checks
//! fail closed and return `false`/`None` instead of an error.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::account::{AccountKeys, AccountPublicAddress};
use crate::crypto::signature::{
    check_ring_signature, check_signature, check_tx_proof as check_proof_signature,
    generate_ring_signature, generate_signature, generate_tx_proof, Signature,
};
use crate::crypto::keys::secret_key_to_public_key;
use crate::crypto::stealth::{derive_public_key, scalarmult_key};
use crate::crypto::{KeyDerivation, KeyImage, PublicKey, SecretKey};
use crate::transaction::extra::get_transaction_public_key;
use crate::wallet::error::WalletError;
use crate::wallet::outputs::TransactionOutputInformation;
use crate::Hash;

pub const MESSAGE_SIGNATURE_HEADER: &str = "SigV1";
pub const TX_PROOF_HEADER: &str = "ProofV1";
pub const RESERVE_PROOF_HEADER: &str = "ReserveProofV1";

/// base58 length of a 32-byte key.
const ENCODED_KEY_LEN: usize = 44;
/// base58 length of a 64-byte signature.
const ENCODED_SIGNATURE_LEN: usize = 88;

fn encode_base58(data: &[u8]) -> Result<String, WalletError> {
    base58_monero::encode(data)
        .map_err(|_| WalletError::ProofGenerationFailed("base58 encoding failed".into()))
}

// ── Message signatures ──

/// Sign `message` with the spend key.
pub fn sign_message(keys: &AccountKeys, message: &str) -> Result<String, WalletError> {
    if keys.is_tracking() {
        return Err(WalletError::TrackingWalletOnly);
    }
    let hash = crate::cn_fast_hash(message.as_bytes());
    let signature = generate_signature(&hash, &keys.address.spend_public_key, &keys.spend_secret_key);
    Ok(format!(
        "{}{}",
        MESSAGE_SIGNATURE_HEADER,
        encode_base58(&signature.to_bytes())?
    ))
}

pub fn verify_message(message: &str, address: &AccountPublicAddress, signature: &str) -> bool {
    let Some(encoded) = signature.strip_prefix(MESSAGE_SIGNATURE_HEADER) else {
        tracing::debug!("message signature header mismatch");
        return false;
    };
    let Some(signature) = base58_monero::decode(encoded)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes))
    else {
        tracing::debug!("message signature decoding failed");
        return false;
    };
    let hash = crate::cn_fast_hash(message.as_bytes());
    check_signature(&hash, &address.spend_public_key, &signature)
}

// ── Payment proofs ──

/// Prove that transaction `txid`, created with secret key `tx_key`, paid
/// `address`. The token carries `rA = tx_key * A` and a proof that the same
/// `r` produced both `R = r*G` and `rA`.
pub fn get_tx_proof(
    txid: &Hash,
    address: &AccountPublicAddress,
    tx_key: &SecretKey,
) -> Result<String, WalletError> {
    let shared = scalarmult_key(&address.view_public_key, tx_key)
        .map_err(|e| WalletError::ProofGenerationFailed(e.to_string()))?;
    let tx_public = secret_key_to_public_key(tx_key);
    let signature = generate_tx_proof(txid, &tx_public, &address.view_public_key, &shared, tx_key)
        .map_err(|e| WalletError::ProofGenerationFailed(e.to_string()))?;
    Ok(format!(
        "{}{}{}",
        TX_PROOF_HEADER,
        encode_base58(shared.as_bytes())?,
        encode_base58(&signature.to_bytes())?
    ))
}

/// Check a payment proof against the transaction's extra field.
pub fn check_tx_proof(
    txid: &Hash,
    tx_extra: &[u8],
    address: &AccountPublicAddress,
    proof: &str,
) -> bool {
    let Some(encoded) = proof.strip_prefix(TX_PROOF_HEADER) else {
        return false;
    };
    if encoded.len() != ENCODED_KEY_LEN + ENCODED_SIGNATURE_LEN || !encoded.is_ascii() {
        return false;
    }
    let (shared, signature) = encoded.split_at(ENCODED_KEY_LEN);
    let Some(shared) = base58_monero::decode(shared)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
        .map(PublicKey::from_bytes)
    else {
        return false;
    };
    let Some(signature) = base58_monero::decode(signature)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes))
    else {
        return false;
    };
    let Some(tx_public) = get_transaction_public_key(tx_extra) else {
        tracing::debug!("transaction {} has no public key", hex::encode(txid));
        return false;
    };
    check_proof_signature(txid, &tx_public, &address.view_public_key, &shared, &signature)
}

// ── Reserve proofs ──

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveProofEntry {
    pub txid: Hash,
    pub index_in_tx: u32,
    /// `view_secret * R` for the output's transaction.
    pub shared_secret: PublicKey,
    pub key_image: KeyImage,
    pub shared_secret_sig: Signature,
    pub key_image_sig: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveProof {
    pub proofs: Vec<ReserveProofEntry>,
    /// Spend-key signature over the proof prefix hash.
    pub signature: Signature,
}

/// What a verifier knows about an output referenced by a reserve proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvenOutput {
    pub amount: u64,
    pub output_key: PublicKey,
    pub transaction_public_key: PublicKey,
}

/// Smallest covering selection: sort by amount descending, drop the
/// largest while the next one alone still covers `reserve`, then take
/// outputs until the reserve is reached.
fn select_reserve_outputs(
    mut outputs: Vec<TransactionOutputInformation>,
    reserve: u64,
) -> Vec<TransactionOutputInformation> {
    outputs.sort_by(|a, b| b.amount.cmp(&a.amount));
    while outputs.len() >= 2 && outputs[1].amount >= reserve {
        outputs.remove(0);
    }
    let mut total = 0u64;
    let mut count = 0;
    for output in &outputs {
        if total >= reserve {
            break;
        }
        total = total.saturating_add(output.amount);
        count += 1;
    }
    outputs.truncate(count);
    outputs
}

fn reserve_prefix_hash(message: &str, address: &AccountPublicAddress, images: &[KeyImage]) -> Hash {
    let mut data = Vec::with_capacity(message.len() + 64 + 32 * images.len());
    data.extend_from_slice(message.as_bytes());
    data.extend_from_slice(&address.to_bytes());
    for image in images {
        data.extend_from_slice(image.as_bytes());
    }
    crate::cn_fast_hash(&data)
}

/// Prove control of at least `reserve` out of the unlocked `outputs`.
///
/// `actual_balance` is the wallet's spendable balance; it must be nonzero
/// and cover the reserve.
pub fn get_reserve_proof(
    keys: &AccountKeys,
    mut outputs: Vec<TransactionOutputInformation>,
    actual_balance: u64,
    reserve: u64,
    message: &str,
) -> Result<String, WalletError> {
    if keys.is_tracking() {
        return Err(WalletError::TrackingWalletOnly);
    }
    if actual_balance == 0 || actual_balance < reserve {
        return Err(WalletError::InsufficientFunds);
    }
    let mut seen = HashSet::with_capacity(outputs.len());
    outputs.retain(|o| seen.insert(o.id()));
    let selected = select_reserve_outputs(outputs, reserve);
    if selected.iter().map(|o| o.amount).sum::<u64>() < reserve {
        return Err(WalletError::InsufficientFunds);
    }
    let proof = sign_reserve_proof(keys, &selected, message)?;
    tracing::info!(
        "reserve proof over {} outputs for {}",
        selected.len(),
        reserve
    );
    Ok(proof)
}

fn sign_reserve_proof(
    keys: &AccountKeys,
    selected: &[TransactionOutputInformation],
    message: &str,
) -> Result<String, WalletError> {
    let mut ephemerals = Vec::with_capacity(selected.len());
    for output in selected {
        let (ephemeral, image) = keys
            .derive_ephemeral(&output.transaction_public_key, output.output_in_transaction as usize)
            .map_err(|e| WalletError::ProofGenerationFailed(e.to_string()))?;
        if ephemeral.public != output.output_key {
            tracing::error!(
                "derived public key mismatch for output {} of transaction {}",
                output.output_in_transaction,
                hex::encode(output.transaction_hash)
            );
            return Err(WalletError::InternalWalletError(
                "derived public key does not match output key".into(),
            ));
        }
        ephemerals.push((ephemeral, image));
    }
    let images: Vec<KeyImage> = ephemerals.iter().map(|(_, image)| *image).collect();
    let prefix_hash = reserve_prefix_hash(message, &keys.address, &images);

    let mut proofs = Vec::with_capacity(selected.len());
    for (output, (ephemeral, image)) in selected.iter().zip(&ephemerals) {
        let tx_public = output.transaction_public_key;
        let failed = |e: crate::crypto::CryptoError| WalletError::ProofGenerationFailed(e.to_string());
        let shared_secret = scalarmult_key(&tx_public, &keys.view_secret_key).map_err(failed)?;
        let shared_secret_sig = generate_tx_proof(
            &prefix_hash,
            &keys.address.view_public_key,
            &tx_public,
            &shared_secret,
            &keys.view_secret_key,
        )
        .map_err(failed)?;
        let ring_sig = generate_ring_signature(&prefix_hash, image, &[ephemeral.public], &ephemeral.secret, 0)
            .map_err(failed)?;
        let key_image_sig = ring_sig
            .first()
            .copied()
            .ok_or_else(|| WalletError::ProofGenerationFailed("empty ring signature".into()))?;
        proofs.push(ReserveProofEntry {
            txid: output.transaction_hash,
            index_in_tx: output.output_in_transaction,
            shared_secret,
            key_image: *image,
            shared_secret_sig,
            key_image_sig,
        });
    }
    let signature = generate_signature(&prefix_hash, &keys.address.spend_public_key, &keys.spend_secret_key);

    let blob = crate::serialize(&ReserveProof { proofs, signature })?;
    Ok(format!(
        "{}{}",
        RESERVE_PROOF_HEADER,
        encode_base58(hex::encode(blob).as_bytes())?
    ))
}

/// Check a reserve proof for `address` and return the total it proves.
///
/// `lookup(txid, index)` resolves each referenced output from the caller's
/// view of the chain. Whether the key images are already spent is for the
/// caller to ask a node. A proof naming an output or key image twice is
/// rejected.
pub fn check_reserve_proof<F>(
    address: &AccountPublicAddress,
    message: &str,
    proof: &str,
    lookup: F,
) -> Option<u64>
where
    F: Fn(&Hash, u32) -> Option<ProvenOutput>,
{
    let encoded = proof.strip_prefix(RESERVE_PROOF_HEADER)?;
    let hex_blob = base58_monero::decode(encoded).ok()?;
    let blob = hex::decode(hex_blob).ok()?;
    let proof: ReserveProof = crate::deserialize(&blob).ok()?;

    let images: Vec<KeyImage> = proof.proofs.iter().map(|p| p.key_image).collect();
    let prefix_hash = reserve_prefix_hash(message, address, &images);
    if !check_signature(&prefix_hash, &address.spend_public_key, &proof.signature) {
        return None;
    }

    let mut seen_outputs = HashSet::with_capacity(proof.proofs.len());
    let mut seen_images = HashSet::with_capacity(proof.proofs.len());
    let mut total = 0u64;
    for entry in &proof.proofs {
        if !seen_outputs.insert((entry.txid, entry.index_in_tx)) || !seen_images.insert(entry.key_image) {
            return None;
        }
        let output = lookup(&entry.txid, entry.index_in_tx)?;
        if !check_proof_signature(
            &prefix_hash,
            &address.view_public_key,
            &output.transaction_public_key,
            &entry.shared_secret,
            &entry.shared_secret_sig,
        ) {
            return None;
        }
        let derivation = KeyDerivation::from_public_key(&entry.shared_secret);
        let expected = derive_public_key(&derivation, entry.index_in_tx as usize, &address.spend_public_key).ok()?;
        if expected != output.output_key {
            return None;
        }
        if !check_ring_signature(&prefix_hash, &entry.key_image, &[output.output_key], &[entry.key_image_sig]) {
            return None;
        }
        total = total.checked_add(output.amount)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountBase;
    use crate::constants::COIN;
    use crate::crypto::KeyPair;
    use crate::transaction::extra::add_transaction_public_key;
    use crate::wallet::outputs::{OutputState, OutputType};

    fn owned_output(account: &AccountBase, amount: u64, index: u32) -> TransactionOutputInformation {
        let tx_key = KeyPair::generate();
        TransactionOutputInformation {
            output_type: OutputType::Key,
            amount,
            global_output_index: index,
            output_in_transaction: index,
            transaction_hash: crate::cn_fast_hash(tx_key.public.as_bytes()),
            transaction_public_key: tx_key.public,
            output_key: account
                .keys()
                .derive_output_key(&tx_key.public, index as usize)
                .unwrap(),
            required_signatures: 0,
            term: 0,
            state: OutputState::Unlocked,
        }
    }

    fn lookup_in(outputs: &[TransactionOutputInformation]) -> impl Fn(&Hash, u32) -> Option<ProvenOutput> + '_ {
        move |txid, index| {
            outputs
                .iter()
                .find(|o| o.transaction_hash == *txid && o.output_in_transaction == index)
                .map(|o| ProvenOutput {
                    amount: o.amount,
                    output_key: o.output_key,
                    transaction_public_key: o.transaction_public_key,
                })
        }
    }

    #[test]
    fn encoded_lengths() {
        assert_eq!(base58_monero::encode(&[0u8; 32]).unwrap().len(), ENCODED_KEY_LEN);
        assert_eq!(base58_monero::encode(&[0u8; 64]).unwrap().len(), ENCODED_SIGNATURE_LEN);
    }

    #[test]
    fn message_signature() {
        let account = AccountBase::generate();
        let signature = sign_message(account.keys(), "hello").unwrap();
        assert!(signature.starts_with(MESSAGE_SIGNATURE_HEADER));
        assert!(verify_message("hello", account.address(), &signature));
        assert!(!verify_message("hullo", account.address(), &signature));
        assert!(!verify_message("hello", AccountBase::generate().address(), &signature));
        assert!(!verify_message("hello", account.address(), &signature[1..]));
        assert!(!verify_message("hello", account.address(), "SigV1"));
    }

    #[test]
    fn tracking_wallet_cannot_sign() {
        let account = AccountBase::generate();
        let keys = AccountKeys::tracking(*account.address(), account.keys().view_secret_key.clone());
        assert_eq!(sign_message(&keys, "x"), Err(WalletError::TrackingWalletOnly));
    }

    #[test]
    fn payment_proof() {
        let recipient = AccountBase::generate();
        let tx_key = KeyPair::generate();
        let mut extra = Vec::new();
        add_transaction_public_key(&mut extra, &tx_key.public);
        let txid = crate::cn_fast_hash(b"tx");

        let proof = get_tx_proof(&txid, recipient.address(), &tx_key.secret).unwrap();
        assert_eq!(proof.len(), TX_PROOF_HEADER.len() + ENCODED_KEY_LEN + ENCODED_SIGNATURE_LEN);
        assert!(check_tx_proof(&txid, &extra, recipient.address(), &proof));

        assert!(!check_tx_proof(&crate::cn_fast_hash(b"other"), &extra, recipient.address(), &proof));
        assert!(!check_tx_proof(&txid, &extra, AccountBase::generate().address(), &proof));
        assert!(!check_tx_proof(&txid, &[], recipient.address(), &proof));

        // Every single-character change must break the proof.
        let alphabet = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
        for position in [TX_PROOF_HEADER.len(), TX_PROOF_HEADER.len() + 50, proof.len() - 1] {
            let original = proof.as_bytes()[position] as char;
            let replacement = alphabet.chars().find(|c| *c != original).unwrap();
            let mut tampered = proof.clone();
            tampered.replace_range(position..position + 1, &replacement.to_string());
            assert!(!check_tx_proof(&txid, &extra, recipient.address(), &tampered));
        }
    }

    #[test]
    fn reserve_selection_prefers_smallest_cover() {
        let account = AccountBase::generate();
        let outputs: Vec<_> = [7, 5, 2]
            .iter()
            .enumerate()
            .map(|(i, c)| owned_output(&account, c * COIN, i as u32))
            .collect();
        let selected = select_reserve_outputs(outputs.clone(), 6 * COIN);
        assert_eq!(selected.iter().map(|o| o.amount).collect::<Vec<_>>(), vec![7 * COIN]);

        let selected = select_reserve_outputs(outputs.clone(), 4 * COIN);
        assert_eq!(selected.iter().map(|o| o.amount).collect::<Vec<_>>(), vec![5 * COIN]);

        let selected = select_reserve_outputs(outputs, 10 * COIN);
        assert_eq!(
            selected.iter().map(|o| o.amount).collect::<Vec<_>>(),
            vec![7 * COIN, 5 * COIN]
        );
    }

    #[test]
    fn reserve_proof_roundtrip() {
        let account = AccountBase::generate();
        let outputs: Vec<_> = [7, 5, 2]
            .iter()
            .enumerate()
            .map(|(i, c)| owned_output(&account, c * COIN, i as u32))
            .collect();
        let proof = get_reserve_proof(account.keys(), outputs.clone(), 14 * COIN, 6 * COIN, "audit").unwrap();
        assert!(proof.starts_with(RESERVE_PROOF_HEADER));

        let lookup = lookup_in(&outputs);
        assert_eq!(
            check_reserve_proof(account.address(), "audit", &proof, &lookup),
            Some(7 * COIN)
        );
        assert_eq!(check_reserve_proof(account.address(), "other", &proof, &lookup), None);
        assert_eq!(
            check_reserve_proof(AccountBase::generate().address(), "audit", &proof, &lookup),
            None
        );
        assert_eq!(check_reserve_proof(account.address(), "audit", &proof, |_, _| None), None);
    }

    #[test]
    fn repeated_reserve_entries_are_rejected() {
        let account = AccountBase::generate();
        let output = owned_output(&account, 7 * COIN, 0);
        let lookup = lookup_in(std::slice::from_ref(&output));

        let repeated = sign_reserve_proof(account.keys(), &[output.clone(), output.clone()], "audit").unwrap();
        assert_eq!(check_reserve_proof(account.address(), "audit", &repeated, &lookup), None);

        // Handing the same output in twice proves it once.
        let proof = get_reserve_proof(account.keys(), vec![output.clone(), output.clone()], 14 * COIN, 7 * COIN, "audit").unwrap();
        assert_eq!(
            check_reserve_proof(account.address(), "audit", &proof, &lookup),
            Some(7 * COIN)
        );
    }

    #[test]
    fn reserve_proof_requires_balance() {
        let account = AccountBase::generate();
        let outputs = vec![owned_output(&account, COIN, 0)];
        assert_eq!(
            get_reserve_proof(account.keys(), outputs.clone(), 0, 0, ""),
            Err(WalletError::InsufficientFunds)
        );
        assert_eq!(
            get_reserve_proof(account.keys(), outputs, COIN, 2 * COIN, ""),
            Err(WalletError::InsufficientFunds)
        );
    }
}
