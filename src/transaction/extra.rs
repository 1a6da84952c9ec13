//! The transaction extra field.
//!
//! A sequence of tagged fields: the transaction public key, a nonce (which
//! may carry a payment id), encrypted messages and a TTL. Unknown tags stop
//! parsing.

use crate::account::AccountPublicAddress;
use crate::crypto::stealth::generate_key_derivation;
use crate::crypto::{CryptoError, KeyDerivation, PublicKey, SecretKey};
use crate::Hash;

pub const TX_EXTRA_TAG_PADDING: u8 = 0x00;
pub const TX_EXTRA_TAG_PUBKEY: u8 = 0x01;
pub const TX_EXTRA_NONCE: u8 = 0x02;
pub const TX_EXTRA_MESSAGE_TAG: u8 = 0x04;
pub const TX_EXTRA_TTL: u8 = 0x05;

pub const TX_EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;
pub const TX_EXTRA_NONCE_MAX_COUNT: usize = 255;
pub const TX_EXTRA_PADDING_MAX_COUNT: usize = 255;

/// Zero bytes appended to a message before encryption; a wrong key turns
/// them into garbage.
const MESSAGE_CHECKSUM_SIZE: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExtraError {
    #[error("extra field truncated")]
    Truncated,
    #[error("unknown extra tag {0:#x}")]
    UnknownTag(u8),
    #[error("padding contains non-zero bytes")]
    BadPadding,
    #[error("nonce longer than {TX_EXTRA_NONCE_MAX_COUNT} bytes")]
    NonceTooLong,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraField {
    Padding(usize),
    PublicKey(PublicKey),
    Nonce(Vec<u8>),
    Message(Vec<u8>),
    Ttl(u64),
}

pub fn parse_extra(extra: &[u8]) -> Result<Vec<ExtraField>, ExtraError> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < extra.len() {
        let tag = extra[pos];
        pos += 1;
        match tag {
            TX_EXTRA_TAG_PADDING => {
                let rest = &extra[pos..];
                if rest.len() >= TX_EXTRA_PADDING_MAX_COUNT || rest.iter().any(|b| *b != 0) {
                    return Err(ExtraError::BadPadding);
                }
                fields.push(ExtraField::Padding(rest.len() + 1));
                pos = extra.len();
            }
            TX_EXTRA_TAG_PUBKEY => {
                let bytes = extra.get(pos..pos + 32).ok_or(ExtraError::Truncated)?;
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                fields.push(ExtraField::PublicKey(PublicKey::from_bytes(key)));
                pos += 32;
            }
            TX_EXTRA_NONCE => {
                let len = *extra.get(pos).ok_or(ExtraError::Truncated)? as usize;
                pos += 1;
                let bytes = extra.get(pos..pos + len).ok_or(ExtraError::Truncated)?;
                fields.push(ExtraField::Nonce(bytes.to_vec()));
                pos += len;
            }
            TX_EXTRA_MESSAGE_TAG => {
                let (len, read) = crate::read_varint(&extra[pos..]).ok_or(ExtraError::Truncated)?;
                pos += read;
                let len = usize::try_from(len).map_err(|_| ExtraError::Truncated)?;
                let end = pos.checked_add(len).ok_or(ExtraError::Truncated)?;
                let bytes = extra.get(pos..end).ok_or(ExtraError::Truncated)?;
                fields.push(ExtraField::Message(bytes.to_vec()));
                pos = end;
            }
            TX_EXTRA_TTL => {
                let (ttl, read) = crate::read_varint(&extra[pos..]).ok_or(ExtraError::Truncated)?;
                fields.push(ExtraField::Ttl(ttl));
                pos += read;
            }
            other => return Err(ExtraError::UnknownTag(other)),
        }
    }
    Ok(fields)
}

// ── Writers ──

pub fn add_transaction_public_key(extra: &mut Vec<u8>, key: &PublicKey) {
    extra.push(TX_EXTRA_TAG_PUBKEY);
    extra.extend_from_slice(key.as_bytes());
}

pub fn add_extra_nonce(extra: &mut Vec<u8>, nonce: &[u8]) -> Result<(), ExtraError> {
    if nonce.len() > TX_EXTRA_NONCE_MAX_COUNT {
        return Err(ExtraError::NonceTooLong);
    }
    extra.push(TX_EXTRA_NONCE);
    extra.push(nonce.len() as u8);
    extra.extend_from_slice(nonce);
    Ok(())
}

pub fn add_payment_id(extra: &mut Vec<u8>, payment_id: &Hash) {
    let mut nonce = Vec::with_capacity(33);
    nonce.push(TX_EXTRA_NONCE_PAYMENT_ID);
    nonce.extend_from_slice(payment_id);
    // 33 bytes always fits in a nonce.
    let _ = add_extra_nonce(extra, &nonce);
}

pub fn add_message(extra: &mut Vec<u8>, encrypted: &[u8]) {
    extra.push(TX_EXTRA_MESSAGE_TAG);
    crate::write_varint(extra, encrypted.len() as u64);
    extra.extend_from_slice(encrypted);
}

pub fn add_ttl(extra: &mut Vec<u8>, ttl: u64) {
    extra.push(TX_EXTRA_TTL);
    crate::write_varint(extra, ttl);
}

// ── Readers ──

pub fn get_transaction_public_key(extra: &[u8]) -> Option<PublicKey> {
    let fields = parse_extra(extra).ok()?;
    fields.into_iter().find_map(|f| match f {
        ExtraField::PublicKey(key) => Some(key),
        _ => None,
    })
}

pub fn get_payment_id(extra: &[u8]) -> Option<Hash> {
    let fields = parse_extra(extra).ok()?;
    fields.into_iter().find_map(|f| match f {
        ExtraField::Nonce(nonce)
            if nonce.len() == 33 && nonce[0] == TX_EXTRA_NONCE_PAYMENT_ID =>
        {
            let mut id = [0u8; 32];
            id.copy_from_slice(&nonce[1..]);
            Some(id)
        }
        _ => None,
    })
}

pub fn get_ttl(extra: &[u8]) -> Option<u64> {
    let fields = parse_extra(extra).ok()?;
    fields.into_iter().find_map(|f| match f {
        ExtraField::Ttl(ttl) => Some(ttl),
        _ => None,
    })
}

/// Parse a 64-character hex payment id.
pub fn parse_payment_id(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Build an extra field carrying only the given hex payment id.
pub fn create_extra_with_payment_id(payment_id: &str) -> Option<Vec<u8>> {
    let id = parse_payment_id(payment_id)?;
    let mut extra = Vec::with_capacity(35);
    add_payment_id(&mut extra, &id);
    Some(extra)
}

// ── Messages ──

fn message_keystream(derivation: &KeyDerivation, index: usize, data: &[u8]) -> Vec<u8> {
    let mut key_input = Vec::with_capacity(32 + 10);
    key_input.extend_from_slice(derivation.as_bytes());
    crate::write_varint(&mut key_input, index as u64);
    let key = crate::hash_domain("halo.tx.message.key", &key_input);

    let mut result = Vec::with_capacity(data.len());
    for (block_idx, chunk) in data.chunks(32).enumerate() {
        let mut block_input = Vec::with_capacity(32 + 8);
        block_input.extend_from_slice(&key);
        block_input.extend_from_slice(&(block_idx as u64).to_le_bytes());
        let block = crate::hash_domain("halo.tx.message.stream", &block_input);
        result.extend(chunk.iter().zip(block.iter()).map(|(d, k)| d ^ k));
    }
    result
}

/// Encrypt message number `index` of a transaction for `recipient`.
pub fn encrypt_message(
    text: &str,
    index: usize,
    recipient: &AccountPublicAddress,
    tx_secret_key: &SecretKey,
) -> Result<Vec<u8>, CryptoError> {
    let derivation = generate_key_derivation(&recipient.view_public_key, tx_secret_key)?;
    let mut plain = Vec::with_capacity(text.len() + MESSAGE_CHECKSUM_SIZE);
    plain.extend_from_slice(text.as_bytes());
    plain.extend_from_slice(&[0u8; MESSAGE_CHECKSUM_SIZE]);
    Ok(message_keystream(&derivation, index, &plain))
}

/// Decrypt a message addressed to the holder of `view_secret_key`.
pub fn decrypt_message(
    data: &[u8],
    index: usize,
    tx_public_key: &PublicKey,
    view_secret_key: &SecretKey,
) -> Option<String> {
    if data.len() < MESSAGE_CHECKSUM_SIZE {
        return None;
    }
    let derivation = generate_key_derivation(tx_public_key, view_secret_key).ok()?;
    let mut plain = message_keystream(&derivation, index, data);
    let checksum = plain.split_off(plain.len() - MESSAGE_CHECKSUM_SIZE);
    if checksum.iter().any(|b| *b != 0) {
        return None;
    }
    String::from_utf8(plain).ok()
}

/// All messages in `extra` that decrypt with `view_secret_key`.
pub fn get_messages_from_extra(
    extra: &[u8],
    tx_public_key: &PublicKey,
    view_secret_key: &SecretKey,
) -> Vec<String> {
    let Ok(fields) = parse_extra(extra) else {
        return Vec::new();
    };
    fields
        .into_iter()
        .filter_map(|f| match f {
            ExtraField::Message(data) => Some(data),
            _ => None,
        })
        .enumerate()
        .filter_map(|(i, data)| decrypt_message(&data, i, tx_public_key, view_secret_key))
        .collect()
}
