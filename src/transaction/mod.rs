//! Transaction wire model.
//!
//! A transaction is a prefix (inputs, outputs, unlock time, extra field)
//! plus one signature list per input. Key inputs spend a ring of key outputs
//! referenced by relative global indexes; multisignature inputs spend a
//! single multisignature output, which is how deposits are created and
//! withdrawn.

pub mod builder;
pub mod extra;

use serde::{Deserialize, Serialize};

use crate::crypto::{KeyImage, PublicKey, Signature};
use crate::Hash;

const TAG_KEY: u8 = 0x02;
const TAG_MULTISIGNATURE: u8 = 0x03;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub amount: u64,
    /// Ring members as relative global output indexes.
    pub output_indexes: Vec<u32>,
    pub key_image: KeyImage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisignatureInput {
    pub amount: u64,
    pub signature_count: u8,
    pub output_index: u32,
    pub term: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionInput {
    Key(KeyInput),
    Multisignature(MultisignatureInput),
}

impl TransactionInput {
    pub fn amount(&self) -> u64 {
        match self {
            TransactionInput::Key(input) => input.amount,
            TransactionInput::Multisignature(input) => input.amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutputTarget {
    Key(PublicKey),
    Multisignature {
        keys: Vec<PublicKey>,
        required_signature_count: u8,
        /// Lock period in blocks; zero for a plain multisignature output.
        term: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub amount: u64,
    pub target: TransactionOutputTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPrefix {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub extra: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub prefix: TransactionPrefix,
    pub signatures: Vec<Vec<Signature>>,
}

impl TransactionPrefix {
    fn write(&self, out: &mut Vec<u8>) {
        crate::write_varint(out, self.version as u64);
        crate::write_varint(out, self.unlock_time);
        crate::write_varint(out, self.inputs.len() as u64);
        for input in &self.inputs {
            match input {
                TransactionInput::Key(key) => {
                    out.push(TAG_KEY);
                    crate::write_varint(out, key.amount);
                    crate::write_varint(out, key.output_indexes.len() as u64);
                    for index in &key.output_indexes {
                        crate::write_varint(out, *index as u64);
                    }
                    out.extend_from_slice(key.key_image.as_bytes());
                }
                TransactionInput::Multisignature(multisig) => {
                    out.push(TAG_MULTISIGNATURE);
                    crate::write_varint(out, multisig.amount);
                    crate::write_varint(out, multisig.signature_count as u64);
                    crate::write_varint(out, multisig.output_index as u64);
                    crate::write_varint(out, multisig.term as u64);
                }
            }
        }
        crate::write_varint(out, self.outputs.len() as u64);
        for output in &self.outputs {
            crate::write_varint(out, output.amount);
            match &output.target {
                TransactionOutputTarget::Key(key) => {
                    out.push(TAG_KEY);
                    out.extend_from_slice(key.as_bytes());
                }
                TransactionOutputTarget::Multisignature {
                    keys,
                    required_signature_count,
                    term,
                } => {
                    out.push(TAG_MULTISIGNATURE);
                    crate::write_varint(out, keys.len() as u64);
                    for key in keys {
                        out.extend_from_slice(key.as_bytes());
                    }
                    crate::write_varint(out, *required_signature_count as u64);
                    crate::write_varint(out, *term as u64);
                }
            }
        }
        crate::write_varint(out, self.extra.len() as u64);
        out.extend_from_slice(&self.extra);
    }

    /// Hash signed by every input signature.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.write(&mut buf);
        crate::cn_fast_hash(&buf)
    }
}

impl Transaction {
    /// Binary blob relayed to the network.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.prefix.write(&mut out);
        for signatures in &self.signatures {
            for sig in signatures {
                out.extend_from_slice(&sig.to_bytes());
            }
        }
        out
    }

    pub fn hash(&self) -> Hash {
        crate::cn_fast_hash(&self.to_blob())
    }

    pub fn prefix_hash(&self) -> Hash {
        self.prefix.hash()
    }

    pub fn size(&self) -> usize {
        self.to_blob().len()
    }

    /// Sum of input amounts, `None` on overflow.
    pub fn input_amount(&self) -> Option<u64> {
        self.prefix
            .inputs
            .iter()
            .try_fold(0u64, |acc, input| acc.checked_add(input.amount()))
    }

    /// Sum of output amounts, `None` on overflow.
    pub fn output_amount(&self) -> Option<u64> {
        self.prefix
            .outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    /// Transaction public key `R` from the extra field.
    pub fn public_key(&self) -> Option<PublicKey> {
        extra::get_transaction_public_key(&self.prefix.extra)
    }
}

/// Convert sorted absolute global indexes into the relative form stored in
/// key inputs.
pub fn absolute_to_relative_offsets(absolute: &[u32]) -> Vec<u32> {
    let mut result = Vec::with_capacity(absolute.len());
    let mut previous = 0u32;
    for (i, index) in absolute.iter().enumerate() {
        result.push(if i == 0 { *index } else { index.saturating_sub(previous) });
        previous = *index;
    }
    result
}

pub fn relative_to_absolute_offsets(relative: &[u32]) -> Vec<u32> {
    let mut result = Vec::with_capacity(relative.len());
    let mut acc = 0u32;
    for offset in relative {
        acc = acc.saturating_add(*offset);
        result.push(acc);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn sample_tx() -> Transaction {
        Transaction {
            prefix: TransactionPrefix {
                version: 1,
                unlock_time: 0,
                inputs: vec![TransactionInput::Key(KeyInput {
                    amount: 500,
                    output_indexes: vec![3, 4, 10],
                    key_image: KeyImage::default(),
                })],
                outputs: vec![TransactionOutput {
                    amount: 400,
                    target: TransactionOutputTarget::Key(KeyPair::generate().public),
                }],
                extra: vec![],
            },
            signatures: vec![vec![Signature::default(); 3]],
        }
    }

    #[test]
    fn offsets_convert_both_ways() {
        let absolute = vec![3, 7, 20, 21];
        let relative = absolute_to_relative_offsets(&absolute);
        assert_eq!(relative, vec![3, 4, 13, 1]);
        assert_eq!(relative_to_absolute_offsets(&relative), absolute);
    }

    #[test]
    fn hash_covers_signatures_but_prefix_hash_does_not() {
        let tx = sample_tx();
        let mut signed = tx.clone();
        signed.signatures[0][1] = Signature::from_slice(&[1u8; 64]).unwrap();
        assert_eq!(tx.prefix_hash(), signed.prefix_hash());
        assert_ne!(tx.hash(), signed.hash());
    }

    #[test]
    fn amounts_and_size() {
        let tx = sample_tx();
        assert_eq!(tx.input_amount(), Some(500));
        assert_eq!(tx.output_amount(), Some(400));
        assert_eq!(tx.size(), tx.to_blob().len());
        assert!(tx.size() > 3 * 64);
    }

    #[test]
    fn amount_sum_overflow_is_detected() {
        let mut tx = sample_tx();
        tx.prefix.outputs.push(TransactionOutput {
            amount: u64::MAX,
            target: TransactionOutputTarget::Key(PublicKey::default()),
        });
        assert_eq!(tx.output_amount(), None);
    }
}
