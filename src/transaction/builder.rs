//! Transaction builder for constructing signed Halo transactions.
//!
//! Usage:
//! ```ignore
//! let (tx, tx_key) = TransactionBuilder::new(&keys)
//!     .add_key_input(source)
//!     .add_output(recipient, amount)
//!     .add_message(recipient, "hello from halo")
//!     .build()?;
//! ```
//!
//! Key inputs are signed with a ring signature over the decoys plus the real
//! output. Multisignature inputs (deposit withdrawals) carry one plain
//! signature per required key. Every output key is a one-time key derived
//! from a fresh transaction key `r`: `P = Hs(r*A || i)*G + B`.

use crate::account::{AccountKeys, AccountPublicAddress};
use crate::constants::{CURRENT_TRANSACTION_VERSION, MAX_MESSAGES_PER_TX, MAX_MESSAGE_SIZE};
use crate::crypto::signature::{generate_ring_signature, generate_signature};
use crate::crypto::stealth::{derive_public_key, generate_key_derivation};
use crate::crypto::{CryptoError, KeyPair, PublicKey, SecretKey, Signature};
use crate::transaction::{
    absolute_to_relative_offsets, extra, KeyInput, MultisignatureInput, Transaction,
    TransactionInput, TransactionOutput, TransactionOutputTarget, TransactionPrefix,
};

/// A key output to spend together with its ring of decoys.
#[derive(Clone, Debug)]
pub struct TransactionSourceEntry {
    /// Ring members as `(global index, output key)`, sorted by index.
    pub outputs: Vec<(u32, PublicKey)>,
    /// Position of the real output inside `outputs`.
    pub real_output: usize,
    pub real_transaction_public_key: PublicKey,
    pub real_output_in_transaction: usize,
    pub amount: u64,
}

/// A multisignature (deposit) output to spend.
#[derive(Clone, Debug)]
pub struct MultisignatureSourceEntry {
    pub amount: u64,
    /// Interest earned by the deposit, spendable on top of `amount`.
    pub interest: u64,
    pub global_output_index: u32,
    pub term: u32,
    pub required_signatures: u8,
    pub transaction_public_key: PublicKey,
    pub output_in_transaction: usize,
}

#[derive(Clone, Debug)]
pub struct TransactionDestinationEntry {
    pub amount: u64,
    pub address: AccountPublicAddress,
}

#[derive(Clone, Debug)]
enum OutputSpec {
    Key(TransactionDestinationEntry),
    Deposit {
        destination: TransactionDestinationEntry,
        term: u32,
    },
}

impl OutputSpec {
    fn destination(&self) -> &TransactionDestinationEntry {
        match self {
            OutputSpec::Key(d) => d,
            OutputSpec::Deposit { destination, .. } => destination,
        }
    }
}

struct MessageSpec {
    text: String,
    recipient: AccountPublicAddress,
}

/// Builder for constructing transactions.
pub struct TransactionBuilder<'a> {
    sender: &'a AccountKeys,
    key_inputs: Vec<TransactionSourceEntry>,
    multisig_inputs: Vec<MultisignatureSourceEntry>,
    outputs: Vec<OutputSpec>,
    messages: Vec<MessageSpec>,
    extra: Vec<u8>,
    ttl: Option<u64>,
    unlock_time: u64,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(sender: &'a AccountKeys) -> Self {
        TransactionBuilder {
            sender,
            key_inputs: Vec::new(),
            multisig_inputs: Vec::new(),
            outputs: Vec::new(),
            messages: Vec::new(),
            extra: Vec::new(),
            ttl: None,
            unlock_time: 0,
        }
    }

    pub fn add_key_input(mut self, source: TransactionSourceEntry) -> Self {
        self.key_inputs.push(source);
        self
    }

    pub fn add_multisignature_input(mut self, source: MultisignatureSourceEntry) -> Self {
        self.multisig_inputs.push(source);
        self
    }

    pub fn add_output(mut self, address: AccountPublicAddress, amount: u64) -> Self {
        self.outputs
            .push(OutputSpec::Key(TransactionDestinationEntry { amount, address }));
        self
    }

    /// A deposit: a single-key multisignature output locked for `term` blocks.
    pub fn add_deposit_output(mut self, address: AccountPublicAddress, amount: u64, term: u32) -> Self {
        self.outputs.push(OutputSpec::Deposit {
            destination: TransactionDestinationEntry { amount, address },
            term,
        });
        self
    }

    /// Raw extra bytes (payment id nonce or user data) placed after the
    /// transaction public key.
    pub fn set_extra(mut self, extra: Vec<u8>) -> Self {
        self.extra = extra;
        self
    }

    /// Attach a message readable only by `recipient`.
    pub fn add_message(mut self, recipient: AccountPublicAddress, text: impl Into<String>) -> Self {
        self.messages.push(MessageSpec {
            text: text.into(),
            recipient,
        });
        self
    }

    /// Absolute expiry time for the mempool.
    pub fn set_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn set_unlock_time(mut self, unlock_time: u64) -> Self {
        self.unlock_time = unlock_time;
        self
    }

    /// Build and sign the transaction. Returns it with its secret key `r`.
    pub fn build(self) -> Result<(Transaction, SecretKey), TxBuildError> {
        if self.key_inputs.is_empty() && self.multisig_inputs.is_empty() {
            return Err(TxBuildError::NoInputs);
        }
        if !self.key_inputs.is_empty() && !self.multisig_inputs.is_empty() {
            return Err(TxBuildError::MixedInputTypes);
        }
        if self.messages.len() > MAX_MESSAGES_PER_TX {
            return Err(TxBuildError::TooManyMessages);
        }
        if self.messages.iter().any(|m| m.text.len() > MAX_MESSAGE_SIZE) {
            return Err(TxBuildError::MessageTooLong);
        }

        let input_sum = self
            .key_inputs
            .iter()
            .map(|s| Some(s.amount))
            .chain(self.multisig_inputs.iter().map(|s| s.amount.checked_add(s.interest)))
            .try_fold(0u64, |acc, a| acc.checked_add(a?))
            .ok_or(TxBuildError::AmountOverflow)?;
        let output_sum = self
            .outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.destination().amount))
            .ok_or(TxBuildError::AmountOverflow)?;
        if output_sum > input_sum {
            return Err(TxBuildError::OutputsExceedInputs {
                inputs: input_sum,
                outputs: output_sum,
            });
        }

        let tx_key = KeyPair::generate();

        // Extra: public key first, then caller data, messages and TTL.
        let mut tx_extra = Vec::with_capacity(33 + self.extra.len());
        extra::add_transaction_public_key(&mut tx_extra, &tx_key.public);
        tx_extra.extend_from_slice(&self.extra);
        for (i, message) in self.messages.iter().enumerate() {
            let encrypted = extra::encrypt_message(&message.text, i, &message.recipient, &tx_key.secret)?;
            extra::add_message(&mut tx_extra, &encrypted);
        }
        if let Some(ttl) = self.ttl {
            extra::add_ttl(&mut tx_extra, ttl);
        }

        // Inputs, remembering what each one needs for signing.
        let mut inputs = Vec::with_capacity(self.key_inputs.len() + self.multisig_inputs.len());
        let mut signers = Vec::with_capacity(inputs.capacity());
        for source in &self.key_inputs {
            let real = source
                .outputs
                .get(source.real_output)
                .ok_or(TxBuildError::InvalidRing)?;
            let (ephemeral, image) = self.sender.derive_ephemeral(
                &source.real_transaction_public_key,
                source.real_output_in_transaction,
            )?;
            if ephemeral.public != real.1 {
                return Err(TxBuildError::DerivedKeyMismatch);
            }
            let absolute: Vec<u32> = source.outputs.iter().map(|(index, _)| *index).collect();
            inputs.push(TransactionInput::Key(KeyInput {
                amount: source.amount,
                output_indexes: absolute_to_relative_offsets(&absolute),
                key_image: image,
            }));
            signers.push(Signer::Ring {
                ring: source.outputs.iter().map(|(_, key)| *key).collect(),
                index: source.real_output,
                image,
                secret: ephemeral.secret,
            });
        }
        for source in &self.multisig_inputs {
            if source.required_signatures != 1 {
                return Err(TxBuildError::UnsupportedMultisignature(source.required_signatures));
            }
            let (ephemeral, _) = self
                .sender
                .derive_ephemeral(&source.transaction_public_key, source.output_in_transaction)?;
            inputs.push(TransactionInput::Multisignature(MultisignatureInput {
                amount: source.amount,
                signature_count: source.required_signatures,
                output_index: source.global_output_index,
                term: source.term,
            }));
            signers.push(Signer::Single(ephemeral));
        }

        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (index, spec) in self.outputs.iter().enumerate() {
            let destination = spec.destination();
            let derivation =
                generate_key_derivation(&destination.address.view_public_key, &tx_key.secret)?;
            let key = derive_public_key(&derivation, index, &destination.address.spend_public_key)?;
            let target = match spec {
                OutputSpec::Key(_) => TransactionOutputTarget::Key(key),
                OutputSpec::Deposit { term, .. } => TransactionOutputTarget::Multisignature {
                    keys: vec![key],
                    required_signature_count: 1,
                    term: *term,
                },
            };
            outputs.push(TransactionOutput {
                amount: destination.amount,
                target,
            });
        }

        let prefix = TransactionPrefix {
            version: CURRENT_TRANSACTION_VERSION,
            unlock_time: self.unlock_time,
            inputs,
            outputs,
            extra: tx_extra,
        };
        let prefix_hash = prefix.hash();

        let mut signatures = Vec::with_capacity(signers.len());
        for signer in signers {
            signatures.push(signer.sign(&prefix_hash)?);
        }

        Ok((Transaction { prefix, signatures }, tx_key.secret))
    }
}

enum Signer {
    Ring {
        ring: Vec<PublicKey>,
        index: usize,
        image: crate::crypto::KeyImage,
        secret: SecretKey,
    },
    Single(KeyPair),
}

impl Signer {
    fn sign(self, prefix_hash: &crate::Hash) -> Result<Vec<Signature>, CryptoError> {
        match self {
            Signer::Ring {
                ring,
                index,
                image,
                secret,
            } => generate_ring_signature(prefix_hash, &image, &ring, &secret, index),
            Signer::Single(pair) => Ok(vec![generate_signature(prefix_hash, &pair.public, &pair.secret)]),
        }
    }
}

/// Errors during transaction building.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TxBuildError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("key and multisignature inputs cannot be mixed")]
    MixedInputTypes,
    #[error("derived output key does not match the real ring member")]
    DerivedKeyMismatch,
    #[error("real output index is outside the ring")]
    InvalidRing,
    #[error("outputs {outputs} exceed inputs {inputs}")]
    OutputsExceedInputs { inputs: u64, outputs: u64 },
    #[error("arithmetic overflow in amount calculation")]
    AmountOverflow,
    #[error("{0}-of-n multisignature inputs are not supported")]
    UnsupportedMultisignature(u8),
    #[error("message longer than {MAX_MESSAGE_SIZE} bytes")]
    MessageTooLong,
    #[error("too many messages (max {MAX_MESSAGES_PER_TX})")]
    TooManyMessages,
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
