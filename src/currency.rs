//! Currency rules: fees, dust, mixin bounds, deposit terms and interest,
//! amount and address formatting.
//!
//! Every parameter is a field so that tests and alternative networks can
//! override it (see [`crate::config::CurrencyConfig`]).

use serde::{Deserialize, Serialize};

use crate::account::AccountPublicAddress;
use crate::constants;
use crate::crypto::keys::check_key;
use crate::crypto::PublicKey;
use crate::transaction::{Transaction, TransactionInput};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("base58 decoding failed")]
    Base58,
    #[error("address prefix {found:#x} does not match {expected:#x}")]
    WrongPrefix { expected: u64, found: u64 },
    #[error("address has wrong length")]
    Length,
    #[error("address contains an invalid key")]
    InvalidKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub name: String,
    pub ticker: String,
    pub coin: u64,
    pub decimal_places: usize,
    pub address_prefix: u64,
    pub minimum_fee: u64,
    pub default_dust_threshold: u64,
    pub min_mixin: u64,
    pub max_mixin: u64,
    pub difficulty_target: u64,
    pub deposit_min_amount: u64,
    pub deposit_min_term: u32,
    pub deposit_max_term: u32,
    pub deposit_min_total_rate_factor: u64,
    pub deposit_max_total_rate: u64,
    pub mempool_tx_live_time: u64,
    pub max_transaction_size: usize,
}

impl Default for Currency {
    fn default() -> Self {
        Currency {
            name: constants::CRYPTONOTE_NAME.into(),
            ticker: constants::CRYPTONOTE_TICKER.into(),
            coin: constants::COIN,
            decimal_places: constants::DISPLAY_DECIMAL_POINT,
            address_prefix: constants::PUBLIC_ADDRESS_BASE58_PREFIX,
            minimum_fee: constants::MINIMUM_FEE,
            default_dust_threshold: constants::DEFAULT_DUST_THRESHOLD,
            min_mixin: constants::MIN_TX_MIXIN_SIZE,
            max_mixin: constants::MAX_TX_MIXIN_SIZE,
            difficulty_target: constants::DIFFICULTY_TARGET,
            deposit_min_amount: constants::DEPOSIT_MIN_AMOUNT,
            deposit_min_term: constants::DEPOSIT_MIN_TERM,
            deposit_max_term: constants::DEPOSIT_MAX_TERM,
            deposit_min_total_rate_factor: constants::DEPOSIT_MIN_TOTAL_RATE_FACTOR,
            deposit_max_total_rate: constants::DEPOSIT_MAX_TOTAL_RATE,
            mempool_tx_live_time: constants::MEMPOOL_TX_LIVETIME,
            max_transaction_size: constants::MAX_TRANSACTION_SIZE,
        }
    }
}

impl Currency {
    // ── Deposits ──

    /// Interest earned by `amount` locked for `term` blocks.
    ///
    /// `amount * (term * max_rate - min_rate_factor) / (100 * max_term)`,
    /// evaluated in 128 bits. Terms outside the allowed range earn nothing.
    pub fn calculate_interest(&self, amount: u64, term: u32) -> u64 {
        if !self.is_valid_deposit_term(term) {
            return 0;
        }
        let a = (term as u128 * self.deposit_max_total_rate as u128)
            .saturating_sub(self.deposit_min_total_rate_factor as u128);
        let b = 100u128 * self.deposit_max_term as u128;
        let interest = amount as u128 * a / b;
        u64::try_from(interest).unwrap_or(u64::MAX)
    }

    /// Interest paid out by the deposit withdrawals among `tx`'s inputs.
    pub fn calculate_total_transaction_interest(&self, tx: &Transaction) -> u64 {
        tx.prefix
            .inputs
            .iter()
            .filter_map(|input| match input {
                TransactionInput::Multisignature(m) if m.term > 0 => {
                    Some(self.calculate_interest(m.amount, m.term))
                }
                _ => None,
            })
            .fold(0u64, u64::saturating_add)
    }

    pub fn is_valid_deposit_term(&self, term: u32) -> bool {
        term >= self.deposit_min_term && term <= self.deposit_max_term
    }

    /// Deposit term for a number of days, in blocks.
    pub fn blocks_for_days(&self, days: u32) -> u32 {
        let per_day = (24 * 60 * 60 / self.difficulty_target.max(1)) as u32;
        days.saturating_mul(per_day)
    }

    pub fn is_valid_mixin(&self, mixin: u64) -> bool {
        !(mixin < self.min_mixin && mixin != 0) && mixin <= self.max_mixin
    }

    // ── Amounts ──

    /// Format atomic units as a decimal string, e.g. `699000000` → `"6.99000000"`.
    pub fn format_amount(&self, amount: u64) -> String {
        let divisor = 10u64.pow(self.decimal_places as u32);
        format!(
            "{}.{:0width$}",
            amount / divisor,
            amount % divisor,
            width = self.decimal_places
        )
    }

    pub fn format_signed_amount(&self, amount: i64) -> String {
        let sign = if amount < 0 { "-" } else { "" };
        format!("{}{}", sign, self.format_amount(amount.unsigned_abs()))
    }

    /// Parse a decimal string into atomic units. Rejects more fractional
    /// digits than the currency supports and values that overflow.
    pub fn parse_amount(&self, s: &str) -> Option<u64> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f.trim_end_matches('0')),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if frac.len() > self.decimal_places
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut frac_value: u64 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
        frac_value *= 10u64.pow((self.decimal_places - frac.len()) as u32);
        whole
            .checked_mul(10u64.pow(self.decimal_places as u32))?
            .checked_add(frac_value)
    }

    // ── Addresses ──

    pub fn account_address_as_string(&self, address: &AccountPublicAddress) -> String {
        let mut data = Vec::with_capacity(10 + 64);
        crate::write_varint(&mut data, self.address_prefix);
        data.extend_from_slice(&address.to_bytes());
        // Encoding only fails on internal size errors that cannot happen for
        // a fixed-size payload.
        base58_monero::encode_check(&data).unwrap_or_default()
    }

    pub fn parse_account_address_string(
        &self,
        s: &str,
    ) -> Result<AccountPublicAddress, AddressError> {
        let data = base58_monero::decode_check(s).map_err(|_| AddressError::Base58)?;
        let (prefix, read) = crate::read_varint(&data).ok_or(AddressError::Length)?;
        if prefix != self.address_prefix {
            return Err(AddressError::WrongPrefix {
                expected: self.address_prefix,
                found: prefix,
            });
        }
        let keys = &data[read..];
        if keys.len() != 64 {
            return Err(AddressError::Length);
        }
        let mut spend = [0u8; 32];
        let mut view = [0u8; 32];
        spend.copy_from_slice(&keys[..32]);
        view.copy_from_slice(&keys[32..]);
        let address = AccountPublicAddress {
            spend_public_key: PublicKey::from_bytes(spend),
            view_public_key: PublicKey::from_bytes(view),
        };
        if !check_key(&address.spend_public_key) || !check_key(&address.view_public_key) {
            return Err(AddressError::InvalidKey);
        }
        Ok(address)
    }
}

/// Split `amount` into single-digit denominations (`8450` → `8000, 400, 50`).
///
/// Low-order digits are accumulated as dust while the running total stays
/// at or below `dust_threshold`; the accumulated dust is returned separately.
/// `chunks` and `dust` always sum to `amount`.
pub fn decompose_amount(amount: u64, dust_threshold: u64) -> (Vec<u64>, u64) {
    let mut chunks = Vec::new();
    let mut dust = 0u64;
    let mut dust_handled = false;
    let mut remaining = amount;
    let mut order = 1u64;
    let mut emitted_dust = 0u64;
    while remaining != 0 {
        let chunk = (remaining % 10) * order;
        remaining /= 10;
        order = order.saturating_mul(10);
        if !dust_handled && dust + chunk <= dust_threshold {
            dust += chunk;
        } else {
            if !dust_handled && dust != 0 {
                emitted_dust = dust;
            }
            dust_handled = true;
            if chunk != 0 {
                chunks.push(chunk);
            }
        }
    }
    if !dust_handled {
        emitted_dust = dust;
    }
    (chunks, emitted_dust)
}
