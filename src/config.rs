//! Configuration file support for the wallet.
//!
//! Loads optional `halo-wallet.toml` from the data directory. Keys that are
//! missing keep their defaults; if no config file exists, defaults are used.

use serde::Deserialize;
use std::path::Path;

use crate::constants;
use crate::currency::Currency;

/// Name of the config file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "halo-wallet.toml";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub currency: CurrencyConfig,
    pub wallet: WalletSettings,
}

/// Currency parameter overrides.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub address_prefix: u64,
    pub minimum_fee: u64,
    pub default_dust_threshold: u64,
    pub min_mixin: u64,
    pub max_mixin: u64,
    pub mempool_tx_live_time: u64,
    pub deposit_min_amount: u64,
    pub deposit_min_term: u32,
    pub deposit_max_term: u32,
    pub max_transaction_size: usize,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig {
            address_prefix: constants::PUBLIC_ADDRESS_BASE58_PREFIX,
            minimum_fee: constants::MINIMUM_FEE,
            default_dust_threshold: constants::DEFAULT_DUST_THRESHOLD,
            min_mixin: constants::MIN_TX_MIXIN_SIZE,
            max_mixin: constants::MAX_TX_MIXIN_SIZE,
            mempool_tx_live_time: constants::MEMPOOL_TX_LIVETIME,
            deposit_min_amount: constants::DEPOSIT_MIN_AMOUNT,
            deposit_min_term: constants::DEPOSIT_MIN_TERM,
            deposit_max_term: constants::DEPOSIT_MAX_TERM,
            max_transaction_size: constants::MAX_TRANSACTION_SIZE,
        }
    }
}

/// Wallet behaviour section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    /// Send change below the dust threshold to the fee instead of emitting
    /// it as an output.
    pub dust_to_fee: bool,
    pub default_mixin: u64,
    pub save_detailed: bool,
    pub save_cache: bool,
}

impl Default for WalletSettings {
    fn default() -> Self {
        WalletSettings {
            dust_to_fee: false,
            default_mixin: constants::MIN_TX_MIXIN_SIZE,
            save_detailed: true,
            save_cache: true,
        }
    }
}

impl WalletConfig {
    /// Load configuration from `halo-wallet.toml` in the given directory.
    /// Returns `Default` if the file doesn't exist or fails to parse.
    pub fn load(data_dir: &Path) -> Self {
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}, using defaults",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Currency rules with this file's overrides applied.
    pub fn currency(&self) -> Currency {
        let c = &self.currency;
        Currency {
            address_prefix: c.address_prefix,
            minimum_fee: c.minimum_fee,
            default_dust_threshold: c.default_dust_threshold,
            min_mixin: c.min_mixin,
            max_mixin: c.max_mixin,
            mempool_tx_live_time: c.mempool_tx_live_time,
            deposit_min_amount: c.deposit_min_amount,
            deposit_min_term: c.deposit_min_term,
            deposit_max_term: c.deposit_max_term,
            max_transaction_size: c.max_transaction_size,
            ..Currency::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_currency_defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.currency(), Currency::default());
        assert!(!config.wallet.dust_to_fee);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[currency]
min_mixin = 2
mempool_tx_live_time = 600

[wallet]
dust_to_fee = true
default_mixin = 5
"#;
        let config: WalletConfig = toml::from_str(toml_str).unwrap();
        let currency = config.currency();
        assert_eq!(currency.min_mixin, 2);
        assert_eq!(currency.max_mixin, constants::MAX_TX_MIXIN_SIZE);
        assert_eq!(currency.mempool_tx_live_time, 600);
        assert!(config.wallet.dust_to_fee);
        assert_eq!(config.wallet.default_mixin, 5);
        assert!(config.wallet.save_cache);
    }

    #[test]
    fn missing_config_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalletConfig::load(dir.path());
        assert_eq!(config.currency.minimum_fee, constants::MINIMUM_FEE);
    }

    #[test]
    fn malformed_config_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[currency\nmin_mixin = ").unwrap();
        let config = WalletConfig::load(dir.path());
        assert_eq!(config.currency.min_mixin, constants::MIN_TX_MIXIN_SIZE);
    }

    #[test]
    fn config_file_is_read_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[wallet]\nsave_detailed = false\n",
        )
        .unwrap();
        let config = WalletConfig::load(dir.path());
        assert!(!config.wallet.save_detailed);
    }
}
