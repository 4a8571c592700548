//! Typed settings for Tally components, loaded from an optional TOML file
//! with `TALLY_`-prefixed environment overrides on top of compiled defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;

const DEFAULT_SETTINGS: &str = r#"
[database]
path = "tally.db"

[ledger]
account_prefix = "ACC"
currency = "USD"
lock_timeout_ms = 5000
large_deposit_threshold = "10000"
low_balance_threshold = "100"
default_overdraft = "0"
savings_interest_rate = "0.025"
business_interest_rate = "0.015"
daily_withdrawal_cap = "2000"
daily_transfer_cap = "5000"
single_transaction_cap = "10000"
"#;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ledger: LedgerSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LedgerSettings {
    pub account_prefix: String,
    pub currency: String,
    pub lock_timeout_ms: u64,
    pub large_deposit_threshold: Decimal,
    pub low_balance_threshold: Decimal,
    pub default_overdraft: Decimal,
    pub savings_interest_rate: Decimal,
    pub business_interest_rate: Decimal,
    pub daily_withdrawal_cap: Decimal,
    pub daily_transfer_cap: Decimal,
    pub single_transaction_cap: Decimal,
}

impl Settings {
    /// Compiled-in defaults, file and environment ignored.
    pub fn defaults() -> Self {
        Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize)
            .expect("compiled default settings must parse")
    }

    /// Layer an optional settings file and `TALLY_` environment variables
    /// over the defaults. A missing file path is an error; a `None` path
    /// just means "defaults plus environment".
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_SETTINGS, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("TALLY").separator("__"));
        builder
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")
    }
}
