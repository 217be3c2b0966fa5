use std::{env, time::Duration};

use thiserror::Error;

use crate::money::Currency;

pub const LOCK_TIMEOUT_VAR: &str = "LEDGER_LOCK_TIMEOUT_MS";
pub const DEFAULT_CURRENCY_VAR: &str = "LEDGER_DEFAULT_CURRENCY";
pub const LOG_FILTER_VAR: &str = "LEDGER_LOG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value `{value}` for environment variable {name}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound for waiting on an account lock, `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Currency of rows that don't name one.
    pub default_currency: Currency,
    /// `tracing_subscriber::EnvFilter` directives.
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            default_currency: Currency::USD,
            log_filter: "warn".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads every setting through `lookup`; unset or blank values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get(LOCK_TIMEOUT_VAR) {
            let millis: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: LOCK_TIMEOUT_VAR,
                value: value.clone(),
            })?;
            // 0 disables the bound
            config.lock_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }
        if let Some(value) = get(DEFAULT_CURRENCY_VAR) {
            config.default_currency = value.parse().map_err(|_| ConfigError::InvalidValue {
                name: DEFAULT_CURRENCY_VAR,
                value: value.clone(),
            })?;
        }
        if let Some(value) = get(LOG_FILTER_VAR) {
            config.log_filter = value;
        }
        Ok(config)
    }
}
