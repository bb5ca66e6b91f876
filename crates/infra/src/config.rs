//! Process configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account_store::DEFAULT_NUMBER_ATTEMPTS;
use crate::cipher::AccountNumberCipher;
use crate::retry::RetryPolicy;

pub const ENV_ENCRYPTION_KEY: &str = "COREBANK_ENCRYPTION_KEY";
pub const ENV_ENCRYPTION_IV: &str = "COREBANK_ENCRYPTION_IV";
pub const ENV_INTEREST_INTERVAL_SECS: &str = "COREBANK_INTEREST_INTERVAL_SECS";
pub const ENV_OUTBOX_INTERVAL_MS: &str = "COREBANK_OUTBOX_INTERVAL_MS";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "COREBANK_MAX_CONFLICT_RETRIES";
pub const ENV_ACCOUNT_NUMBER_ATTEMPTS: &str = "COREBANK_ACCOUNT_NUMBER_ATTEMPTS";
pub const ENV_DIAGNOSTICS: &str = "COREBANK_DIAGNOSTICS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Base64 key and IV for the account number cipher.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub key: String,
    pub iv: String,
}

impl core::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("EncryptionConfig { .. }")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// `None` when the environment does not provide key material.
    pub encryption: Option<EncryptionConfig>,
    pub interest_interval: Duration,
    pub outbox_interval: Duration,
    pub max_conflict_retries: u32,
    pub account_number_attempts: u32,
    /// Expose internal error details in error bodies.
    pub diagnostics: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            encryption: None,
            interest_interval: Duration::from_secs(3600),
            outbox_interval: Duration::from_millis(500),
            max_conflict_retries: 3,
            account_number_attempts: DEFAULT_NUMBER_ATTEMPTS,
            diagnostics: false,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let key = lookup(ENV_ENCRYPTION_KEY).filter(|v| !v.trim().is_empty());
        let iv = lookup(ENV_ENCRYPTION_IV).filter(|v| !v.trim().is_empty());
        let encryption = match (key, iv) {
            (Some(key), Some(iv)) => Some(EncryptionConfig { key, iv }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(ENV_ENCRYPTION_IV)),
            (None, Some(_)) => return Err(ConfigError::Missing(ENV_ENCRYPTION_KEY)),
        };

        let interest_secs: u64 = parse_or(
            &lookup,
            ENV_INTEREST_INTERVAL_SECS,
            defaults.interest_interval.as_secs(),
        )?;
        let outbox_ms: u64 = parse_or(
            &lookup,
            ENV_OUTBOX_INTERVAL_MS,
            defaults.outbox_interval.as_millis() as u64,
        )?;
        if interest_secs == 0 {
            return Err(invalid(ENV_INTEREST_INTERVAL_SECS, "0", "must be positive"));
        }
        if outbox_ms == 0 {
            return Err(invalid(ENV_OUTBOX_INTERVAL_MS, "0", "must be positive"));
        }

        let account_number_attempts = parse_or(
            &lookup,
            ENV_ACCOUNT_NUMBER_ATTEMPTS,
            defaults.account_number_attempts,
        )?;
        if account_number_attempts == 0 {
            return Err(invalid(ENV_ACCOUNT_NUMBER_ATTEMPTS, "0", "must be positive"));
        }

        Ok(Self {
            encryption,
            interest_interval: Duration::from_secs(interest_secs),
            outbox_interval: Duration::from_millis(outbox_ms),
            max_conflict_retries: parse_or(
                &lookup,
                ENV_MAX_CONFLICT_RETRIES,
                defaults.max_conflict_retries,
            )?,
            account_number_attempts,
            diagnostics: parse_flag(&lookup, ENV_DIAGNOSTICS)?,
        })
    }

    pub fn conflict_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::conflicts(self.max_conflict_retries)
    }

    /// Cipher from the configured key material, if any.
    pub fn cipher(&self) -> Option<Result<AccountNumberCipher, corebank_core::DomainError>> {
        self.encryption
            .as_ref()
            .map(|e| AccountNumberCipher::from_base64(&e.key, &e.iv))
    }
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, e.to_string())),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<bool, ConfigError> {
    match lookup(name) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(invalid(name, &raw, "expected a boolean")),
        },
    }
}
