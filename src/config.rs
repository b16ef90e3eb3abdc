// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup and passed explicitly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HEDERA_NETWORK` | `testnet`, `mainnet` or `previewnet` | `testnet` |
//! | `HEDERA_OPERATOR_ID` | Operator account (`shard.realm.num`) | Required for ledger commands |
//! | `HEDERA_OPERATOR_KEY` | Operator ECDSA private key | Required for ledger commands |
//! | `FIT_TOKEN_ID` | FIT token id | Required for ledger commands |
//! | `FIT_TREASURY_ID` | Treasury account holding the supply key | Operator account |
//! | `HEDERA_RPC_URL` | JSON-RPC relay override | Network default |
//! | `HEDERA_MIRROR_URL` | Mirror node override | Network default |
//! | `FITCHAIN_DB_PATH` | redb database file | `data/fitchain.redb` |
//! | `LEDGER_TIMEOUT_SECS` | Timeout for a single ledger call | `20` |
//! | `LEDGER_RETRY_ATTEMPTS` | Attempts for transient failures | `3` |
//! | `LEDGER_RETRY_BASE_MS` | First backoff delay | `500` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::ledger::{network_by_key, AccountId, NetworkConfig, RetryPolicy, TokenId};

/// Environment variable name for the Hedera network.
///
/// # Default
/// `testnet`
pub const HEDERA_NETWORK_ENV: &str = "HEDERA_NETWORK";

/// Environment variable name for the operator account id.
pub const HEDERA_OPERATOR_ID_ENV: &str = "HEDERA_OPERATOR_ID";

/// Environment variable name for the operator private key.
///
/// Accepts raw hex, Hedera ECDSA DER hex or PEM. Never logged.
pub const HEDERA_OPERATOR_KEY_ENV: &str = "HEDERA_OPERATOR_KEY";

/// Environment variable name for the FIT token id.
pub const FIT_TOKEN_ID_ENV: &str = "FIT_TOKEN_ID";

/// Environment variable name for the treasury account.
///
/// # Default
/// The operator account
pub const FIT_TREASURY_ID_ENV: &str = "FIT_TREASURY_ID";

/// Environment variable name for the JSON-RPC relay URL override.
pub const HEDERA_RPC_URL_ENV: &str = "HEDERA_RPC_URL";

/// Environment variable name for the mirror node URL override.
pub const HEDERA_MIRROR_URL_ENV: &str = "HEDERA_MIRROR_URL";

/// Environment variable name for the database file path.
///
/// # Default
/// `data/fitchain.redb`
pub const FITCHAIN_DB_PATH_ENV: &str = "FITCHAIN_DB_PATH";

/// Default database file path.
pub const DEFAULT_DB_PATH: &str = "data/fitchain.redb";

/// Environment variable name for the per-call ledger timeout, in seconds.
pub const LEDGER_TIMEOUT_SECS_ENV: &str = "LEDGER_TIMEOUT_SECS";

/// Environment variable name for the retry attempt budget.
pub const LEDGER_RETRY_ATTEMPTS_ENV: &str = "LEDGER_RETRY_ATTEMPTS";

/// Environment variable name for the first backoff delay, in milliseconds.
pub const LEDGER_RETRY_BASE_MS_ENV: &str = "LEDGER_RETRY_BASE_MS";

/// Environment variable name for the logging format.
///
/// # Values
/// - `json`: structured JSON lines
/// - `pretty` (default): human-readable output
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

/// Settings every command needs: storage, logging and ledger call limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_format: LogFormat,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = optional(&lookup, FITCHAIN_DB_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let log_format = match optional(&lookup, LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                reason,
            })?,
            None => LogFormat::default(),
        };

        let defaults = RetryPolicy::default();
        let call_timeout = parse_number(&lookup, LEDGER_TIMEOUT_SECS_ENV)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.call_timeout);
        if call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: LEDGER_TIMEOUT_SECS_ENV,
                reason: "must be at least 1".to_string(),
            });
        }
        let max_attempts = match parse_number(&lookup, LEDGER_RETRY_ATTEMPTS_ENV)? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: LEDGER_RETRY_ATTEMPTS_ENV,
                    reason: "must be at least 1".to_string(),
                })
            }
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::Invalid {
                name: LEDGER_RETRY_ATTEMPTS_ENV,
                reason: format!("{n} is too large"),
            })?,
            None => defaults.max_attempts,
        };
        let base_delay = parse_number(&lookup, LEDGER_RETRY_BASE_MS_ENV)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);

        Ok(Self {
            db_path,
            log_format,
            retry: RetryPolicy {
                max_attempts,
                base_delay,
                call_timeout,
                ..defaults
            },
        })
    }
}

/// Operator private key. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorKey(String);

impl OperatorKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperatorKey(<redacted>)")
    }
}

/// Settings for commands that talk to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub network: NetworkConfig,
    pub operator_id: AccountId,
    pub operator_key: OperatorKey,
    pub token_id: TokenId,
    pub treasury_id: AccountId,
    pub rpc_url: Url,
    pub mirror_url: Url,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let network = network_by_key(optional(&lookup, HEDERA_NETWORK_ENV).as_deref())
            .map_err(|reason| ConfigError::Invalid {
                name: HEDERA_NETWORK_ENV,
                reason,
            })?;

        let operator_id: AccountId = parse_required(&lookup, HEDERA_OPERATOR_ID_ENV)?;
        let operator_key = OperatorKey::new(required(&lookup, HEDERA_OPERATOR_KEY_ENV)?);
        let token_id: TokenId = parse_required(&lookup, FIT_TOKEN_ID_ENV)?;
        let treasury_id = match optional(&lookup, FIT_TREASURY_ID_ENV) {
            Some(raw) => parse_value(FIT_TREASURY_ID_ENV, &raw)?,
            None => operator_id,
        };

        let rpc_url = parse_url(
            HEDERA_RPC_URL_ENV,
            optional(&lookup, HEDERA_RPC_URL_ENV).as_deref().unwrap_or(network.rpc_url),
        )?;
        let mirror_url = parse_url(
            HEDERA_MIRROR_URL_ENV,
            optional(&lookup, HEDERA_MIRROR_URL_ENV)
                .as_deref()
                .unwrap_or(network.mirror_url),
        )?;

        Ok(Self {
            network,
            operator_id,
            operator_key,
            token_id,
            treasury_id,
            rpc_url,
            mirror_url,
        })
    }
}

/// Non-empty, trimmed value of `name`.
fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_required<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_value(name, &required(lookup, name)?)
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    optional(lookup, name)
        .map(|raw| parse_value(name, &raw))
        .transpose()
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = parse_value::<Url>(name, raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn ledger_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            (HEDERA_OPERATOR_ID_ENV, "0.0.1001"),
            (HEDERA_OPERATOR_KEY_ENV, "0xabc"),
            (FIT_TOKEN_ID_ENV, "0.0.5005"),
        ]
    }

    #[test]
    fn config_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn config_overrides() {
        let config = Config::from_lookup(lookup(&[
            (FITCHAIN_DB_PATH_ENV, "/tmp/fit.redb"),
            (LOG_FORMAT_ENV, "JSON"),
            (LEDGER_TIMEOUT_SECS_ENV, "5"),
            (LEDGER_RETRY_ATTEMPTS_ENV, "4"),
            (LEDGER_RETRY_BASE_MS_ENV, "100"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/fit.redb"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.retry.call_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn config_rejects_bad_numbers() {
        let err = Config::from_lookup(lookup(&[(LEDGER_RETRY_ATTEMPTS_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: LEDGER_RETRY_ATTEMPTS_ENV, .. }));

        let err = Config::from_lookup(lookup(&[(LEDGER_TIMEOUT_SECS_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: LEDGER_TIMEOUT_SECS_ENV, .. }));

        let err = Config::from_lookup(lookup(&[(LOG_FORMAT_ENV, "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: LOG_FORMAT_ENV, .. }));
    }

    #[test]
    fn ledger_config_defaults_to_testnet_and_operator_treasury() {
        let config = LedgerConfig::from_lookup(lookup(&ledger_vars())).unwrap();
        assert_eq!(config.network.key, "testnet");
        assert_eq!(config.treasury_id, config.operator_id);
        assert_eq!(config.token_id, TokenId::new(0, 0, 5005));
        assert_eq!(config.rpc_url.as_str(), "https://testnet.hashio.io/api");
        assert_eq!(
            config.mirror_url.as_str(),
            "https://testnet.mirrornode.hedera.com/"
        );
    }

    #[test]
    fn ledger_config_overrides() {
        let mut vars = ledger_vars();
        vars.push((HEDERA_NETWORK_ENV, "mainnet"));
        vars.push((FIT_TREASURY_ID_ENV, "0.0.2002"));
        vars.push((HEDERA_MIRROR_URL_ENV, "http://localhost:5551"));
        let config = LedgerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.network.chain_id, 295);
        assert_eq!(config.treasury_id, AccountId::new(0, 0, 2002));
        assert_eq!(config.mirror_url.as_str(), "http://localhost:5551/");
    }

    #[test]
    fn ledger_config_requires_credentials() {
        let err = LedgerConfig::from_lookup(lookup(&[(FIT_TOKEN_ID_ENV, "0.0.5")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(HEDERA_OPERATOR_ID_ENV));

        let mut vars = ledger_vars();
        vars[0] = (HEDERA_OPERATOR_ID_ENV, "not-an-id");
        let err = LedgerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: HEDERA_OPERATOR_ID_ENV, .. }));

        let mut vars = ledger_vars();
        vars.push((HEDERA_RPC_URL_ENV, "ftp://relay"));
        assert!(LedgerConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn operator_key_is_redacted() {
        let key = OperatorKey::new("deadbeef");
        assert_eq!(format!("{key:?}"), "OperatorKey(<redacted>)");
        assert_eq!(key.expose(), "deadbeef");
    }
}
