// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the custody core. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the custody database | `/data` |
//! | `ENCLAVE_URL` | Base URL of the enclave HTTP endpoint | `http://127.0.0.1:7000` |
//! | `ENCLAVE_TIMEOUT_SECS` | Per-request enclave timeout in seconds | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::telemetry::LogFormat;

/// Environment variable name for the data directory path.
///
/// The redb database file `custody.redb` is created inside this directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the enclave base URL.
pub const ENCLAVE_URL_ENV: &str = "ENCLAVE_URL";

/// Environment variable name for the enclave request timeout (seconds).
pub const ENCLAVE_TIMEOUT_ENV: &str = "ENCLAVE_TIMEOUT_SECS";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_ENCLAVE_URL: &str = "http://127.0.0.1:7000";
pub const DEFAULT_ENCLAVE_TIMEOUT_SECS: u64 = 30;

/// File name of the custody database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "custody.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be `json` or `pretty`, got {value:?}")]
    InvalidLogFormat { name: &'static str, value: String },
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct CustodyConfig {
    pub data_dir: PathBuf,
    pub enclave_url: Url,
    pub enclave_timeout: Duration,
    pub log_format: LogFormat,
}

impl CustodyConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Blank values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let raw_url = get(ENCLAVE_URL_ENV).unwrap_or_else(|| DEFAULT_ENCLAVE_URL.to_string());
        let enclave_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl {
            name: ENCLAVE_URL_ENV,
            reason: e.to_string(),
        })?;

        let enclave_timeout = match get(ENCLAVE_TIMEOUT_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: ENCLAVE_TIMEOUT_ENV,
                        value: raw,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_ENCLAVE_TIMEOUT_SECS),
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat {
                name: LOG_FORMAT_ENV,
                value: raw,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            data_dir,
            enclave_url,
            enclave_timeout,
            log_format,
        })
    }

    /// Full path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
