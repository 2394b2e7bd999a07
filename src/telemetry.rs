// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line (production)
    Json,
    /// Human-readable multi-field output (development)
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(s: &str) -> Option<LogFormat> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by an
/// embedding binary), in which case the existing one is kept.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    result.is_ok()
}
