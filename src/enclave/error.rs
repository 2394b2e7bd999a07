// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave error types.

use std::fmt;

/// Enclave protocol operations, named after their endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnclaveOperation {
    GenerateSeed,
    ValidateSeed,
    DeriveKey,
    DeriveAddress,
    Health,
    Info,
}

impl EnclaveOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EnclaveOperation::GenerateSeed => "generate-seed",
            EnclaveOperation::ValidateSeed => "validate-seed",
            EnclaveOperation::DeriveKey => "derive-key",
            EnclaveOperation::DeriveAddress => "derive-address",
            EnclaveOperation::Health => "health",
            EnclaveOperation::Info => "info",
        }
    }

    /// HTTP path of the endpoint.
    pub fn endpoint(self) -> String {
        format!("/{}", self.as_str())
    }
}

impl fmt::Display for EnclaveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnclaveErrorKind {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled by caller")]
    Cancelled,

    #[error("enclave returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("inconsistent response: {0}")]
    Inconsistent(String),

    /// Rejected before dispatch.
    #[error("invalid request: {0}")]
    InvalidInput(String),
}

/// Failure of one enclave round-trip, tagged with the operation and the
/// derivation path (if any) for diagnosis.
#[derive(Debug, Clone, thiserror::Error)]
#[error("enclave {operation} failed{}: {kind}", path_suffix(.path))]
pub struct EnclaveError {
    pub operation: EnclaveOperation,
    pub path: Option<String>,
    pub kind: EnclaveErrorKind,
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_deref()
        .map(|p| format!(" for path {p}"))
        .unwrap_or_default()
}

impl EnclaveError {
    pub fn new(operation: EnclaveOperation, kind: EnclaveErrorKind) -> Self {
        Self {
            operation,
            path: None,
            kind,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Transport failures and timeouts are safe to retry; protocol and
    /// input failures are not. Cancellation is the caller's own decision.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            EnclaveErrorKind::Transport(_) | EnclaveErrorKind::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation_and_path() {
        let err = EnclaveError::new(
            EnclaveOperation::DeriveAddress,
            EnclaveErrorKind::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        )
        .with_path("m/44'/60'/0'/0/0");
        assert_eq!(
            err.to_string(),
            "enclave derive-address failed for path m/44'/60'/0'/0/0: enclave returned status 502: bad gateway"
        );

        let err = EnclaveError::new(EnclaveOperation::Health, EnclaveErrorKind::Timeout);
        assert_eq!(err.to_string(), "enclave health failed: deadline exceeded");
    }

    #[test]
    fn retryability_follows_kind() {
        let retryable = [
            EnclaveErrorKind::Transport("reset".into()),
            EnclaveErrorKind::Timeout,
        ];
        for kind in retryable {
            assert!(EnclaveError::new(EnclaveOperation::Info, kind).is_retryable());
        }

        let fatal = [
            EnclaveErrorKind::Cancelled,
            EnclaveErrorKind::Decode("eof".into()),
            EnclaveErrorKind::Inconsistent("path".into()),
            EnclaveErrorKind::InvalidInput("strength".into()),
        ];
        for kind in fatal {
            assert!(!EnclaveError::new(EnclaveOperation::Info, kind).is_retryable());
        }
    }
}
