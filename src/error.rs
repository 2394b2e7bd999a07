// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service-level error taxonomy.
//!
//! Lower layers (`EnclaveError`, `StoreError`) are translated into one of the
//! variants below without dropping their detail. Nothing in this crate retries
//! automatically; `is_retryable()` tells the caller whether it may.

use std::collections::BTreeSet;

use crate::auth::ApprovalRole;
use crate::enclave::{EnclaveError, EnclaveErrorKind};
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    /// Malformed id, invalid curve/strength/mnemonic length, bad page token.
    #[error("{0}")]
    Validation(String),

    /// Organization, wallet, private key or activity absent.
    #[error("{0}")]
    NotFound(String),

    /// Timeout, network failure, non-success status or undecodable response.
    #[error(transparent)]
    EnclaveProtocol(EnclaveError),

    /// The atomic unit was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// The activity needs approvals that were not presented.
    #[error("quorum approval required from: {}", format_roles(.required))]
    QuorumRequired { required: BTreeSet<ApprovalRole> },
}

pub type CustodyResult<T> = Result<T, CustodyError>;

fn format_roles(roles: &BTreeSet<ApprovalRole>) -> String {
    roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CustodyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Stable snake_case code, recorded as the error class on failed activities.
    pub fn error_code(&self) -> &'static str {
        match self {
            CustodyError::Validation(_) => "validation_error",
            CustodyError::NotFound(_) => "not_found",
            CustodyError::EnclaveProtocol(_) => "enclave_protocol_error",
            CustodyError::Persistence(_) => "persistence_error",
            CustodyError::QuorumRequired { .. } => "quorum_required",
        }
    }

    /// Whether the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            CustodyError::EnclaveProtocol(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<EnclaveError> for CustodyError {
    fn from(e: EnclaveError) -> Self {
        match e.kind {
            EnclaveErrorKind::InvalidInput(message) => CustodyError::Validation(message),
            _ => CustodyError::EnclaveProtocol(e),
        }
    }
}

impl From<StoreError> for CustodyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(message) => CustodyError::NotFound(message),
            StoreError::InvalidPageToken(token) => {
                CustodyError::Validation(format!("invalid page token: {token}"))
            }
            other => CustodyError::Persistence(other),
        }
    }
}
