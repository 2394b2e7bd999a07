// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Client
//!
//! Protocol adapter to the isolated signing environment. Seeds and private
//! keys only ever cross this boundary as encrypted blobs; nothing here
//! decrypts them.
//!
//! Every call takes a [`CallContext`] carrying the caller's cancellation token
//! and optional deadline. An enclave round-trip is the only suspension point
//! in the custody core, so this is also the only place cancellation is
//! observed.

mod error;
mod http;
#[cfg(test)]
pub mod mock;
mod path;
mod types;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use error::{EnclaveError, EnclaveErrorKind, EnclaveOperation};
pub use http::HttpEnclaveClient;
pub use path::{DerivationPath, PathError};
pub use types::{
    is_valid_word_count, DerivedAddress, DerivedKey, EnclaveInfo, GeneratedSeed, SeedInput,
    SeedStrength, SeedValidation,
};

use crate::models::{Curve, EncryptedSeed};

/// Narrow request/response interface to the enclave.
#[async_trait]
pub trait EnclaveClient: Send + Sync {
    async fn generate_seed(
        &self,
        ctx: &CallContext,
        strength: SeedStrength,
        passphrase: Option<&str>,
    ) -> Result<GeneratedSeed, EnclaveError>;

    async fn validate_seed(
        &self,
        ctx: &CallContext,
        input: &SeedInput,
        encrypted_reference: Option<&EncryptedSeed>,
    ) -> Result<SeedValidation, EnclaveError>;

    async fn derive_key(
        &self,
        ctx: &CallContext,
        seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedKey, EnclaveError>;

    async fn derive_address(
        &self,
        ctx: &CallContext,
        seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedAddress, EnclaveError>;

    async fn health(&self, ctx: &CallContext) -> Result<(), EnclaveError>;

    async fn info(&self, ctx: &CallContext) -> Result<EnclaveInfo, EnclaveError>;
}

/// Cancellation token plus optional deadline for enclave calls.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `call` until it finishes, the token is cancelled or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, F>(
        &self,
        operation: EnclaveOperation,
        path: Option<&DerivationPath>,
        call: F,
    ) -> Result<T, EnclaveError>
    where
        F: Future<Output = Result<T, EnclaveError>>,
    {
        let fail = |kind| {
            let err = EnclaveError::new(operation, kind);
            match path {
                Some(p) => err.with_path(p.as_str()),
                None => err,
            }
        };

        if self.cancel.is_cancelled() {
            return Err(fail(EnclaveErrorKind::Cancelled));
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(fail(EnclaveErrorKind::Cancelled)),
            _ = deadline => Err(fail(EnclaveErrorKind::Timeout)),
            result = call => result,
        }
    }
}
