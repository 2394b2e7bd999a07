// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process enclave double for service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    CallContext, DerivationPath, DerivedAddress, DerivedKey, EnclaveClient, EnclaveError,
    EnclaveErrorKind, EnclaveInfo, EnclaveOperation, GeneratedSeed, SeedInput, SeedStrength,
    SeedValidation,
};
use crate::models::{Curve, EncryptedSeed};

#[derive(Default)]
struct MockState {
    calls: Vec<EnclaveOperation>,
    strengths: Vec<u32>,
    derived_paths: Vec<String>,
    failures: HashMap<EnclaveOperation, EnclaveErrorKind>,
    addresses: HashMap<String, String>,
}

/// Deterministic enclave: the seed is `seed-A`, addresses are
/// `addr:{curve}:{path}` unless overridden.
pub struct MockEnclave {
    seed: String,
    state: Mutex<MockState>,
}

impl Default for MockEnclave {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnclave {
    pub fn new() -> Self {
        Self {
            seed: "seed-A".to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = seed.into();
        self
    }

    /// Return `address` for `path` instead of the synthesized one.
    pub fn with_address(self, path: &str, address: impl Into<String>) -> Self {
        self.lock().addresses.insert(path.to_string(), address.into());
        self
    }

    /// Make every subsequent call of `op` fail with `kind`.
    pub fn fail_operation(&self, op: EnclaveOperation, kind: EnclaveErrorKind) {
        self.lock().failures.insert(op, kind);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn call_count(&self, op: EnclaveOperation) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn requested_strengths(&self) -> Vec<u32> {
        self.lock().strengths.clone()
    }

    /// Paths passed to derive calls, in call order.
    pub fn derived_paths(&self) -> Vec<String> {
        self.lock().derived_paths.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(
        &self,
        op: EnclaveOperation,
        path: Option<&DerivationPath>,
    ) -> Result<(), EnclaveError> {
        let mut state = self.lock();
        state.calls.push(op);
        if let Some(p) = path {
            state.derived_paths.push(p.to_string());
        }
        match state.failures.get(&op) {
            Some(kind) => {
                let err = EnclaveError::new(op, kind.clone());
                Err(match path {
                    Some(p) => err.with_path(p.as_str()),
                    None => err,
                })
            }
            None => Ok(()),
        }
    }

    fn address_for(&self, curve: Curve, path: &DerivationPath) -> String {
        self.lock()
            .addresses
            .get(path.as_str())
            .cloned()
            .unwrap_or_else(|| format!("addr:{}:{}", curve.wire_name(), path))
    }
}

#[async_trait]
impl EnclaveClient for MockEnclave {
    async fn generate_seed(
        &self,
        ctx: &CallContext,
        strength: SeedStrength,
        _passphrase: Option<&str>,
    ) -> Result<GeneratedSeed, EnclaveError> {
        let op = EnclaveOperation::GenerateSeed;
        ctx.run(op, None, async {
            self.lock().strengths.push(strength.bits());
            self.record(op, None)?;
            Ok(GeneratedSeed {
                encrypted_seed: EncryptedSeed::new(self.seed.clone()),
                entropy_digest: "mock-entropy".to_string(),
                strength_bits: strength.bits(),
                word_count: strength.word_count(),
            })
        })
        .await
    }

    async fn validate_seed(
        &self,
        ctx: &CallContext,
        input: &SeedInput,
        encrypted_reference: Option<&EncryptedSeed>,
    ) -> Result<SeedValidation, EnclaveError> {
        let op = EnclaveOperation::ValidateSeed;
        let value = input
            .wire_value()
            .map_err(|reason| EnclaveError::new(op, EnclaveErrorKind::InvalidInput(reason)))?;
        ctx.run(op, None, async {
            self.record(op, None)?;
            let (word_count, entropy_match) = match (input, encrypted_reference) {
                (SeedInput::PlaintextMnemonic(_), _) => (value.split(' ').count() as u32, None),
                (SeedInput::EncryptedSeedBlob(blob), reference) => {
                    (24, reference.map(|r| r.as_str() == blob.as_str()))
                }
            };
            Ok(SeedValidation {
                is_valid: true,
                word_count,
                entropy_match,
            })
        })
        .await
    }

    async fn derive_key(
        &self,
        ctx: &CallContext,
        _seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedKey, EnclaveError> {
        let op = EnclaveOperation::DeriveKey;
        ctx.run(op, Some(path), async {
            self.record(op, Some(path))?;
            Ok(DerivedKey {
                encrypted_private_key: Some(format!("enc:{path}")),
                public_key: format!("pub:{}:{}", curve.wire_name(), path),
                address: self.address_for(curve, path),
            })
        })
        .await
    }

    async fn derive_address(
        &self,
        ctx: &CallContext,
        _seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedAddress, EnclaveError> {
        let op = EnclaveOperation::DeriveAddress;
        ctx.run(op, Some(path), async {
            self.record(op, Some(path))?;
            Ok(DerivedAddress {
                address: self.address_for(curve, path),
            })
        })
        .await
    }

    async fn health(&self, ctx: &CallContext) -> Result<(), EnclaveError> {
        let op = EnclaveOperation::Health;
        ctx.run(op, None, async { self.record(op, None) }).await
    }

    async fn info(&self, ctx: &CallContext) -> Result<EnclaveInfo, EnclaveError> {
        let op = EnclaveOperation::Info;
        ctx.run(op, None, async {
            self.record(op, None)?;
            Ok(EnclaveInfo {
                version: "mock".to_string(),
                enclave_id: "mock-enclave".to_string(),
                capabilities: vec![
                    "generate-seed".to_string(),
                    "validate-seed".to_string(),
                    "derive-key".to_string(),
                    "derive-address".to_string(),
                ],
                healthy: true,
            })
        })
        .await
    }
}
