// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Orchestrator
//!
//! Turns a wallet request into a persisted HD wallet:
//!
//! 1. Validate the request (organization id, mnemonic length, curves, paths)
//! 2. Generate one seed in the enclave for the whole wallet
//! 3. Derive one address per requested account
//! 4. Persist the wallet and all accounts in one transaction
//!
//! Nothing reaches the enclave until every part of the request is valid, and
//! nothing is persisted unless every derivation succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use super::clock::Clock;
use crate::enclave::{
    CallContext, DerivationPath, EnclaveClient, EnclaveError, EnclaveErrorKind, EnclaveOperation,
    SeedInput, SeedStrength, SeedValidation,
};
use crate::error::{CustodyError, CustodyResult};
use crate::models::{
    normalize_name, normalize_tags, validate_identifier, AccountSpec, CreateWalletRequest,
    CreatedWallet, Curve, Page, PageRequest, Wallet, WalletAccount,
};
use crate::storage::{CustodyDatabase, OrganizationRepository, WalletRepository};

/// Resolved account spec: curve plus final derivation path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedAccount {
    curve: Curve,
    path: DerivationPath,
}

/// Parse curves and paths, synthesizing BIP44 paths from each spec's position.
fn plan_accounts(specs: &[AccountSpec]) -> CustodyResult<Vec<PlannedAccount>> {
    if specs.is_empty() {
        return Err(CustodyError::validation("at least one account is required"));
    }

    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        let curve = Curve::parse(&spec.curve)?;
        let path = match spec.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => DerivationPath::parse(raw)
                .map_err(|e| CustodyError::validation(e.to_string()))?,
            None => {
                let index = u32::try_from(i)
                    .map_err(|_| CustodyError::validation("too many accounts"))?;
                DerivationPath::bip44(curve, index)
            }
        };
        if !seen.insert(path.clone()) {
            return Err(CustodyError::validation(format!(
                "duplicate derivation path {path} in account {i}"
            )));
        }
        planned.push(PlannedAccount { curve, path });
    }
    Ok(planned)
}

pub struct WalletOrchestrator {
    db: Arc<CustodyDatabase>,
    enclave: Arc<dyn EnclaveClient>,
    clock: Arc<dyn Clock>,
}

impl WalletOrchestrator {
    pub fn new(
        db: Arc<CustodyDatabase>,
        enclave: Arc<dyn EnclaveClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { db, enclave, clock }
    }

    /// Create a wallet with one derived account per spec.
    ///
    /// Returns the wallet (with accounts) and the derived addresses in the
    /// order of `request.accounts`.
    pub async fn create_wallet(
        &self,
        ctx: &CallContext,
        request: &CreateWalletRequest,
    ) -> CustodyResult<CreatedWallet> {
        let org_id = request.organization_id.trim();
        validate_identifier("organization id", org_id)?;
        let strength = SeedStrength::from_mnemonic_length(request.mnemonic_length).ok_or_else(|| {
            CustodyError::validation(format!(
                "invalid mnemonic length {}: expected 12, 15, 18, 21 or 24",
                request.mnemonic_length
            ))
        })?;
        let name = normalize_name("wallet", &request.name)?;
        let planned = plan_accounts(&request.accounts)?;
        let tags = normalize_tags(&request.tags);

        if !OrganizationRepository::new(&self.db).exists(org_id)? {
            return Err(CustodyError::not_found("organization not found"));
        }

        let seed = self.enclave.generate_seed(ctx, strength, None).await?;
        tracing::debug!(
            organization_id = %org_id,
            strength = seed.strength_bits,
            words = seed.word_count,
            "Seed generated"
        );

        let wallet_id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let mut accounts = Vec::with_capacity(planned.len());
        let mut seen_addresses = HashSet::new();
        for plan in &planned {
            let derived = self
                .enclave
                .derive_address(ctx, &seed.encrypted_seed, &plan.path, plan.curve)
                .await?;
            if !seen_addresses.insert(derived.address.clone()) {
                return Err(EnclaveError::new(
                    EnclaveOperation::DeriveAddress,
                    EnclaveErrorKind::Inconsistent(format!(
                        "address {} returned for more than one path",
                        derived.address
                    )),
                )
                .with_path(plan.path.as_str())
                .into());
            }
            accounts.push(WalletAccount {
                id: uuid::Uuid::new_v4().to_string(),
                wallet_id: wallet_id.clone(),
                derivation_path: plan.path.clone(),
                curve: plan.curve,
                address: derived.address,
                public_key: None,
                address_format: plan.curve.address_format(),
                is_active: true,
                created_at: now,
            });
        }

        let derived_addresses: Vec<String> = accounts.iter().map(|a| a.address.clone()).collect();
        let wallet = Wallet {
            id: wallet_id,
            organization_id: org_id.to_string(),
            name,
            encrypted_seed: seed.encrypted_seed,
            display_public_key: derived_addresses.first().cloned().unwrap_or_default(),
            tags,
            is_active: true,
            created_at: now,
            accounts,
        };

        if let Err(e) = WalletRepository::new(&self.db).create(&wallet) {
            tracing::warn!(
                organization_id = %org_id,
                wallet_id = %wallet.id,
                error = %e,
                "Wallet persist failed, nothing committed"
            );
            return Err(e.into());
        }

        tracing::info!(
            organization_id = %org_id,
            wallet_id = %wallet.id,
            accounts = wallet.accounts.len(),
            "Wallet created"
        );
        Ok(CreatedWallet {
            wallet,
            derived_addresses,
        })
    }

    pub fn get_wallet(&self, org_id: &str, wallet_id: &str) -> CustodyResult<Wallet> {
        validate_identifier("organization id", org_id)?;
        validate_identifier("wallet id", wallet_id)?;
        Ok(WalletRepository::new(&self.db).get(org_id, wallet_id)?)
    }

    pub fn list_wallets(&self, org_id: &str, page: &PageRequest) -> CustodyResult<Page<Wallet>> {
        validate_identifier("organization id", org_id)?;
        let (limit, token) = page.resolve()?;
        let (items, next_token) = WalletRepository::new(&self.db).list(org_id, limit, token)?;
        Ok(Page { items, next_token })
    }

    /// Delete a wallet and all of its accounts.
    ///
    /// When `force_without_export` is false the caller is expected to have
    /// verified that the seed was exported; that is not checked here. Private
    /// keys derived from the wallet are kept.
    pub fn delete_wallet(
        &self,
        org_id: &str,
        wallet_id: &str,
        force_without_export: bool,
    ) -> CustodyResult<Wallet> {
        validate_identifier("organization id", org_id)?;
        validate_identifier("wallet id", wallet_id)?;
        let wallet = WalletRepository::new(&self.db).delete(org_id, wallet_id)?;
        tracing::info!(
            organization_id = %org_id,
            wallet_id = %wallet_id,
            accounts = wallet.accounts.len(),
            force_without_export,
            "Wallet deleted"
        );
        Ok(wallet)
    }

    /// Validate seed material in the enclave, optionally against a wallet's
    /// encrypted seed.
    pub async fn validate_seed(
        &self,
        ctx: &CallContext,
        org_id: &str,
        input: &SeedInput,
        reference_wallet_id: Option<&str>,
    ) -> CustodyResult<SeedValidation> {
        validate_identifier("organization id", org_id)?;
        let reference = match reference_wallet_id {
            Some(id) => {
                validate_identifier("wallet id", id)?;
                Some(WalletRepository::new(&self.db).get(org_id, id)?.encrypted_seed)
            }
            None => None,
        };
        Ok(self
            .enclave
            .validate_seed(ctx, input, reference.as_ref())
            .await?)
    }
}
