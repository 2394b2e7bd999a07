// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Private key derivation under an existing wallet seed.
//!
//! Index allocation is serialized per wallet: an async lock is held from
//! reading the wallet's key index counter until the key row and the advanced
//! counter are committed. The commit re-checks the counter, so a second
//! process sharing the database fails with a persistence error instead of
//! reusing an index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use super::clock::Clock;
use crate::enclave::{CallContext, DerivationPath, EnclaveClient};
use crate::error::{CustodyError, CustodyResult};
use crate::models::{
    normalize_name, normalize_tags, validate_identifier, CreatePrivateKeyRequest, Curve, Page,
    PageRequest, PrivateKey,
};
use crate::storage::{CustodyDatabase, PrivateKeyRepository, WalletRepository};

pub struct PrivateKeyService {
    db: Arc<CustodyDatabase>,
    enclave: Arc<dyn EnclaveClient>,
    clock: Arc<dyn Clock>,
    wallet_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PrivateKeyService {
    pub fn new(
        db: Arc<CustodyDatabase>,
        enclave: Arc<dyn EnclaveClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            enclave,
            clock,
            wallet_locks: Mutex::new(HashMap::new()),
        }
    }

    fn wallet_lock(&self, wallet_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .wallet_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(wallet_id.to_string()).or_default().clone()
    }

    /// Drop the wallet's lock entry once nobody else holds or waits on it.
    fn release_wallet_lock(&self, wallet_id: &str) {
        let mut locks = self
            .wallet_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(wallet_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(wallet_id);
        }
    }

    /// Derive and persist a new private key under a wallet's seed.
    ///
    /// Only the public key is stored. Imported key material is refused.
    pub async fn create_private_key(
        &self,
        ctx: &CallContext,
        request: &CreatePrivateKeyRequest,
    ) -> CustodyResult<PrivateKey> {
        if request.import_material.is_some() {
            return Err(CustodyError::validation(
                "importing private key material is not supported",
            ));
        }
        let curve = Curve::parse(&request.curve)?;
        let org_id = request.organization_id.trim();
        let wallet_id = request.wallet_id.trim();
        validate_identifier("organization id", org_id)?;
        validate_identifier("wallet id", wallet_id)?;
        let name = normalize_name("private key", &request.name)?;
        let tags = normalize_tags(&request.tags);

        let lock = self.wallet_lock(wallet_id);
        let result = {
            let _guard = lock.lock().await;
            self.derive_and_persist(ctx, org_id, wallet_id, curve, name, tags)
                .await
        };
        drop(lock);
        self.release_wallet_lock(wallet_id);
        result
    }

    async fn derive_and_persist(
        &self,
        ctx: &CallContext,
        org_id: &str,
        wallet_id: &str,
        curve: Curve,
        name: String,
        tags: Vec<String>,
    ) -> CustodyResult<PrivateKey> {
        let wallets = WalletRepository::new(&self.db);
        let wallet = wallets.get(org_id, wallet_id)?;
        let index = wallets.next_key_index(wallet_id)?;
        let path = DerivationPath::bip44(curve, index);

        let derived = self
            .enclave
            .derive_key(ctx, &wallet.encrypted_seed, &path, curve)
            .await?;

        let key = PrivateKey {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: org_id.to_string(),
            wallet_id: wallet_id.to_string(),
            name,
            curve,
            derivation_path: path,
            derivation_index: index,
            public_key: derived.public_key,
            tags,
            is_active: true,
            created_at: self.clock.now(),
        };
        PrivateKeyRepository::new(&self.db).create(&key)?;

        tracing::info!(
            organization_id = %org_id,
            wallet_id = %wallet_id,
            private_key_id = %key.id,
            path = %key.derivation_path,
            "Private key derived"
        );
        Ok(key)
    }

    pub fn get_private_key(&self, org_id: &str, key_id: &str) -> CustodyResult<PrivateKey> {
        validate_identifier("organization id", org_id)?;
        validate_identifier("private key id", key_id)?;
        Ok(PrivateKeyRepository::new(&self.db).get(org_id, key_id)?)
    }

    pub fn list_private_keys(
        &self,
        org_id: &str,
        page: &PageRequest,
    ) -> CustodyResult<Page<PrivateKey>> {
        validate_identifier("organization id", org_id)?;
        let (limit, token) = page.resolve()?;
        let (items, next_token) = PrivateKeyRepository::new(&self.db).list(org_id, limit, token)?;
        Ok(Page { items, next_token })
    }

    pub fn delete_private_key(&self, org_id: &str, key_id: &str) -> CustodyResult<PrivateKey> {
        validate_identifier("organization id", org_id)?;
        validate_identifier("private key id", key_id)?;
        let key = PrivateKeyRepository::new(&self.db).delete(org_id, key_id)?;
        tracing::info!(organization_id = %org_id, private_key_id = %key_id, "Private key deleted");
        Ok(key)
    }
}
