// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Private key repository.
//!
//! Persisting a key also advances its wallet's key index counter, in the same
//! transaction, after checking the counter still holds the index the key was
//! derived at.

use redb::ReadableTable;

use super::super::database::{
    decode, encode, next_sequence, page_ids, resolve_token, CustodyDatabase, StoreError,
    StoreResult, StoredRow, KEY_INDEX_COUNTERS, PRIVATE_KEYS, PRIVATE_KEY_ORDER,
};
use crate::models::PrivateKey;

const PRIVATE_KEY_SEQUENCE: &str = "private_keys";

fn key_not_found() -> StoreError {
    StoreError::NotFound("private key not found".to_string())
}

/// Repository for derived private keys.
pub struct PrivateKeyRepository<'a> {
    db: &'a CustodyDatabase,
}

impl<'a> PrivateKeyRepository<'a> {
    pub fn new(db: &'a CustodyDatabase) -> Self {
        Self { db }
    }

    /// Persist a key and advance the wallet's counter past its index.
    ///
    /// Fails with `Conflict` (writing nothing) if the counter no longer equals
    /// `key.derivation_index`, and with `NotFound` if the wallet is gone.
    pub fn create(&self, key: &PrivateKey) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut counters = write_txn.open_table(KEY_INDEX_COUNTERS)?;
            let current = match counters.get(key.wallet_id.as_str())? {
                Some(value) => value.value(),
                None => return Err(StoreError::NotFound("wallet not found".to_string())),
            };
            if current != key.derivation_index {
                return Err(StoreError::Conflict(format!(
                    "key index of wallet {} moved from {} to {}",
                    key.wallet_id, key.derivation_index, current
                )));
            }
            let next = current.checked_add(1).ok_or_else(|| {
                StoreError::InvalidState(format!("key index of wallet {} exhausted", key.wallet_id))
            })?;
            counters.insert(key.wallet_id.as_str(), next)?;

            let mut keys = write_txn.open_table(PRIVATE_KEYS)?;
            if keys.get(key.id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "private key {} already exists",
                    key.id
                )));
            }
            let sequence = next_sequence(&write_txn, PRIVATE_KEY_SEQUENCE)?;
            let row = StoredRow {
                sequence,
                record: key.clone(),
            };
            keys.insert(key.id.as_str(), encode(&row)?.as_slice())?;

            let mut order = write_txn.open_table(PRIVATE_KEY_ORDER)?;
            order.insert((key.organization_id.as_str(), sequence), key.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, org_id: &str, key_id: &str) -> StoreResult<PrivateKey> {
        let read_txn = self.db.begin_read()?;
        let keys = read_txn.open_table(PRIVATE_KEYS)?;
        let row: StoredRow<PrivateKey> = match keys.get(key_id)? {
            Some(value) => decode(value.value())?,
            None => return Err(key_not_found()),
        };
        if row.record.organization_id != org_id {
            return Err(key_not_found());
        }
        Ok(row.record)
    }

    /// One page of an organization's private keys in creation order.
    pub fn list(
        &self,
        org_id: &str,
        limit: usize,
        page_token: Option<&str>,
    ) -> StoreResult<(Vec<PrivateKey>, Option<String>)> {
        let read_txn = self.db.begin_read()?;
        let keys = read_txn.open_table(PRIVATE_KEYS)?;
        let order = read_txn.open_table(PRIVATE_KEY_ORDER)?;

        let after = page_token
            .map(|token| resolve_token(&keys, org_id, token))
            .transpose()?;
        let (ids, has_more) = page_ids(&order, org_id, after, limit)?;

        let mut page = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(value) = keys.get(id.as_str())? else {
                return Err(StoreError::InvalidState(format!(
                    "order index points at missing private key {id}"
                )));
            };
            let row: StoredRow<PrivateKey> = decode(value.value())?;
            page.push(row.record);
        }

        let next_token = if has_more {
            page.last().map(|k| k.id.clone())
        } else {
            None
        };
        Ok((page, next_token))
    }

    /// Delete a key. The wallet counter is left alone so indices are never reused.
    pub fn delete(&self, org_id: &str, key_id: &str) -> StoreResult<PrivateKey> {
        let write_txn = self.db.begin_write()?;
        let key = {
            let mut keys = write_txn.open_table(PRIVATE_KEYS)?;
            let row: StoredRow<PrivateKey> = match keys.get(key_id)? {
                Some(value) => decode(value.value())?,
                None => return Err(key_not_found()),
            };
            if row.record.organization_id != org_id {
                return Err(key_not_found());
            }
            keys.remove(key_id)?;

            let mut order = write_txn.open_table(PRIVATE_KEY_ORDER)?;
            order.remove((org_id, row.sequence))?;
            row.record
        };
        write_txn.commit()?;
        Ok(key)
    }
}
