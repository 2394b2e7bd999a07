// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet repository.
//!
//! ## Layout
//!
//! A wallet occupies one row in `wallets` plus one row per account in
//! `wallet_accounts`, a name index entry, an order index entry and its key
//! index counter. All of them are written (and deleted) in one transaction.

use redb::ReadableTable;

use super::super::database::{
    decode, encode, next_sequence, page_ids, resolve_token, CustodyDatabase, StoreError,
    StoreResult, StoredRow, KEY_INDEX_COUNTERS, WALLETS, WALLET_ACCOUNTS, WALLET_NAMES,
    WALLET_ORDER,
};
use crate::models::{Wallet, WalletAccount};

const WALLET_SEQUENCE: &str = "wallets";

fn wallet_not_found() -> StoreError {
    StoreError::NotFound("wallet not found".to_string())
}

/// Accounts of a wallet in position order.
fn load_accounts<T>(accounts: &T, wallet_id: &str) -> StoreResult<Vec<WalletAccount>>
where
    T: ReadableTable<(&'static str, u32), &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in accounts.range((wallet_id, 0u32)..=(wallet_id, u32::MAX))? {
        let (_, value) = entry?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

/// First derivation index handed to private keys of a new wallet.
///
/// At least the account count, and above the final index of every account
/// whose path a private key could be derived at (see
/// [`DerivationPath::bip44_index`](crate::enclave::DerivationPath::bip44_index)).
fn first_key_index(accounts: &[WalletAccount]) -> StoreResult<u32> {
    let count = u32::try_from(accounts.len())
        .map_err(|_| StoreError::InvalidState("too many accounts".to_string()))?;
    let above_used = accounts
        .iter()
        .filter_map(|a| a.derivation_path.bip44_index())
        .map(|index| index.saturating_add(1))
        .max()
        .unwrap_or(0);
    Ok(count.max(above_used))
}

/// Repository for wallets and their accounts.
pub struct WalletRepository<'a> {
    db: &'a CustodyDatabase,
}

impl<'a> WalletRepository<'a> {
    pub fn new(db: &'a CustodyDatabase) -> Self {
        Self { db }
    }

    /// Persist a wallet and all of its accounts as one unit.
    ///
    /// The key index counter starts past every account index (see
    /// [`first_key_index`]). A wallet name
    /// already used in the organization aborts the transaction with
    /// `Conflict`, leaving no row of this wallet behind.
    pub fn create(&self, wallet: &Wallet) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            if wallets.get(wallet.id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "wallet {} already exists",
                    wallet.id
                )));
            }

            let sequence = next_sequence(&write_txn, WALLET_SEQUENCE)?;
            let row = StoredRow {
                sequence,
                record: Wallet {
                    accounts: Vec::new(),
                    ..wallet.clone()
                },
            };
            wallets.insert(wallet.id.as_str(), encode(&row)?.as_slice())?;

            let mut accounts = write_txn.open_table(WALLET_ACCOUNTS)?;
            for (position, account) in wallet.accounts.iter().enumerate() {
                let position = u32::try_from(position)
                    .map_err(|_| StoreError::InvalidState("too many accounts".to_string()))?;
                accounts.insert((wallet.id.as_str(), position), encode(account)?.as_slice())?;
            }

            let mut order = write_txn.open_table(WALLET_ORDER)?;
            order.insert((wallet.organization_id.as_str(), sequence), wallet.id.as_str())?;

            let mut counters = write_txn.open_table(KEY_INDEX_COUNTERS)?;
            counters.insert(wallet.id.as_str(), first_key_index(&wallet.accounts)?)?;

            // Checked last: a clash discards everything written above.
            let mut names = write_txn.open_table(WALLET_NAMES)?;
            let clash = names
                .insert(
                    (wallet.organization_id.as_str(), wallet.name.as_str()),
                    wallet.id.as_str(),
                )?
                .is_some();
            if clash {
                return Err(StoreError::Conflict(format!(
                    "wallet name {:?} already exists in organization {}",
                    wallet.name, wallet.organization_id
                )));
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a wallet with its accounts. A wallet of another organization is
    /// reported as not found.
    pub fn get(&self, org_id: &str, wallet_id: &str) -> StoreResult<Wallet> {
        let read_txn = self.db.begin_read()?;
        let wallets = read_txn.open_table(WALLETS)?;
        let accounts = read_txn.open_table(WALLET_ACCOUNTS)?;

        let row: StoredRow<Wallet> = match wallets.get(wallet_id)? {
            Some(value) => decode(value.value())?,
            None => return Err(wallet_not_found()),
        };
        if row.record.organization_id != org_id {
            return Err(wallet_not_found());
        }

        let mut wallet = row.record;
        wallet.accounts = load_accounts(&accounts, wallet_id)?;
        Ok(wallet)
    }

    /// One page of an organization's wallets in creation order.
    ///
    /// Returns `(wallets, next_token)`; the token is the id of the last
    /// wallet and is `None` on the last page.
    pub fn list(
        &self,
        org_id: &str,
        limit: usize,
        page_token: Option<&str>,
    ) -> StoreResult<(Vec<Wallet>, Option<String>)> {
        let read_txn = self.db.begin_read()?;
        let wallets = read_txn.open_table(WALLETS)?;
        let accounts = read_txn.open_table(WALLET_ACCOUNTS)?;
        let order = read_txn.open_table(WALLET_ORDER)?;

        let after = page_token
            .map(|token| resolve_token(&wallets, org_id, token))
            .transpose()?;
        let (ids, has_more) = page_ids(&order, org_id, after, limit)?;

        let mut page = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(value) = wallets.get(id.as_str())? else {
                return Err(StoreError::InvalidState(format!(
                    "order index points at missing wallet {id}"
                )));
            };
            let row: StoredRow<Wallet> = decode(value.value())?;
            let mut wallet = row.record;
            wallet.accounts = load_accounts(&accounts, id)?;
            page.push(wallet);
        }

        let next_token = if has_more {
            page.last().map(|w| w.id.clone())
        } else {
            None
        };
        Ok((page, next_token))
    }

    /// Delete a wallet, its accounts and its indexes in one transaction.
    ///
    /// Returns the deleted wallet (with accounts).
    pub fn delete(&self, org_id: &str, wallet_id: &str) -> StoreResult<Wallet> {
        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let row: StoredRow<Wallet> = match wallets.get(wallet_id)? {
                Some(value) => decode(value.value())?,
                None => return Err(wallet_not_found()),
            };
            if row.record.organization_id != org_id {
                return Err(wallet_not_found());
            }

            let mut accounts = write_txn.open_table(WALLET_ACCOUNTS)?;
            let removed_accounts = load_accounts(&accounts, wallet_id)?;
            for position in 0..removed_accounts.len() {
                let position = u32::try_from(position)
                    .map_err(|_| StoreError::InvalidState("too many accounts".to_string()))?;
                accounts.remove((wallet_id, position))?;
            }

            wallets.remove(wallet_id)?;

            let mut names = write_txn.open_table(WALLET_NAMES)?;
            names.remove((org_id, row.record.name.as_str()))?;

            let mut order = write_txn.open_table(WALLET_ORDER)?;
            order.remove((org_id, row.sequence))?;

            let mut counters = write_txn.open_table(KEY_INDEX_COUNTERS)?;
            counters.remove(wallet_id)?;

            let mut wallet = row.record;
            wallet.accounts = removed_accounts;
            wallet
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    /// Next derivation index the wallet would hand to a private key.
    pub fn next_key_index(&self, wallet_id: &str) -> StoreResult<u32> {
        let read_txn = self.db.begin_read()?;
        let counters = read_txn.open_table(KEY_INDEX_COUNTERS)?;
        match counters.get(wallet_id)? {
            Some(value) => Ok(value.value()),
            None => Err(wallet_not_found()),
        }
    }
}
