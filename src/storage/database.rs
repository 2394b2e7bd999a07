// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded custody database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `organizations`: org_id → serialized Organization
//! - `quorum_members`: (org_id, member_id) → ()
//! - `wallets`: wallet_id → serialized Wallet (accounts stored separately)
//! - `wallet_accounts`: (wallet_id, position) → serialized WalletAccount
//! - `wallet_names`: (org_id, name) → wallet_id (uniqueness index)
//! - `wallet_order`: (org_id, sequence) → wallet_id
//! - `key_index_counters`: wallet_id → next private key derivation index
//! - `private_keys`: key_id → serialized PrivateKey
//! - `private_key_order`: (org_id, sequence) → key_id
//! - `activities`: activity_id → serialized Activity
//! - `activity_order`: (org_id, sequence) → activity_id
//! - `sequences`: entity name → last issued sequence
//!
//! Rows that take part in pagination are wrapped in [`StoredRow`] so a page
//! token (the id of the last item) resolves to its position in creation order.

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const ORGANIZATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("organizations");

pub(crate) const QUORUM_MEMBERS: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("quorum_members");

pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Keyed by position so accounts come back in request order.
pub(crate) const WALLET_ACCOUNTS: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("wallet_accounts");

pub(crate) const WALLET_NAMES: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("wallet_names");

pub(crate) const WALLET_ORDER: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("wallet_order");

pub(crate) const KEY_INDEX_COUNTERS: TableDefinition<&str, u32> =
    TableDefinition::new("key_index_counters");

pub(crate) const PRIVATE_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("private_keys");

pub(crate) const PRIVATE_KEY_ORDER: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("private_key_order");

pub(crate) const ACTIVITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("activities");

pub(crate) const ACTIVITY_ORDER: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("activity_order");

pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness constraint or an optimistic check failed; nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The row exists but is not in a state that allows the update.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown page token {0:?}")]
    InvalidPageToken(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Row Envelope
// =============================================================================

/// A record plus its creation-order sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRow<T> {
    pub sequence: u64,
    #[serde(flatten)]
    pub record: T,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// Sequences & Paging
// =============================================================================

/// Issue the next value of a named monotonic sequence inside `txn`.
pub(crate) fn next_sequence(txn: &WriteTransaction, name: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(name)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(name, next)?;
    Ok(next)
}

/// Collect up to `limit + 1` ids from an order index for `scope`, starting
/// strictly after `after`.
///
/// Returns the ids of the page and whether a further row exists.
pub(crate) fn page_ids<T>(
    order: &T,
    scope: &str,
    after: Option<u64>,
    limit: usize,
) -> StoreResult<(Vec<String>, bool)>
where
    T: ReadableTable<(&'static str, u64), &'static str>,
{
    let start = match after {
        Some(seq) if seq == u64::MAX => return Ok((Vec::new(), false)),
        Some(seq) => seq + 1,
        None => 0,
    };

    let mut ids = Vec::with_capacity(limit + 1);
    for entry in order.range((scope, start)..=(scope, u64::MAX))? {
        let (_, id) = entry?;
        ids.push(id.value().to_string());
        // probe one past the page to know whether it is the last
        if ids.len() > limit {
            break;
        }
    }

    let has_more = ids.len() > limit;
    ids.truncate(limit);
    Ok((ids, has_more))
}

#[derive(Deserialize)]
struct RowPosition {
    sequence: u64,
    organization_id: String,
}

/// Resolve a page token (the id of the last item of the previous page) to its
/// sequence. Tokens naming a row outside `scope` are rejected like unknown ones.
pub(crate) fn resolve_token<T>(rows: &T, scope: &str, token: &str) -> StoreResult<u64>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let Some(bytes) = rows.get(token)? else {
        return Err(StoreError::InvalidPageToken(token.to_string()));
    };
    let position: RowPosition = decode(bytes.value())?;
    if position.organization_id != scope {
        return Err(StoreError::InvalidPageToken(token.to_string()));
    }
    Ok(position.sequence)
}

// =============================================================================
// CustodyDatabase
// =============================================================================

/// Embedded ACID custody database.
pub struct CustodyDatabase {
    db: Database,
}

impl CustodyDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create data directory");
            }
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORGANIZATIONS)?;
            let _ = write_txn.open_table(QUORUM_MEMBERS)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_ACCOUNTS)?;
            let _ = write_txn.open_table(WALLET_NAMES)?;
            let _ = write_txn.open_table(WALLET_ORDER)?;
            let _ = write_txn.open_table(KEY_INDEX_COUNTERS)?;
            let _ = write_txn.open_table(PRIVATE_KEYS)?;
            let _ = write_txn.open_table(PRIVATE_KEY_ORDER)?;
            let _ = write_txn.open_table(ACTIVITIES)?;
            let _ = write_txn.open_table(ACTIVITY_ORDER)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Custody database opened");
        Ok(Self { db })
    }

    /// Start a write transaction. Dropping it without `commit()` aborts it.
    pub(crate) fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}

// =============================================================================
// Tests
// =============================================================================
