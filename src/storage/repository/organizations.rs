// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization repository.
//!
//! An organization row and its quorum member rows are written in the same
//! redb transaction.

use redb::ReadableTable;

use super::super::database::{
    decode, encode, CustodyDatabase, StoreError, StoreResult, ORGANIZATIONS, QUORUM_MEMBERS,
};
use crate::models::Organization;

/// Repository for organizations and their root quorum.
pub struct OrganizationRepository<'a> {
    db: &'a CustodyDatabase,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(db: &'a CustodyDatabase) -> Self {
        Self { db }
    }

    /// Insert an organization together with its quorum members.
    ///
    /// Fails with `Conflict` if the id is taken; nothing is written then.
    pub fn create(&self, org: &Organization) -> StoreResult<()> {
        let json = encode(org)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut orgs = write_txn.open_table(ORGANIZATIONS)?;
            if orgs.get(org.id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "organization {} already exists",
                    org.id
                )));
            }
            orgs.insert(org.id.as_str(), json.as_slice())?;

            let mut members = write_txn.open_table(QUORUM_MEMBERS)?;
            for member_id in &org.root_quorum.member_ids {
                members.insert((org.id.as_str(), member_id.as_str()), ())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn exists(&self, org_id: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        Ok(table.get(org_id)?.is_some())
    }

    pub fn get(&self, org_id: &str) -> StoreResult<Organization> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        match table.get(org_id)? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound("organization not found".to_string())),
        }
    }

    /// Quorum member ids of an organization, sorted.
    pub fn list_quorum_members(&self, org_id: &str) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let orgs = read_txn.open_table(ORGANIZATIONS)?;
        if orgs.get(org_id)?.is_none() {
            return Err(StoreError::NotFound("organization not found".to_string()));
        }

        let table = read_txn.open_table(QUORUM_MEMBERS)?;
        let mut members = Vec::new();
        for entry in table.range((org_id, "")..)? {
            let (key, _) = entry?;
            let (owner, member) = key.value();
            if owner != org_id {
                break;
            }
            members.push(member.to_string());
        }
        Ok(members)
    }
}
