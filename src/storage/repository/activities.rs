// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity repository. Activities are appended, finished once and never deleted.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde_json::Value;

use super::super::database::{
    decode, encode, next_sequence, page_ids, resolve_token, CustodyDatabase, StoreError,
    StoreResult, StoredRow, ACTIVITIES, ACTIVITY_ORDER,
};
use crate::models::{Activity, ActivityStatus};

const ACTIVITY_SEQUENCE: &str = "activities";

fn activity_not_found() -> StoreError {
    StoreError::NotFound("activity not found".to_string())
}

pub struct ActivityRepository<'a> {
    db: &'a CustodyDatabase,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(db: &'a CustodyDatabase) -> Self {
        Self { db }
    }

    pub fn create(&self, activity: &Activity) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut activities = write_txn.open_table(ACTIVITIES)?;
            if activities.get(activity.id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "activity {} already exists",
                    activity.id
                )));
            }
            let sequence = next_sequence(&write_txn, ACTIVITY_SEQUENCE)?;
            let row = StoredRow {
                sequence,
                record: activity.clone(),
            };
            activities.insert(activity.id.as_str(), encode(&row)?.as_slice())?;

            let mut order = write_txn.open_table(ACTIVITY_ORDER)?;
            order.insert(
                (activity.organization_id.as_str(), sequence),
                activity.id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Move a pending activity to a terminal status.
    ///
    /// Finished activities are immutable: a second transition fails with
    /// `InvalidState`.
    pub fn finish(
        &self,
        activity_id: &str,
        status: ActivityStatus,
        result: Option<Value>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Activity> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "activity {activity_id} cannot move back to {status}"
            )));
        }

        let write_txn = self.db.begin_write()?;
        let activity = {
            let mut activities = write_txn.open_table(ACTIVITIES)?;
            let mut row: StoredRow<Activity> = match activities.get(activity_id)? {
                Some(value) => decode(value.value())?,
                None => return Err(activity_not_found()),
            };
            if row.record.status.is_terminal() {
                return Err(StoreError::InvalidState(format!(
                    "activity {activity_id} is already {}",
                    row.record.status
                )));
            }

            row.record.status = status;
            row.record.result = result;
            row.record.updated_at = updated_at;
            activities.insert(activity_id, encode(&row)?.as_slice())?;
            row.record
        };
        write_txn.commit()?;
        Ok(activity)
    }

    pub fn get(&self, org_id: &str, activity_id: &str) -> StoreResult<Activity> {
        let read_txn = self.db.begin_read()?;
        let activities = read_txn.open_table(ACTIVITIES)?;
        let row: StoredRow<Activity> = match activities.get(activity_id)? {
            Some(value) => decode(value.value())?,
            None => return Err(activity_not_found()),
        };
        if row.record.organization_id != org_id {
            return Err(activity_not_found());
        }
        Ok(row.record)
    }

    pub fn list(
        &self,
        org_id: &str,
        limit: usize,
        page_token: Option<&str>,
    ) -> StoreResult<(Vec<Activity>, Option<String>)> {
        let read_txn = self.db.begin_read()?;
        let activities = read_txn.open_table(ACTIVITIES)?;
        let order = read_txn.open_table(ACTIVITY_ORDER)?;

        let after = page_token
            .map(|token| resolve_token(&activities, org_id, token))
            .transpose()?;
        let (ids, has_more) = page_ids(&order, org_id, after, limit)?;

        let mut page = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(value) = activities.get(id.as_str())? else {
                return Err(StoreError::InvalidState(format!(
                    "order index points at missing activity {id}"
                )));
            };
            let row: StoredRow<Activity> = decode(value.value())?;
            page.push(row.record);
        }

        let next_token = if has_more {
            page.last().map(|a| a.id.clone())
        } else {
            None
        };
        Ok((page, next_token))
    }
}
