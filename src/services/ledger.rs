// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activity Ledger
//!
//! Records one [`Activity`] per state-changing request: PENDING before the
//! operation runs, then COMPLETED or FAILED exactly once.
//!
//! ## Fingerprint
//!
//! `intent.fingerprint` is the lowercase hex SHA-256 of
//! `"<ACTIVITY_TYPE>\n<canonical JSON parameters>"`, where canonical JSON has
//! object keys sorted and no insignificant whitespace. Identical requests
//! share a fingerprint; the ledger does not deduplicate on it.

use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::clock::Clock;
use crate::error::{CustodyError, CustodyResult};
use crate::models::{
    validate_identifier, Activity, ActivityStatus, ActivityType, Intent, Page, PageRequest,
};
use crate::storage::{ActivityRepository, CustodyDatabase};

/// Serialize `value` compactly with object keys sorted at every level.
///
/// `serde_json::Map` is a `BTreeMap` without the `preserve_order` feature, so
/// the plain compact encoding is already sorted.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Stable digest of an activity request.
pub fn fingerprint(activity_type: &ActivityType, parameters: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(activity_type.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(parameters).as_bytes());
    hex::encode(hasher.finalize())
}

fn summarize(activity_type: &ActivityType, parameters: &Value, created_by: &str) -> String {
    match parameters.get("name").and_then(Value::as_str) {
        Some(name) => format!("{activity_type} {name:?} requested by {created_by}"),
        None => format!("{activity_type} requested by {created_by}"),
    }
}

/// Result payload recorded on a failed activity.
fn failure_result(error: &CustodyError) -> Value {
    let mut result = json!({
        "error_code": error.error_code(),
        "message": error.to_string(),
        "retryable": error.is_retryable(),
    });
    if let CustodyError::QuorumRequired { required } = error {
        result["required_approvals"] = json!(required);
    }
    result
}

pub struct ActivityLedger {
    db: Arc<CustodyDatabase>,
    clock: Arc<dyn Clock>,
}

impl ActivityLedger {
    pub fn new(db: Arc<CustodyDatabase>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Record a PENDING activity.
    pub fn begin(
        &self,
        org_id: &str,
        activity_type: ActivityType,
        parameters: Value,
        created_by: &str,
    ) -> CustodyResult<Activity> {
        let now = self.clock.now();
        let intent = Intent {
            fingerprint: fingerprint(&activity_type, &parameters),
            summary: summarize(&activity_type, &parameters, created_by),
        };
        let activity = Activity {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: org_id.to_string(),
            activity_type,
            status: ActivityStatus::Pending,
            parameters,
            result: None,
            intent,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };
        ActivityRepository::new(&self.db).create(&activity)?;

        tracing::debug!(
            activity_id = %activity.id,
            organization_id = %org_id,
            activity_type = %activity.activity_type,
            fingerprint = %activity.intent.fingerprint,
            "Activity started"
        );
        Ok(activity)
    }

    pub fn complete(&self, activity_id: &str, result: Value) -> CustodyResult<Activity> {
        let activity = ActivityRepository::new(&self.db).finish(
            activity_id,
            ActivityStatus::Completed,
            Some(result),
            self.clock.now(),
        )?;
        tracing::info!(
            activity_id = %activity.id,
            activity_type = %activity.activity_type,
            "Activity completed"
        );
        Ok(activity)
    }

    /// Mark an activity FAILED, recording the error class in its result.
    pub fn fail(&self, activity_id: &str, error: &CustodyError) -> CustodyResult<Activity> {
        let activity = ActivityRepository::new(&self.db).finish(
            activity_id,
            ActivityStatus::Failed,
            Some(failure_result(error)),
            self.clock.now(),
        )?;
        tracing::warn!(
            activity_id = %activity.id,
            activity_type = %activity.activity_type,
            error_code = error.error_code(),
            error = %error,
            "Activity failed"
        );
        Ok(activity)
    }

    pub fn get_activity(&self, org_id: &str, activity_id: &str) -> CustodyResult<Activity> {
        validate_identifier("organization id", org_id)?;
        validate_identifier("activity id", activity_id)?;
        Ok(ActivityRepository::new(&self.db).get(org_id, activity_id)?)
    }

    pub fn list_activities(
        &self,
        org_id: &str,
        page: &PageRequest,
    ) -> CustodyResult<Page<Activity>> {
        validate_identifier("organization id", org_id)?;
        let (limit, token) = page.resolve()?;
        let (items, next_token) = ActivityRepository::new(&self.db).list(org_id, limit, token)?;
        Ok(Page { items, next_token })
    }
}
