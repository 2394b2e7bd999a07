// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization creation and lookup.

use std::sync::Arc;

use super::clock::Clock;
use crate::error::CustodyResult;
use crate::models::{normalize_name, validate_identifier, NewOrganization, Organization, RootQuorum};
use crate::storage::{CustodyDatabase, OrganizationRepository};

pub struct OrganizationService {
    db: Arc<CustodyDatabase>,
    clock: Arc<dyn Clock>,
}

impl OrganizationService {
    pub fn new(db: Arc<CustodyDatabase>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Resolve the id a new organization will get, generating one if absent.
    pub fn resolve_id(request: &NewOrganization) -> CustodyResult<String> {
        match request.id.as_deref().map(str::trim) {
            Some(id) => {
                validate_identifier("organization id", id)?;
                Ok(id.to_string())
            }
            None => Ok(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Create an organization and its root quorum in one transaction.
    ///
    /// `threshold > 0` and `|members| >= threshold` are checked (after
    /// deduplicating members) before anything is written.
    pub fn create_organization(
        &self,
        id: &str,
        request: &NewOrganization,
    ) -> CustodyResult<Organization> {
        validate_identifier("organization id", id)?;
        let name = normalize_name("organization", &request.name)?;
        let root_quorum = RootQuorum::new(&request.member_ids, request.threshold)?;

        let org = Organization {
            id: id.to_string(),
            name,
            version: 1,
            root_quorum,
            created_at: self.clock.now(),
        };
        OrganizationRepository::new(&self.db).create(&org)?;

        tracing::info!(
            organization_id = %org.id,
            members = org.root_quorum.member_ids.len(),
            threshold = org.root_quorum.threshold,
            "Organization created"
        );
        Ok(org)
    }

    pub fn get_organization(&self, id: &str) -> CustodyResult<Organization> {
        validate_identifier("organization id", id)?;
        Ok(OrganizationRepository::new(&self.db).get(id)?)
    }

    pub fn list_quorum_members(&self, id: &str) -> CustodyResult<Vec<String>> {
        validate_identifier("organization id", id)?;
        Ok(OrganizationRepository::new(&self.db).list_quorum_members(id)?)
    }
}
