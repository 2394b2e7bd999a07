// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Quorum authorization decisions.
//!
//! The authorizer only classifies: it says whether an activity needs
//! multi-party approval and from which roles. Collecting approvals happens
//! outside this crate and arrives as [`ApprovalEvidence`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::roles::ApprovalRole;
use crate::models::ActivityType;

/// Outcome of [`QuorumAuthorizer::authorize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    /// `true` when the activity may run without further approval.
    pub authorized: bool,
    pub reason: String,
    pub required_approvals: BTreeSet<ApprovalRole>,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            authorized: true,
            reason: reason.into(),
            required_approvals: BTreeSet::new(),
        }
    }

    fn require(reason: impl Into<String>, roles: &[ApprovalRole]) -> Self {
        Self {
            authorized: false,
            reason: reason.into(),
            required_approvals: roles.iter().copied().collect(),
        }
    }

    /// Whether `evidence` covers every required role.
    pub fn is_satisfied_by(&self, evidence: &ApprovalEvidence) -> bool {
        self.authorized || evidence.satisfies(&self.required_approvals)
    }

    /// Required roles not present in `evidence`.
    pub fn missing(&self, evidence: &ApprovalEvidence) -> BTreeSet<ApprovalRole> {
        self.required_approvals
            .difference(&evidence.roles)
            .copied()
            .collect()
    }
}

/// Roles that approved a request, as collected by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvidence {
    pub roles: BTreeSet<ApprovalRole>,
}

impl ApprovalEvidence {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_roles(roles: impl IntoIterator<Item = ApprovalRole>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn satisfies(&self, required: &BTreeSet<ApprovalRole>) -> bool {
        required.is_subset(&self.roles)
    }
}

/// Static decision table over activity types.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuorumAuthorizer;

impl QuorumAuthorizer {
    pub fn new() -> Self {
        Self
    }

    /// Classify an activity. Parameters do not influence the decision.
    pub fn authorize(&self, activity_type: &ActivityType, _parameters: &Value) -> AuthorizationDecision {
        use ApprovalRole::{Admin, SecurityOfficer, Treasurer};

        match activity_type {
            ActivityType::CreateWallet
            | ActivityType::DeleteWallet
            | ActivityType::CreatePrivateKey
            | ActivityType::DeletePrivateKey => AuthorizationDecision::require(
                format!("{activity_type} requires quorum approval"),
                &[Admin, SecurityOfficer],
            ),
            ActivityType::SignTransaction => AuthorizationDecision::require(
                format!("{activity_type} requires treasury approval"),
                &[Admin, Treasurer],
            ),
            other => AuthorizationDecision::allow(format!("{other} is a read operation")),
        }
    }
}
