// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Approval roles for quorum-gated activities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role whose approval a sensitive activity may require.
///
/// ## Roles
///
/// - `Admin` - Approves every sensitive activity
/// - `SecurityOfficer` - Co-approves wallet and key lifecycle changes
/// - `Treasurer` - Co-approves transaction signing
///
/// Declaration order is the sort order used when roles are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRole {
    Admin,
    SecurityOfficer,
    Treasurer,
}

impl ApprovalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalRole::Admin => "admin",
            ApprovalRole::SecurityOfficer => "security_officer",
            ApprovalRole::Treasurer => "treasurer",
        }
    }

    /// Parse role from string (case-insensitive, `-` accepted for `_`).
    pub fn from_str(s: &str) -> Option<ApprovalRole> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "admin" => Some(ApprovalRole::Admin),
            "security_officer" => Some(ApprovalRole::SecurityOfficer),
            "treasurer" => Some(ApprovalRole::Treasurer),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
