// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Module
//!
//! Quorum classification of custody activities.
//!
//! ## Policy
//!
//! - Wallet and private key creation/deletion need `admin` + `security_officer`
//! - Transaction signing needs `admin` + `treasurer`
//! - Every other activity type is a read and is allowed outright
//!
//! The decision is static and does not count approvals against an
//! organization's quorum threshold.

pub mod quorum;
pub mod roles;

pub use quorum::{ApprovalEvidence, AuthorizationDecision, QuorumAuthorizer};
pub use roles::ApprovalRole;
