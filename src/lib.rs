// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Custody Core - Enclave-backed HD wallet orchestration
//!
//! This crate turns custody requests (organizations, HD wallets, derived
//! private keys) into persisted resources. All seed generation and key
//! derivation happens inside the enclave; this crate only ever handles
//! encrypted seed blobs and public material.
//!
//! ## Modules
//!
//! - `auth` - Approval roles and quorum classification
//! - `enclave` - Wire protocol client for the signing enclave
//! - `services` - Wallet/private-key orchestration and the activity ledger
//! - `storage` - Embedded ACID storage (redb)

pub mod auth;
pub mod config;
pub mod enclave;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use error::{CustodyError, CustodyResult};
pub use services::CustodyService;
