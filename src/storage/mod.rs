// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custody Storage
//!
//! Persistent storage in a single embedded redb file under `DATA_DIR`.
//!
//! ## Guarantees
//!
//! - A wallet and all of its accounts commit together or not at all
//! - Organization and quorum member rows commit together
//! - A private key commits together with the advance of its wallet's key
//!   index counter
//! - Listing order is creation order, tracked by per-entity sequences
//!
//! Seeds are stored exactly as the enclave returned them (encrypted blobs).

pub mod database;
pub mod repository;

pub use database::{CustodyDatabase, StoreError, StoreResult};
pub use repository::{
    ActivityRepository, OrganizationRepository, PrivateKeyRepository, WalletRepository,
};
