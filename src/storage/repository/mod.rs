// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the custody database.
//!
//! Each repository borrows the [`CustodyDatabase`](super::CustodyDatabase) and
//! runs every multi-row change in a single redb write transaction.

pub mod activities;
pub mod organizations;
pub mod private_keys;
pub mod wallets;

pub use activities::ActivityRepository;
pub use organizations::OrganizationRepository;
pub use private_keys::PrivateKeyRepository;
pub use wallets::WalletRepository;
