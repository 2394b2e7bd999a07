// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody services. [`CustodyService`] is the entry point; the rest are its
//! building blocks and can be used on their own in tests.

mod clock;
mod custody;
mod ledger;
mod organizations;
mod private_keys;
mod wallets;

pub use clock::{Clock, FixedClock, SystemClock};
pub use custody::{CustodyService, OperationContext, Recorded};
pub use ledger::{canonical_json, fingerprint, ActivityLedger};
pub use organizations::OrganizationService;
pub use private_keys::PrivateKeyService;
pub use wallets::WalletOrchestrator;
