// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custody Data Models
//!
//! Domain records persisted by the storage layer and the request types
//! accepted by the services.
//!
//! ## Model Categories
//!
//! - **Organizations**: tenant root plus its root quorum
//! - **Wallets**: HD wallet (encrypted seed) and its derived accounts
//! - **Private keys**: additional keys derived under a wallet's seed
//! - **Activities**: audit records of state-changing requests
//!
//! Request types keep curves as plain strings so that an unknown curve is
//! reported as a validation error by the service that receives it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enclave::DerivationPath;
use crate::error::{CustodyError, CustodyResult};

/// Longest accepted identifier (organization, wallet, key, user ids).
pub const MAX_ID_LEN: usize = 64;

/// Longest accepted resource name.
pub const MAX_NAME_LEN: usize = 256;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

// =============================================================================
// Identifiers & Names
// =============================================================================

/// Validate an identifier: 1..=64 characters of `[A-Za-z0-9_-]`.
///
/// Generated ids are UUIDv4 strings, which satisfy this format.
pub fn validate_identifier(kind: &str, value: &str) -> CustodyResult<()> {
    if value.is_empty() || value.len() > MAX_ID_LEN {
        return Err(CustodyError::validation(format!(
            "invalid {kind}: must be 1-{MAX_ID_LEN} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CustodyError::validation(format!(
            "invalid {kind}: only letters, digits, '-' and '_' are allowed"
        )));
    }
    Ok(())
}

/// Validate and trim a human-readable name.
pub fn normalize_name(kind: &str, value: &str) -> CustodyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CustodyError::validation(format!("{kind} name is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CustodyError::validation(format!(
            "{kind} name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim tags, drop blanks and duplicates while keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Curves
// =============================================================================

/// Elliptic curve used for derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    /// Ethereum-style chains
    #[serde(rename = "SECP256K1")]
    Secp256k1,
    /// Solana-style chains
    #[serde(rename = "ED25519")]
    Ed25519,
}

impl Curve {
    /// Parse a curve name as it appears in requests (case-insensitive,
    /// optional `CURVE_` prefix).
    pub fn parse(s: &str) -> CustodyResult<Curve> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("CURVE_").unwrap_or(&upper) {
            "SECP256K1" => Ok(Curve::Secp256k1),
            "ED25519" => Ok(Curve::Ed25519),
            _ => Err(CustodyError::validation(format!(
                "invalid curve {s:?}: expected SECP256K1 or ED25519"
            ))),
        }
    }

    /// BIP44 coin type used when synthesizing derivation paths.
    pub fn coin_type(self) -> u32 {
        match self {
            Curve::Secp256k1 => 60,
            Curve::Ed25519 => 501,
        }
    }

    /// Name used on the enclave wire protocol.
    pub fn wire_name(self) -> &'static str {
        match self {
            Curve::Secp256k1 => "secp256k1",
            Curve::Ed25519 => "ed25519",
        }
    }

    pub fn address_format(self) -> AddressFormat {
        match self {
            Curve::Secp256k1 => AddressFormat::Ethereum,
            Curve::Ed25519 => AddressFormat::Solana,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Secp256k1 => write!(f, "SECP256K1"),
            Curve::Ed25519 => write!(f, "ED25519"),
        }
    }
}

/// Address encoding of a derived account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFormat {
    #[serde(rename = "ADDRESS_FORMAT_ETHEREUM")]
    Ethereum,
    #[serde(rename = "ADDRESS_FORMAT_SOLANA")]
    Solana,
}

// =============================================================================
// Encrypted Seed
// =============================================================================

/// Hex-encoded seed blob encrypted by the enclave.
///
/// Never decrypted outside the enclave. `Debug` only shows the length.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSeed(String);

impl EncryptedSeed {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the blob is non-empty hex (what the enclave hands out).
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && hex::decode(&self.0).is_ok()
    }
}

impl fmt::Debug for EncryptedSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedSeed(<{} chars>)", self.0.len())
    }
}

// =============================================================================
// Organizations
// =============================================================================

/// Members and minimum approval count for sensitive actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootQuorum {
    pub member_ids: BTreeSet<String>,
    pub threshold: u32,
}

impl RootQuorum {
    /// Build a quorum, enforcing `threshold > 0` and `|members| >= threshold`.
    pub fn new(member_ids: &[String], threshold: u32) -> CustodyResult<Self> {
        let mut members = BTreeSet::new();
        for id in member_ids {
            let id = id.trim();
            validate_identifier("quorum member id", id)?;
            members.insert(id.to_string());
        }
        if threshold == 0 {
            return Err(CustodyError::validation("quorum threshold must be greater than zero"));
        }
        if members.len() < threshold as usize {
            return Err(CustodyError::validation(format!(
                "quorum threshold {threshold} exceeds the {} distinct member(s)",
                members.len()
            )));
        }
        Ok(Self {
            member_ids: members,
            threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub root_quorum: RootQuorum,
    pub created_at: DateTime<Utc>,
}

/// Request to create an organization together with its root quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganization {
    /// Caller-chosen id; a UUIDv4 is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub member_ids: Vec<String>,
    pub threshold: u32,
}

// =============================================================================
// Wallets
// =============================================================================

/// One derived address of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub id: String,
    pub wallet_id: String,
    pub derivation_path: DerivationPath,
    pub curve: Curve,
    pub address: String,
    /// The address-derivation protocol does not return public keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub address_format: AddressFormat,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// HD wallet. Owns its accounts; both are created and deleted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub encrypted_seed: EncryptedSeed,
    /// Address of account 0, not a public key: `derive-address` returns no
    /// public key, so the account's address is what identifies the wallet.
    pub display_public_key: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accounts: Vec<WalletAccount>,
}

/// One account to derive when creating a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub curve: String,
    /// Explicit BIP32 path; synthesized from the curve and position if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl AccountSpec {
    pub fn new(curve: impl Into<String>) -> Self {
        Self {
            curve: curve.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletRequest {
    pub organization_id: String,
    pub name: String,
    pub accounts: Vec<AccountSpec>,
    pub mnemonic_length: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Result of a successful wallet creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedWallet {
    pub wallet: Wallet,
    /// Addresses in the same order as the requested accounts.
    pub derived_addresses: Vec<String>,
}

// =============================================================================
// Private Keys
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    pub id: String,
    pub organization_id: String,
    /// Lookup-only reference to the wallet whose seed was used.
    pub wallet_id: String,
    pub name: String,
    pub curve: Curve,
    pub derivation_path: DerivationPath,
    pub derivation_index: u32,
    pub public_key: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrivateKeyRequest {
    pub organization_id: String,
    pub wallet_id: String,
    pub name: String,
    pub curve: String,
    /// Plaintext key material to import. Always rejected; never recorded.
    #[serde(default, skip_serializing)]
    pub import_material: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// =============================================================================
// Activities
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Pending,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActivityStatus::Pending)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityStatus::Pending => write!(f, "PENDING"),
            ActivityStatus::Completed => write!(f, "COMPLETED"),
            ActivityStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Kind of request an activity records.
///
/// Unknown type names are kept verbatim in `Other` so that the authorizer
/// can classify them as reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    CreateOrganization,
    CreateWallet,
    DeleteWallet,
    CreatePrivateKey,
    DeletePrivateKey,
    SignTransaction,
    GetOrganization,
    GetWallet,
    ListWallets,
    GetPrivateKey,
    ListPrivateKeys,
    GetActivity,
    ListActivities,
    ValidateSeed,
    Other(String),
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::CreateOrganization => "CREATE_ORGANIZATION",
            ActivityType::CreateWallet => "CREATE_WALLET",
            ActivityType::DeleteWallet => "DELETE_WALLET",
            ActivityType::CreatePrivateKey => "CREATE_PRIVATE_KEY",
            ActivityType::DeletePrivateKey => "DELETE_PRIVATE_KEY",
            ActivityType::SignTransaction => "SIGN_TRANSACTION",
            ActivityType::GetOrganization => "GET_ORGANIZATION",
            ActivityType::GetWallet => "GET_WALLET",
            ActivityType::ListWallets => "LIST_WALLETS",
            ActivityType::GetPrivateKey => "GET_PRIVATE_KEY",
            ActivityType::ListPrivateKeys => "LIST_PRIVATE_KEYS",
            ActivityType::GetActivity => "GET_ACTIVITY",
            ActivityType::ListActivities => "LIST_ACTIVITIES",
            ActivityType::ValidateSeed => "VALIDATE_SEED",
            ActivityType::Other(name) => name,
        }
    }
}

impl From<&str> for ActivityType {
    fn from(s: &str) -> Self {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("ACTIVITY_TYPE_").unwrap_or(&upper) {
            "CREATE_ORGANIZATION" => ActivityType::CreateOrganization,
            "CREATE_WALLET" => ActivityType::CreateWallet,
            "DELETE_WALLET" => ActivityType::DeleteWallet,
            "CREATE_PRIVATE_KEY" => ActivityType::CreatePrivateKey,
            "DELETE_PRIVATE_KEY" => ActivityType::DeletePrivateKey,
            "SIGN_TRANSACTION" => ActivityType::SignTransaction,
            "GET_ORGANIZATION" => ActivityType::GetOrganization,
            "GET_WALLET" => ActivityType::GetWallet,
            "LIST_WALLETS" => ActivityType::ListWallets,
            "GET_PRIVATE_KEY" => ActivityType::GetPrivateKey,
            "LIST_PRIVATE_KEYS" => ActivityType::ListPrivateKeys,
            "GET_ACTIVITY" => ActivityType::GetActivity,
            "LIST_ACTIVITIES" => ActivityType::ListActivities,
            "VALIDATE_SEED" => ActivityType::ValidateSeed,
            other => ActivityType::Other(other.to_string()),
        }
    }
}

impl From<String> for ActivityType {
    fn from(s: String) -> Self {
        ActivityType::from(s.as_str())
    }
}

impl From<ActivityType> for String {
    fn from(t: ActivityType) -> Self {
        t.as_str().to_string()
    }
}

impl FromStr for ActivityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ActivityType::from(s))
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit correlation data for an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Hex SHA-256 over type + canonical parameters.
    pub fingerprint: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub organization_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub intent: Intent,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Pagination
// =============================================================================

/// Cursor page request. `page_token` is the id of the last item of the
/// previous page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size: Some(page_size),
            page_token: None,
        }
    }

    pub fn after(page_size: u32, token: impl Into<String>) -> Self {
        Self {
            page_size: Some(page_size),
            page_token: Some(token.into()),
        }
    }

    /// Resolve to `(limit, cursor)`, enforcing `1..=100` (default 10).
    /// An empty token is the same as none.
    pub fn resolve(&self) -> CustodyResult<(usize, Option<&str>)> {
        let limit = match self.page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(size) if (1..=MAX_PAGE_SIZE as u32).contains(&size) => size as usize,
            Some(size) => {
                return Err(CustodyError::validation(format!(
                    "page size {size} out of range 1-{MAX_PAGE_SIZE}"
                )))
            }
        };
        let token = self.page_token.as_deref().filter(|t| !t.is_empty());
        Ok((limit, token))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Empty on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}
