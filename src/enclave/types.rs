// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave request/response types.
//!
//! The `*Request`/`*Response` structs mirror the HTTP+JSON wire format field
//! for field; the remaining types are what the client hands back to callers.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::models::EncryptedSeed;

// =============================================================================
// Seed strength
// =============================================================================

/// Entropy strength of a BIP39 seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeedStrength(u32);

/// (strength bits, mnemonic word count)
const STRENGTHS: [(u32, u32); 5] = [(128, 12), (160, 15), (192, 18), (224, 21), (256, 24)];

impl SeedStrength {
    pub fn from_bits(bits: u32) -> Option<Self> {
        STRENGTHS
            .iter()
            .any(|(b, _)| *b == bits)
            .then_some(Self(bits))
    }

    /// Map a mnemonic length (12/15/18/21/24 words) to its strength.
    pub fn from_mnemonic_length(words: u32) -> Option<Self> {
        STRENGTHS
            .iter()
            .find(|(_, w)| *w == words)
            .map(|(bits, _)| Self(*bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn word_count(self) -> u32 {
        STRENGTHS
            .iter()
            .find(|(b, _)| *b == self.0)
            .map(|(_, w)| *w)
            .unwrap_or_default()
    }
}

/// Whether a word count is a valid BIP39 mnemonic length.
pub fn is_valid_word_count(words: usize) -> bool {
    STRENGTHS.iter().any(|(_, w)| *w as usize == words)
}

// =============================================================================
// Seed input
// =============================================================================

/// Seed material handed to `validate_seed`, tagged by form.
#[derive(Clone, PartialEq, Eq)]
pub enum SeedInput {
    PlaintextMnemonic(String),
    EncryptedSeedBlob(EncryptedSeed),
}

impl SeedInput {
    /// Normalize and check the input before it leaves the process.
    ///
    /// Mnemonics are NFKD-normalized, lower-cased and whitespace-collapsed and
    /// must have a BIP39 word count. Blobs must be non-empty hex.
    pub fn wire_value(&self) -> Result<String, String> {
        match self {
            SeedInput::PlaintextMnemonic(phrase) => {
                let normalized: String = phrase.nfkd().collect::<String>().to_lowercase();
                let words: Vec<&str> = normalized.split_whitespace().collect();
                if !is_valid_word_count(words.len()) {
                    return Err(format!(
                        "mnemonic has {} words; expected 12, 15, 18, 21 or 24",
                        words.len()
                    ));
                }
                Ok(words.join(" "))
            }
            SeedInput::EncryptedSeedBlob(blob) => {
                if !blob.is_well_formed() {
                    return Err("encrypted seed blob must be non-empty hex".to_string());
                }
                Ok(blob.as_str().to_string())
            }
        }
    }
}

impl std::fmt::Debug for SeedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedInput::PlaintextMnemonic(_) => write!(f, "PlaintextMnemonic(<redacted>)"),
            SeedInput::EncryptedSeedBlob(blob) => write!(f, "EncryptedSeedBlob({blob:?})"),
        }
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct GenerateSeedRequest<'a> {
    pub strength: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateSeedResponse {
    pub seed_phrase: String,
    #[serde(default)]
    pub entropy: String,
    pub strength: u32,
    pub word_count: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidateSeedRequest {
    pub seed_phrase: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateSeedResponse {
    pub valid: bool,
    #[serde(default)]
    pub word_count: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeriveRequest<'a> {
    pub seed_phrase: &'a str,
    pub path: &'a str,
    pub curve: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeriveKeyResponse {
    #[serde(default)]
    pub private_key: String,
    pub public_key: String,
    pub address: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub curve: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeriveAddressResponse {
    pub address: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub curve: String,
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSeed {
    pub encrypted_seed: EncryptedSeed,
    pub entropy_digest: String,
    pub strength_bits: u32,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedValidation {
    pub is_valid: bool,
    pub word_count: u32,
    /// Only reported when an encrypted blob was compared against an
    /// encrypted reference.
    pub entropy_match: Option<bool>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// Encrypted by the enclave; callers decide whether to keep it.
    pub encrypted_private_key: Option<String>,
    pub public_key: String,
    pub address: String,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field(
                "encrypted_private_key",
                &self.encrypted_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
}

/// `GET /info` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclaveInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub enclave_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub healthy: bool,
}
