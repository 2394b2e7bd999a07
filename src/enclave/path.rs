// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BIP32 derivation paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Curve;

/// First hardened child index; plain indices must stay below it.
const HARDENED_OFFSET: u32 = 1 << 31;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid derivation path {path:?}: {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: &'static str,
}

/// A path matching `m(/\d+'?)+`, stored in its canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivationPath(String);

impl DerivationPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let err = |reason| PathError {
            path: raw.to_string(),
            reason,
        };

        let rest = raw.strip_prefix('m').ok_or_else(|| err("must start with 'm'"))?;
        if rest.is_empty() {
            return Err(err("at least one child index is required"));
        }

        let mut segments = rest.split('/');
        // `rest` starts with '/', so the first split piece is empty
        if segments.next() != Some("") {
            return Err(err("expected '/' after 'm'"));
        }

        // Re-rendered from the parsed indices so one node has one spelling.
        let mut canonical = String::from("m");
        for segment in segments {
            let (digits, hardened) = match segment.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (segment, false),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("each segment must be digits with an optional trailing '"));
            }
            let index = match digits.parse::<u32>() {
                Ok(index) if index < HARDENED_OFFSET => index,
                _ => return Err(err("child index must be below 2^31")),
            };
            canonical.push('/');
            canonical.push_str(&index.to_string());
            if hardened {
                canonical.push('\'');
            }
        }

        Ok(Self(canonical))
    }

    /// BIP44 external-chain path `m/44'/{coin}'/0'/0/{index}` for the curve.
    pub fn bip44(curve: Curve, index: u32) -> Self {
        Self(format!("m/44'/{}'/0'/0/{index}", curve.coin_type()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final index if this is a BIP44 external-chain path of a supported
    /// curve, i.e. one that [`DerivationPath::bip44`] can also produce.
    pub fn bip44_index(&self) -> Option<u32> {
        [Curve::Secp256k1, Curve::Ed25519].into_iter().find_map(|curve| {
            let prefix = format!("m/44'/{}'/0'/0/", curve.coin_type());
            self.0.strip_prefix(prefix.as_str())?.parse::<u32>().ok()
        })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DerivationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DerivationPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DerivationPath> for String {
    fn from(path: DerivationPath) -> Self {
        path.0
    }
}
