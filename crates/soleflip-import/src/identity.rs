//! Stable record keys and reconciliation against what is already stored.
//!
//! A key is derived from the most durable identifier a record carries:
//! manufacturer style code, then marketplace product id, then a hash of the
//! descriptive name. Ephemeral ids (variants, listings, pages) never take
//! part in the key; they are kept as [`ExternalIdentifier`]s with
//! provenance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::comparable_name;
use crate::transform::CanonicalProduct;
use crate::validate::ValidatedRecord;

const SYNTHESIZED_HASH_LEN: usize = 16;

/// An identifier some other system uses for the product.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    /// Issuing system: `stockx`, `alias`, `notion`.
    pub system: String,
    /// What the id names in that system: `product`, `variant`, `page`.
    pub kind: String,
    pub value: String,
    /// `true` when the id may change or names something narrower than the
    /// product (one size, one listing).
    pub ephemeral: bool,
}

impl ExternalIdentifier {
    #[must_use]
    pub fn stable(system: &str, kind: &str, value: impl Into<String>) -> Self {
        Self {
            system: system.to_owned(),
            kind: kind.to_owned(),
            value: value.into(),
            ephemeral: false,
        }
    }

    #[must_use]
    pub fn ephemeral(system: &str, kind: &str, value: impl Into<String>) -> Self {
        Self {
            ephemeral: true,
            ..Self::stable(system, kind, value)
        }
    }
}

/// Which link of the fallback chain produced a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    StyleCode,
    PlatformProduct,
    Synthesized,
}

impl KeySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StyleCode => "style_code",
            Self::PlatformProduct => "platform_product",
            Self::Synthesized => "synthesized",
        }
    }
}

impl FromStr for KeySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "style_code" => Ok(Self::StyleCode),
            "platform_product" => Ok(Self::PlatformProduct),
            "synthesized" => Ok(Self::Synthesized),
            other => Err(format!("unknown key source {other:?}")),
        }
    }
}

/// The internal identity of a product. Equal for the same logical item on
/// every run, whatever the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StableKey {
    value: String,
    source: KeySource,
}

impl StableKey {
    /// Rebuilds a key read back from storage.
    #[must_use]
    pub fn from_parts(value: impl Into<String>, source: KeySource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Derives the stable key for a validated record.
///
/// Style codes are used as-is (already upper-cased by validation).
/// Marketplace product ids become `stockx:<id>`. Otherwise the key is
/// `name:` plus a prefix of the SHA-256 of the comparable name, so
/// spelling variants that differ only in case or punctuation collapse.
#[must_use]
pub fn resolve(record: &ValidatedRecord) -> StableKey {
    if let Some(style) = record.style_code.as_deref().filter(|s| !s.is_empty()) {
        return StableKey::from_parts(style, KeySource::StyleCode);
    }
    if let Some(product_id) = record
        .platform_product_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return StableKey::from_parts(format!("stockx:{product_id}"), KeySource::PlatformProduct);
    }
    let digest = format!("{:x}", Sha256::digest(comparable_name(&record.name).as_bytes()));
    StableKey::from_parts(
        format!("name:{}", &digest[..SYNTHESIZED_HASH_LEN]),
        KeySource::Synthesized,
    )
}

/// What to do with an incoming product.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Insert,
    /// The merged product to store in place of the existing one.
    Update(CanonicalProduct),
    Unchanged,
}

/// Decides between insert, update and skip for `incoming`.
///
/// The merge keeps everything already stored: the existing name wins,
/// attributes are only filled in where missing, and identifiers are
/// unioned. Re-importing the same data therefore never changes a product.
#[must_use]
pub fn reconcile(existing: Option<&CanonicalProduct>, incoming: &CanonicalProduct) -> Reconciliation {
    let Some(existing) = existing else {
        return Reconciliation::Insert;
    };

    let mut merged = existing.clone();
    if merged.name.trim().is_empty() {
        merged.name.clone_from(&incoming.name);
    }
    for (key, value) in &incoming.attributes {
        merged
            .attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    merged
        .external_identifiers
        .extend(incoming.external_identifiers.iter().cloned());

    if merged == *existing {
        Reconciliation::Unchanged
    } else {
        Reconciliation::Update(merged)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
