//! Validated records to the canonical product shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use soleflip_db::{ProductRow, ProductWrite};

use crate::error::StoreError;
use crate::identity::{self, ExternalIdentifier, KeySource, StableKey};
use crate::validate::ValidatedRecord;

/// The canonical entity: one product, however many sources mention it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub stable_key: StableKey,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub external_identifiers: BTreeSet<ExternalIdentifier>,
}

/// A transformed record: the product it describes plus the per-record facts
/// (order number, amounts, dates) kept for the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub product: CanonicalProduct,
    pub facts: Map<String, Value>,
}

impl CanonicalRecord {
    /// The JSON stored as the record's canonical payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "product": self.product,
            "facts": self.facts,
        })
    }
}

/// Builds the canonical product for `record`, resolving its stable key.
#[must_use]
pub fn transform(record: ValidatedRecord) -> CanonicalRecord {
    let stable_key = identity::resolve(&record);

    let mut attributes = BTreeMap::new();
    if let Some(brand) = record.brand.filter(|b| !b.trim().is_empty()) {
        attributes.insert("brand".to_owned(), brand.trim().to_owned());
    }
    if let Some(style) = record.style_code {
        attributes.insert("style_code".to_owned(), style);
    }

    let mut facts = record.facts;
    facts.insert("schema".to_owned(), Value::String(record.schema.as_str().to_owned()));

    CanonicalRecord {
        product: CanonicalProduct {
            stable_key,
            name: record.name,
            attributes,
            external_identifiers: record.identifiers.into_iter().collect(),
        },
        facts,
    }
}

impl CanonicalProduct {
    /// SHA-256 over every stored field, in a fixed order. Two products with
    /// the same hash are the same stored state.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stable_key.as_str());
        hasher.update([0u8]);
        hasher.update(self.stable_key.source().as_str());
        hasher.update([0u8]);
        hasher.update(&self.name);
        for (key, value) in &self.attributes {
            hasher.update([1u8]);
            hasher.update(key);
            hasher.update([0u8]);
            hasher.update(value);
        }
        for id in &self.external_identifiers {
            hasher.update([2u8]);
            hasher.update(&id.system);
            hasher.update([0u8]);
            hasher.update(&id.kind);
            hasher.update([0u8]);
            hasher.update(&id.value);
            hasher.update([u8::from(id.ephemeral)]);
        }
        format!("{:x}", hasher.finalize())
    }

    #[must_use]
    pub fn to_write(&self) -> ProductWrite {
        ProductWrite {
            stable_key: self.stable_key.as_str().to_owned(),
            key_source: self.stable_key.source().as_str().to_owned(),
            name: self.name.clone(),
            attributes: serde_json::to_value(&self.attributes).unwrap_or_else(|_| json!({})),
            external_identifiers: serde_json::to_value(&self.external_identifiers)
                .unwrap_or_else(|_| json!([])),
            content_hash: self.content_hash(),
        }
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a stored column does not decode.
    pub fn from_row(row: &ProductRow) -> Result<Self, StoreError> {
        let source: KeySource = row.key_source.parse().map_err(StoreError::Corrupt)?;
        let attributes = serde_json::from_value(row.attributes.clone())
            .map_err(|e| StoreError::Corrupt(format!("product {} attributes: {e}", row.stable_key)))?;
        let external_identifiers = serde_json::from_value(row.external_identifiers.clone())
            .map_err(|e| {
                StoreError::Corrupt(format!("product {} identifiers: {e}", row.stable_key))
            })?;
        Ok(Self {
            stable_key: StableKey::from_parts(row.stable_key.clone(), source),
            name: row.name.clone(),
            attributes,
            external_identifiers,
        })
    }
}
