//! Per-collection key/value annotations

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::{GeneSetError, Result};

/// Metadata key of the URL generator every collection carries
pub const URL_FUNCTION_KEY: &str = "url_function";
/// Metadata key of the identifier type of a collection's features
pub const ID_TYPE_KEY: &str = "id_type";

/// Builds a web link for a gene set of a collection
///
/// Templates substitute `{collection}` and `{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UrlFunction {
    /// No link
    #[default]
    None,
    Template(String),
}

impl UrlFunction {
    pub fn template(pattern: impl Into<String>) -> Self {
        UrlFunction::Template(pattern.into())
    }

    pub fn url_for(&self, collection: &str, name: &str) -> Option<String> {
        match self {
            UrlFunction::None => None,
            UrlFunction::Template(pattern) => Some(
                pattern
                    .replace("{collection}", collection)
                    .replace("{name}", name),
            ),
        }
    }
}

/// Identifier space the feature ids of a collection live in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureIdType {
    Entrez,
    Ensembl,
    Symbol,
    Other(String),
}

impl fmt::Display for FeatureIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureIdType::Entrez => write!(f, "entrez"),
            FeatureIdType::Ensembl => write!(f, "ensembl"),
            FeatureIdType::Symbol => write!(f, "symbol"),
            FeatureIdType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Value stored under a collection metadata key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Url(UrlFunction),
    IdType(FeatureIdType),
    Value(Value),
}

/// The `(collection, key) -> value` relation
///
/// Keys are unique per collection by construction of the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    entries: BTreeMap<String, BTreeMap<String, MetadataValue>>,
}

impl CollectionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, collection: &str, key: &str, value: MetadataValue) -> Result<()> {
        match (key, &value) {
            (URL_FUNCTION_KEY, MetadataValue::Url(_)) | (ID_TYPE_KEY, MetadataValue::IdType(_)) => {}
            (URL_FUNCTION_KEY, _) | (ID_TYPE_KEY, _) => {
                return Err(GeneSetError::Schema {
                    reason: format!("metadata key '{}' has the wrong value type", key),
                });
            }
            _ => {}
        }
        self.entries
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Insert only if the key is not set yet
    pub(crate) fn insert_missing(&mut self, collection: &str, key: &str, value: MetadataValue) {
        self.entries
            .entry(collection.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(value);
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<&MetadataValue> {
        self.entries.get(collection).and_then(|m| m.get(key))
    }

    /// All entries of one collection
    pub fn collection(&self, collection: &str) -> Option<&BTreeMap<String, MetadataValue>> {
        self.entries.get(collection)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn contains_collection(&self, collection: &str) -> bool {
        self.entries.contains_key(collection)
    }

    /// The URL generator of a collection, falling back to the no-op
    pub fn url_function(&self, collection: &str) -> &UrlFunction {
        static NONE: UrlFunction = UrlFunction::None;
        match self.get(collection, URL_FUNCTION_KEY) {
            Some(MetadataValue::Url(f)) => f,
            _ => &NONE,
        }
    }

    pub fn id_type(&self, collection: &str) -> Option<&FeatureIdType> {
        match self.get(collection, ID_TYPE_KEY) {
            Some(MetadataValue::IdType(t)) => Some(t),
            _ => None,
        }
    }

    /// Drop collections not in `keep`
    pub(crate) fn retain(&mut self, keep: &BTreeSet<&str>) {
        self.entries.retain(|c, _| keep.contains(c.as_str()));
    }

    /// Rewrite collection labels; unmapped labels stay
    pub(crate) fn renamed(&self, mapping: &BTreeMap<String, String>) -> Result<Self> {
        let mut out = CollectionMetadata::new();
        for (collection, entries) in &self.entries {
            let target = mapping.get(collection).unwrap_or(collection);
            if out.entries.insert(target.clone(), entries.clone()).is_some() {
                return Err(GeneSetError::Schema {
                    reason: format!("renaming collections maps two collections onto '{}'", target),
                });
            }
        }
        Ok(out)
    }

    /// Union; entries already present in `self` win
    pub(crate) fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (collection, entries) in &other.entries {
            for (key, value) in entries {
                out.insert_missing(collection, key, value.clone());
            }
        }
        out
    }
}
