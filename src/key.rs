//! Compound gene set keys
//!
//! A gene set is identified by its `(collection, name)` pair. External
//! enrichment methods only see a single string per set, so the pair is
//! flattened into `"<collection><sep><name>"` and split back when results
//! come home.
//!
//! Splitting policy: the **first** occurrence of the separator is
//! authoritative. Everything before it is the collection, everything after
//! it is the name. Names may therefore contain the separator, collections
//! may not.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GeneSetError, Result};

/// Default separator placed between collection and name
pub const DEFAULT_KEY_SEP: &str = ";;";

/// The `(collection, name)` compound key of a gene set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneSetKey {
    pub collection: String,
    pub name: String,
}

impl GeneSetKey {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }

    /// Flatten into a single token
    pub fn encode(&self, sep: &str) -> String {
        encode_key(&self.collection, &self.name, sep)
    }
}

impl fmt::Display for GeneSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.collection, DEFAULT_KEY_SEP, self.name)
    }
}

/// Encode a `(collection, name)` pair
pub fn encode_key(collection: &str, name: &str, sep: &str) -> String {
    let mut key = String::with_capacity(collection.len() + sep.len() + name.len());
    key.push_str(collection);
    key.push_str(sep);
    key.push_str(name);
    key
}

/// Encode parallel slices of collections and names
pub fn encode_keys(collections: &[String], names: &[String], sep: &str) -> Result<Vec<String>> {
    if collections.len() != names.len() {
        return Err(GeneSetError::DimensionMismatch {
            expected: format!("{} names", collections.len()),
            got: format!("{} names", names.len()),
        });
    }
    Ok(collections
        .iter()
        .zip(names.iter())
        .map(|(c, n)| encode_key(c, n, sep))
        .collect())
}

/// Decode a key, splitting on the first occurrence of `sep`
pub fn decode_key(key: &str, sep: &str) -> Result<GeneSetKey> {
    if sep.is_empty() {
        return Err(GeneSetError::MalformedKey {
            key: key.to_string(),
            sep: sep.to_string(),
        });
    }
    match key.split_once(sep) {
        Some((collection, name)) => Ok(GeneSetKey::new(collection, name)),
        None => Err(GeneSetError::MalformedKey {
            key: key.to_string(),
            sep: sep.to_string(),
        }),
    }
}

/// Decode many keys; fails on the first malformed one
pub fn decode_keys<S: AsRef<str>>(keys: &[S], sep: &str) -> Result<Vec<GeneSetKey>> {
    keys.iter().map(|k| decode_key(k.as_ref(), sep)).collect()
}
