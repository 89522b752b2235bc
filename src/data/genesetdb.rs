//! GeneSetDb - the indexed gene set database
//!
//! Four relations travel together in one value:
//!
//! ```text
//! GeneSetDb
//! ├── sets         one row per (collection, name): active, N, n, set-level columns
//! ├── members      CSR layout: members of set i are features[offsets[i]..offsets[i+1]]
//! ├── features     feature_id -> (x_id, x_idx)
//! └── collections  (collection, key) -> value
//! ```
//!
//! Every operation returns a new database; nothing is edited in place, so a
//! conformed database can be shared read-only between workers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use serde::Serialize;

use super::{CollectionMetadata, Value};
use crate::conform::ConformState;
use crate::error::{GeneSetError, Result};
use crate::key::GeneSetKey;

/// Column names owned by the per-set table itself
pub const RESERVED_SET_COLUMNS: [&str; 6] = ["collection", "name", "feature_id", "active", "N", "n"];

/// Per-set relation, rows sorted by (collection, name)
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SetTable {
    pub(crate) keys: Vec<GeneSetKey>,
    pub(crate) active: Vec<bool>,
    /// Original membership count (N)
    pub(crate) size: Vec<usize>,
    /// Members present in the conformed universe (n)
    pub(crate) n: Vec<Option<usize>>,
    pub(crate) column_names: Vec<String>,
    pub(crate) columns: Vec<Vec<Value>>,
}

/// Membership relation in compressed sparse row form
///
/// # Invariants
/// - `offsets.len() == n_sets + 1`, `offsets[0] == 0`, non-decreasing
/// - `offsets[n_sets] == features.len()`
/// - feature indices are unique within a set and index into the FeatureIdMap
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Membership {
    pub(crate) offsets: Vec<usize>,
    pub(crate) features: Vec<usize>,
    pub(crate) column_names: Vec<String>,
    pub(crate) columns: Vec<Vec<Value>>,
}

/// feature_id -> (x_id, x_idx)
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FeatureIdMap {
    pub(crate) feature_id: Vec<String>,
    pub(crate) x_id: Vec<Option<String>>,
    pub(crate) x_idx: Vec<Option<usize>>,
}

/// One row of the feature id map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureMapping {
    pub feature_id: String,
    pub x_id: Option<String>,
    pub x_idx: Option<usize>,
}

/// An indexed database of gene sets
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSetDb {
    pub(crate) sets: SetTable,
    pub(crate) members: Membership,
    pub(crate) features: FeatureIdMap,
    pub(crate) collections: CollectionMetadata,
    pub(crate) set_index: HashMap<GeneSetKey, usize>,
    pub(crate) feature_index: HashMap<String, usize>,
    pub(crate) conformed: Option<ConformState>,
}

impl GeneSetDb {
    /// Number of gene sets
    pub fn n_sets(&self) -> usize {
        self.sets.keys.len()
    }

    /// Number of membership rows
    pub fn n_members(&self) -> usize {
        self.members.features.len()
    }

    /// Number of rows in the feature id map
    pub fn n_features(&self) -> usize {
        self.features.feature_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_sets() == 0
    }

    /// Set keys in canonical order
    pub fn keys(&self) -> &[GeneSetKey] {
        &self.sets.keys
    }

    /// Distinct collections in canonical order
    pub fn collection_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for key in &self.sets.keys {
            if out.last() != Some(&key.collection.as_str()) {
                out.push(&key.collection);
            }
        }
        out
    }

    /// Names of set-level metadata columns
    pub fn set_columns(&self) -> &[String] {
        &self.sets.column_names
    }

    /// Names of member-level annotation columns
    pub fn member_columns(&self) -> &[String] {
        &self.members.column_names
    }

    pub fn collection_metadata(&self) -> &CollectionMetadata {
        &self.collections
    }

    /// The full feature id map
    pub fn feature_id_map(&self) -> Vec<FeatureMapping> {
        (0..self.n_features()).map(|i| self.mapping_at(i)).collect()
    }

    /// Mapping of one feature id, if it is known
    pub fn feature_mapping(&self, feature_id: &str) -> Option<FeatureMapping> {
        self.feature_index.get(feature_id).map(|&i| self.mapping_at(i))
    }

    fn mapping_at(&self, i: usize) -> FeatureMapping {
        FeatureMapping {
            feature_id: self.features.feature_id[i].clone(),
            x_id: self.features.x_id[i].clone(),
            x_idx: self.features.x_idx[i],
        }
    }

    /// Row of a set in the per-set table
    pub(crate) fn set_row(&self, collection: &str, name: &str) -> Result<usize> {
        self.set_index
            .get(&GeneSetKey::new(collection, name))
            .copied()
            .ok_or_else(|| GeneSetError::SetNotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            })
    }

    /// Rows of all sets of a collection
    pub(crate) fn collection_rows(&self, collection: &str) -> Result<Range<usize>> {
        let start = self
            .sets
            .keys
            .partition_point(|k| k.collection.as_str() < collection);
        let end = self
            .sets
            .keys
            .partition_point(|k| k.collection.as_str() <= collection);
        if start == end {
            return Err(GeneSetError::CollectionNotFound {
                collection: collection.to_string(),
            });
        }
        Ok(start..end)
    }

    /// Positions in the membership relation belonging to set row `i`
    pub(crate) fn member_range(&self, i: usize) -> Range<usize> {
        self.members.offsets[i]..self.members.offsets[i + 1]
    }

    /// Feature-map indices of the members of set row `i`
    pub(crate) fn member_features(&self, i: usize) -> &[usize] {
        &self.members.features[self.member_range(i)]
    }

    /// Check every invariant of the four relations
    ///
    /// Called at the end of every operation that produces a database.
    pub fn validate(&self) -> Result<()> {
        self.validate_sets()?;
        self.validate_members()?;
        self.validate_features()?;
        self.validate_conform_state()?;
        self.validate_collections()
    }

    fn validate_sets(&self) -> Result<()> {
        let sets = &self.sets;
        let n = sets.keys.len();
        if sets.active.len() != n || sets.size.len() != n || sets.n.len() != n {
            return Err(schema("per-set table columns differ in length"));
        }
        if sets.column_names.len() != sets.columns.len() {
            return Err(schema("per-set table column names and columns differ in count"));
        }
        for (name, values) in sets.column_names.iter().zip(sets.columns.iter()) {
            if values.len() != n {
                return Err(schema(format!("set-level column '{}' has {} rows, expected {}", name, values.len(), n)));
            }
        }
        check_column_names(&sets.column_names, "set-level")?;
        for pair in sets.keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err(schema(format!(
                    "gene set keys not unique or not in canonical order at '{}'",
                    pair[1]
                )));
            }
        }
        if self.set_index.len() != n
            || sets.keys.iter().enumerate().any(|(i, k)| self.set_index.get(k) != Some(&i))
        {
            return Err(schema("gene set key index is stale"));
        }
        Ok(())
    }

    fn validate_members(&self) -> Result<()> {
        let m = &self.members;
        let n_sets = self.n_sets();
        if m.offsets.len() != n_sets + 1 || m.offsets[0] != 0 {
            return Err(schema("membership offsets do not match the per-set table"));
        }
        if m.offsets.windows(2).any(|w| w[0] > w[1]) || m.offsets[n_sets] != m.features.len() {
            return Err(schema("membership offsets are not monotone"));
        }
        if m.column_names.len() != m.columns.len() {
            return Err(schema("membership column names and columns differ in count"));
        }
        for (name, values) in m.column_names.iter().zip(m.columns.iter()) {
            if values.len() != m.features.len() {
                return Err(schema(format!("member-level column '{}' has the wrong length", name)));
            }
        }
        check_column_names(&m.column_names, "member-level")?;
        if let Some(shared) = m.column_names.iter().find(|c| self.sets.column_names.contains(c)) {
            return Err(schema(format!("column '{}' is both set-level and member-level", shared)));
        }

        let n_features = self.n_features();
        let mut seen = HashSet::new();
        for i in 0..n_sets {
            seen.clear();
            let members = self.member_features(i);
            if members.len() != self.sets.size[i] {
                return Err(schema(format!(
                    "N of '{}' is {} but it has {} members",
                    self.sets.keys[i],
                    self.sets.size[i],
                    members.len()
                )));
            }
            for &f in members {
                if f >= n_features {
                    return Err(schema(format!("member of '{}' missing from the feature id map", self.sets.keys[i])));
                }
                if !seen.insert(f) {
                    return Err(schema(format!(
                        "duplicate feature '{}' in '{}'",
                        self.features.feature_id[f], self.sets.keys[i]
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_features(&self) -> Result<()> {
        let f = &self.features;
        let n = f.feature_id.len();
        if f.x_id.len() != n || f.x_idx.len() != n {
            return Err(schema("feature id map columns differ in length"));
        }
        if self.feature_index.len() != n
            || f.feature_id.iter().enumerate().any(|(i, id)| self.feature_index.get(id) != Some(&i))
        {
            return Err(schema("feature id map has duplicate or unindexed feature ids"));
        }
        Ok(())
    }

    fn validate_conform_state(&self) -> Result<()> {
        let Some(state) = &self.conformed else {
            if self.features.x_idx.iter().any(Option::is_some)
                || self.sets.n.iter().any(Option::is_some)
                || self.sets.active.iter().any(|&a| a)
            {
                return Err(schema("unconformed database carries conform results"));
            }
            return Ok(());
        };

        let universe = &state.universe;
        for (i, idx) in self.features.x_idx.iter().enumerate() {
            if let Some(idx) = *idx {
                let x_id = self.features.x_id[i].as_deref();
                if universe.get(idx).map(String::as_str) != x_id {
                    return Err(schema(format!(
                        "x_idx of '{}' does not point at its x_id",
                        self.features.feature_id[i]
                    )));
                }
            }
        }
        for i in 0..self.n_sets() {
            let n = self
                .member_features(i)
                .iter()
                .filter(|&&f| self.features.x_idx[f].is_some())
                .count();
            if self.sets.n[i] != Some(n) {
                return Err(schema(format!("n of '{}' is stale", self.sets.keys[i])));
            }
            if self.sets.active[i] != state.params.admits(n) {
                return Err(schema(format!("active flag of '{}' is stale", self.sets.keys[i])));
            }
        }
        Ok(())
    }

    fn validate_collections(&self) -> Result<()> {
        let collections: BTreeSet<&str> = self.sets.keys.iter().map(|k| k.collection.as_str()).collect();
        for collection in collections {
            if self.collections.get(collection, super::URL_FUNCTION_KEY).is_none() {
                return Err(schema(format!("collection '{}' has no url function entry", collection)));
            }
        }
        Ok(())
    }

    /// Rebuild the key and feature lookups after the vectors changed
    pub(crate) fn reindex(&mut self) {
        self.set_index = self
            .sets
            .keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        self.feature_index = self
            .features
            .feature_id
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
    }
}

fn schema(reason: impl Into<String>) -> GeneSetError {
    GeneSetError::Schema {
        reason: reason.into(),
    }
}

fn check_column_names(names: &[String], kind: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if RESERVED_SET_COLUMNS.contains(&name.as_str()) {
            return Err(schema(format!("{} column uses reserved name '{}'", kind, name)));
        }
        if !seen.insert(name) {
            return Err(schema(format!("duplicate {} column '{}'", kind, name)));
        }
    }
    Ok(())
}
