//! Builder for GeneSetDb
//!
//! All constructors and most mutations collapse their input into a builder
//! and call [`GeneSetDbBuilder::build`], which lays out the relations in
//! canonical order and validates them. That keeps a single code path
//! responsible for the invariants.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = GeneSetDbBuilder::new();
//! builder.add_member("KEGG", "hsa04110", "1017");
//! builder.add_member("KEGG", "hsa04110", "1019");
//! builder.set_metadata("KEGG", "hsa04110", "description", "Cell cycle".into());
//! let gdb = builder.build()?;
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use super::genesetdb::{FeatureIdMap, Membership, SetTable, RESERVED_SET_COLUMNS};
use super::{CollectionMetadata, GeneSetDb, MetadataValue, UrlFunction, Value, URL_FUNCTION_KEY};
use crate::error::{GeneSetError, Result};
use crate::key::GeneSetKey;

#[derive(Debug, Default)]
struct PendingSet {
    /// Aligned to `set_columns`; may be shorter, missing cells are null
    metadata: Vec<Value>,
    members: Vec<usize>,
    /// Per member, aligned to `member_columns`; may be shorter
    member_values: Vec<Vec<Value>>,
    seen: HashSet<usize>,
}

/// Accumulates gene sets, members and annotations before building a [`GeneSetDb`]
#[derive(Debug, Default)]
pub struct GeneSetDbBuilder {
    set_columns: Vec<String>,
    member_columns: Vec<String>,
    sets: BTreeMap<GeneSetKey, PendingSet>,
    feature_ids: Vec<String>,
    x_ids: Vec<Option<String>>,
    feature_index: HashMap<String, usize>,
    collections: CollectionMetadata,
}

impl GeneSetDbBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a set-level column and return its position
    pub fn set_column(&mut self, name: &str) -> usize {
        match self.set_columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.set_columns.push(name.to_string());
                self.set_columns.len() - 1
            }
        }
    }

    /// Register a member-level column and return its position
    pub fn member_column(&mut self, name: &str) -> usize {
        match self.member_columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.member_columns.push(name.to_string());
                self.member_columns.len() - 1
            }
        }
    }

    /// Ensure a (possibly empty) gene set exists
    pub fn add_gene_set(&mut self, collection: &str, name: &str) -> &mut Self {
        self.sets.entry(GeneSetKey::new(collection, name)).or_default();
        self
    }

    /// Ensure a feature id exists in the feature map and return its index
    ///
    /// The first `x_id` given for a feature is kept; new features default to
    /// the identity mapping.
    pub fn add_feature(&mut self, feature_id: &str, x_id: Option<&str>) -> usize {
        if let Some(&i) = self.feature_index.get(feature_id) {
            return i;
        }
        let i = self.feature_ids.len();
        self.feature_ids.push(feature_id.to_string());
        self.x_ids.push(Some(x_id.unwrap_or(feature_id).to_string()));
        self.feature_index.insert(feature_id.to_string(), i);
        i
    }

    /// Register a feature whose mapping into the target space may be absent
    pub(crate) fn add_feature_mapping(&mut self, feature_id: &str, x_id: Option<&str>) -> usize {
        if let Some(&i) = self.feature_index.get(feature_id) {
            if self.x_ids[i].as_deref() != x_id {
                log::warn!(
                    "Feature '{}' maps to both {:?} and {:?}; keeping the first",
                    feature_id,
                    self.x_ids[i],
                    x_id
                );
            }
            return i;
        }
        let i = self.add_feature(feature_id, None);
        self.x_ids[i] = x_id.map(str::to_string);
        i
    }

    /// Add a member to a set; returns false if it was already there
    pub fn add_member(&mut self, collection: &str, name: &str, feature_id: &str) -> bool {
        self.add_member_with(&GeneSetKey::new(collection, name), feature_id, &[])
    }

    /// Add a member with member-level values given as `(column position, value)`
    ///
    /// Duplicates keep the first-seen row and its values.
    pub fn add_member_with(
        &mut self,
        key: &GeneSetKey,
        feature_id: &str,
        values: &[(usize, Value)],
    ) -> bool {
        let f = self.add_feature(feature_id, None);
        let set = self.sets.entry(key.clone()).or_default();
        if !set.seen.insert(f) {
            log::debug!("Duplicate member '{}' of '{}' dropped", feature_id, key);
            return false;
        }
        let mut row = Vec::new();
        for (col, value) in values {
            if row.len() <= *col {
                row.resize(col + 1, Value::Null);
            }
            row[*col] = value.clone();
        }
        set.members.push(f);
        set.member_values.push(row);
        true
    }

    /// Set a set-level value; creates the set and column as needed
    ///
    /// Unless `overwrite` is true an existing non-null value is kept.
    pub fn set_metadata_value(&mut self, key: &GeneSetKey, column: &str, value: Value, overwrite: bool) {
        let col = self.set_column(column);
        let set = self.sets.entry(key.clone()).or_default();
        if set.metadata.len() <= col {
            set.metadata.resize(col + 1, Value::Null);
        }
        if overwrite || set.metadata[col].is_null() {
            set.metadata[col] = value;
        }
    }

    /// Set a set-level value, overwriting any previous one
    pub fn set_metadata(&mut self, collection: &str, name: &str, column: &str, value: Value) -> &mut Self {
        self.set_metadata_value(&GeneSetKey::new(collection, name), column, value, true);
        self
    }

    /// Add a collection-level metadata entry
    pub fn collection_metadata(&mut self, collection: &str, key: &str, value: MetadataValue) -> Result<&mut Self> {
        self.collections.insert(collection, key, value)?;
        Ok(self)
    }

    /// Seed collection metadata wholesale
    pub(crate) fn with_collections(&mut self, collections: CollectionMetadata) -> &mut Self {
        self.collections = collections;
        self
    }

    /// Lay out the relations and validate them
    pub fn build(self) -> Result<GeneSetDb> {
        for name in self.set_columns.iter().chain(self.member_columns.iter()) {
            if RESERVED_SET_COLUMNS.contains(&name.as_str()) {
                return Err(GeneSetError::Construction {
                    reason: format!("column name '{}' is reserved", name),
                });
            }
        }

        let n_sets = self.sets.len();
        let n_set_cols = self.set_columns.len();
        let n_member_cols = self.member_columns.len();

        let mut sets = SetTable {
            keys: Vec::with_capacity(n_sets),
            active: vec![false; n_sets],
            size: Vec::with_capacity(n_sets),
            n: vec![None; n_sets],
            column_names: self.set_columns,
            columns: vec![Vec::with_capacity(n_sets); n_set_cols],
        };
        let mut members = Membership {
            offsets: Vec::with_capacity(n_sets + 1),
            features: Vec::new(),
            column_names: self.member_columns,
            columns: vec![Vec::new(); n_member_cols],
        };
        members.offsets.push(0);

        let mut collections = self.collections;
        for (key, pending) in self.sets {
            collections.insert_missing(&key.collection, URL_FUNCTION_KEY, MetadataValue::Url(UrlFunction::None));

            for (c, column) in sets.columns.iter_mut().enumerate() {
                column.push(pending.metadata.get(c).cloned().unwrap_or(Value::Null));
            }
            sets.size.push(pending.members.len());
            sets.keys.push(key);

            for (f, row) in pending.members.iter().zip(pending.member_values.iter()) {
                members.features.push(*f);
                for (c, column) in members.columns.iter_mut().enumerate() {
                    column.push(row.get(c).cloned().unwrap_or(Value::Null));
                }
            }
            members.offsets.push(members.features.len());
        }

        let n_features = self.feature_ids.len();
        let features = FeatureIdMap {
            feature_id: self.feature_ids,
            x_id: self.x_ids,
            x_idx: vec![None; n_features],
        };

        let mut db = GeneSetDb {
            sets,
            members,
            features,
            collections,
            set_index: HashMap::new(),
            feature_index: HashMap::new(),
            conformed: None,
        };
        db.reindex();
        db.validate()?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_orders_and_dedups() {
        let mut builder = GeneSetDbBuilder::new();
        builder.add_member("c2", "Z", "g1");
        builder.add_member("c1", "B", "g2");
        builder.add_member("c1", "A", "g3");
        assert!(!builder.add_member("c1", "A", "g3"));
        let db = builder.build().unwrap();

        let keys: Vec<String> = db.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["c1;;A", "c1;;B", "c2;;Z"]);
        assert_eq!(db.n_members(), 3);
        // feature map keeps first-appearance order
        assert_eq!(db.feature_id_map()[0].feature_id, "g1");
    }

    #[test]
    fn test_builder_metadata_and_defaults() {
        let mut builder = GeneSetDbBuilder::new();
        builder.add_member("c1", "A", "g1");
        builder.add_member("c1", "B", "g1");
        builder.set_metadata("c1", "A", "description", Value::from("first"));
        let db = builder.build().unwrap();

        assert_eq!(db.set_columns(), &["description".to_string()]);
        assert_eq!(db.sets.columns[0], vec![Value::from("first"), Value::Null]);
        assert_eq!(db.collection_metadata().url_function("c1"), &UrlFunction::None);
    }

    #[test]
    fn test_builder_rejects_reserved_columns() {
        let mut builder = GeneSetDbBuilder::new();
        builder.add_member("c1", "A", "g1");
        builder.set_metadata("c1", "A", "active", Value::Bool(true));
        assert!(matches!(builder.build(), Err(GeneSetError::Construction { .. })));
    }

    #[test]
    fn test_member_values_padding() {
        let mut builder = GeneSetDbBuilder::new();
        let sign = builder.member_column("sign");
        let key = GeneSetKey::new("c1", "A");
        builder.add_member_with(&key, "g1", &[(sign, Value::from("up"))]);
        builder.add_member_with(&key, "g2", &[]);
        let db = builder.build().unwrap();
        assert_eq!(db.members.columns[0], vec![Value::from("up"), Value::Null]);
    }
}
