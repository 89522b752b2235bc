//! Value-returning transformations of a GeneSetDb
//!
//! Every operation copies the relations it keeps into a
//! [`GeneSetDbBuilder`], builds a fresh database and, when the source was
//! conformed, re-applies the same universe and bounds. The input is never
//! touched, so index lists built from it stay valid.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::conform::FeatureRemap;
use crate::data::{
    FeatureIdType, GeneSetDb, GeneSetDbBuilder, LongTable, MetadataValue, UrlFunction, Value,
    COLLECTION_COL, ID_TYPE_KEY, NAME_COL, RESERVED_SET_COLUMNS, URL_FUNCTION_KEY,
};
use crate::error::{GeneSetError, Result};
use crate::key::GeneSetKey;
use crate::query::{AddressMode, FeatureValues};

impl GeneSetDb {
    /// Register every feature of the map, keeping its `x_id`
    fn seed_features(&self, builder: &mut GeneSetDbBuilder) {
        for (id, x_id) in self.features.feature_id.iter().zip(self.features.x_id.iter()) {
            builder.add_feature_mapping(id, x_id.as_deref());
        }
    }

    /// Copy set rows with their members and annotations, relabelling keys
    ///
    /// Set-level columns named in `demoted` are written as member-level
    /// columns, repeating the set's value on each of its members.
    fn copy_sets<F>(
        &self,
        builder: &mut GeneSetDbBuilder,
        rows: impl IntoIterator<Item = usize>,
        demoted: &HashSet<&str>,
        relabel: F,
    ) where
        F: Fn(&GeneSetKey) -> GeneSetKey,
    {
        let member_cols: Vec<(usize, &[Value])> = self
            .members
            .column_names
            .iter()
            .zip(self.members.columns.iter())
            .map(|(c, values)| (builder.member_column(c), values.as_slice()))
            .collect();
        let mut set_cols: Vec<(&str, &[Value])> = Vec::new();
        let mut broadcast: Vec<(usize, &[Value])> = Vec::new();
        for (c, values) in self.sets.column_names.iter().zip(self.sets.columns.iter()) {
            if demoted.contains(c.as_str()) {
                broadcast.push((builder.member_column(c), values.as_slice()));
            } else {
                builder.set_column(c);
                set_cols.push((c.as_str(), values.as_slice()));
            }
        }

        for i in rows {
            let key = relabel(&self.sets.keys[i]);
            builder.add_gene_set(&key.collection, &key.name);
            for (column, values) in &set_cols {
                builder.set_metadata_value(&key, column, values[i].clone(), false);
            }
            for pos in self.member_range(i) {
                let f = self.members.features[pos];
                let values: Vec<(usize, Value)> = member_cols
                    .iter()
                    .map(|&(col, values)| (col, values[pos].clone()))
                    .chain(broadcast.iter().map(|&(col, values)| (col, values[i].clone())))
                    .collect();
                builder.add_member_with(&key, &self.features.feature_id[f], &values);
            }
        }
    }

    fn rebuild(&self, rows: impl IntoIterator<Item = usize>) -> Result<GeneSetDb> {
        let mut builder = GeneSetDbBuilder::new();
        self.seed_features(&mut builder);
        self.copy_sets(&mut builder, rows, &HashSet::new(), GeneSetKey::clone);
        builder.with_collections(self.collections.clone());
        builder.build()?.reconform(self.conformed.as_ref())
    }

    /// Keep the sets whose mask entry is true
    ///
    /// Membership of kept sets is unchanged and the feature id map is not
    /// pruned. Collections left without sets lose their metadata.
    pub fn subset(&self, mask: &[bool]) -> Result<GeneSetDb> {
        if mask.len() != self.n_sets() {
            return Err(GeneSetError::InvalidInput {
                reason: format!("subset mask has {} entries for {} gene sets", mask.len(), self.n_sets()),
            });
        }
        let rows: Vec<usize> = (0..self.n_sets()).filter(|&i| mask[i]).collect();
        let mut db = self.rebuild(rows.iter().copied())?;

        let kept: BTreeSet<&str> = rows.iter().map(|&i| self.sets.keys[i].collection.as_str()).collect();
        db.collections.retain(&kept);
        db.validate()?;
        Ok(db)
    }

    /// Keep the sets that contain at least one of the given features
    ///
    /// `Ids` are matched as feature ids or x_ids depending on `mode`;
    /// `Indices` require `XIdx` on a conformed database.
    pub fn subset_by_features(&self, features: &FeatureValues, mode: AddressMode) -> Result<GeneSetDb> {
        self.check_mode(mode)?;
        let hits: Vec<bool> = match (features, mode) {
            (FeatureValues::Ids(ids), AddressMode::FeatureId) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                self.features.feature_id.iter().map(|id| wanted.contains(id.as_str())).collect()
            }
            (FeatureValues::Ids(ids), AddressMode::XId) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                self.features
                    .x_id
                    .iter()
                    .map(|x| x.as_deref().map_or(false, |x| wanted.contains(x)))
                    .collect()
            }
            (FeatureValues::Indices(idx), AddressMode::XIdx) => {
                let wanted: HashSet<usize> = idx.iter().copied().collect();
                self.features
                    .x_idx
                    .iter()
                    .map(|x| x.map_or(false, |x| wanted.contains(&x)))
                    .collect()
            }
            _ => {
                return Err(GeneSetError::InvalidInput {
                    reason: format!("{:?} addressing does not match the given feature values", mode),
                });
            }
        };
        let mask: Vec<bool> = (0..self.n_sets())
            .map(|i| self.member_features(i).iter().any(|&f| hits[f]))
            .collect();
        self.subset(&mask)
    }

    /// Union of two databases
    ///
    /// Sets present in both get the union of their members, `self` first.
    /// Set-level values of `self` win, `other` fills its nulls and columns
    /// present on one side only are null for the other side's sets. A
    /// column that is set-level on one side and member-level on the other
    /// becomes member-level, with set values repeated on every member. The
    /// result stays conformed only if both inputs share universe and bounds.
    pub fn combine(&self, other: &GeneSetDb) -> Result<GeneSetDb> {
        let demoted: HashSet<&str> = self
            .sets
            .column_names
            .iter()
            .chain(other.sets.column_names.iter())
            .filter(|&c| self.members.column_names.contains(c) || other.members.column_names.contains(c))
            .map(String::as_str)
            .collect();
        if !demoted.is_empty() {
            log::warn!(
                "Columns {:?} are set-level in one gene set database and member-level in the other; keeping them member-level",
                demoted
            );
        }

        let mut builder = GeneSetDbBuilder::new();
        self.seed_features(&mut builder);
        other.seed_features(&mut builder);
        self.copy_sets(&mut builder, 0..self.n_sets(), &demoted, GeneSetKey::clone);
        other.copy_sets(&mut builder, 0..other.n_sets(), &demoted, GeneSetKey::clone);
        builder.with_collections(self.collections.merged(&other.collections));
        let db = builder.build()?;

        match (&self.conformed, &other.conformed) {
            (Some(a), Some(b)) if a == b => db.reconform(Some(a)),
            (None, None) => Ok(db),
            _ => {
                log::warn!("Combined gene set databases were not conformed alike; the result is unconformed");
                Ok(db)
            }
        }
    }

    /// Left-join set-level columns onto the catalog by `(collection, name)`
    ///
    /// Rows naming unknown sets are ignored. Only matched sets are
    /// overwritten; new columns are null elsewhere.
    pub fn add_set_metadata(&self, table: &LongTable) -> Result<GeneSetDb> {
        table.validate_shape().map_err(|e| GeneSetError::Schema { reason: e.to_string() })?;
        let schema = |reason: String| GeneSetError::Schema { reason };
        let collections = table
            .column(COLLECTION_COL)
            .ok_or_else(|| schema(format!("metadata table has no '{}' column", COLLECTION_COL)))?;
        let names = table
            .column(NAME_COL)
            .ok_or_else(|| schema(format!("metadata table has no '{}' column", NAME_COL)))?;

        let extra: Vec<(&str, &[Value])> = table
            .columns()
            .filter(|(n, _)| *n != COLLECTION_COL && *n != NAME_COL)
            .collect();
        for (name, _) in &extra {
            if RESERVED_SET_COLUMNS.contains(name) || self.members.column_names.iter().any(|c| c == name) {
                return Err(schema(format!("column '{}' cannot be used as set metadata", name)));
            }
        }

        let mut matched: HashMap<GeneSetKey, usize> = HashMap::new();
        let mut seen = HashSet::new();
        for row in 0..table.n_rows() {
            if collections[row].is_null() || names[row].is_null() {
                return Err(schema(format!("metadata row {} has no collection or name", row + 1)));
            }
            let key = GeneSetKey::new(collections[row].to_string(), names[row].to_string());
            if !seen.insert(key.clone()) {
                return Err(schema(format!("gene set '{}' appears more than once in the metadata table", key)));
            }
            if self.set_index.contains_key(&key) {
                matched.insert(key, row);
            }
        }
        if matched.len() < table.n_rows() {
            log::debug!(
                "{} metadata rows do not name a gene set and were ignored",
                table.n_rows() - matched.len()
            );
        }

        let mut builder = GeneSetDbBuilder::new();
        self.seed_features(&mut builder);
        self.copy_sets(&mut builder, 0..self.n_sets(), &HashSet::new(), GeneSetKey::clone);
        for (name, _) in &extra {
            builder.set_column(name);
        }
        for (key, &row) in &matched {
            for (name, values) in &extra {
                builder.set_metadata_value(key, name, values[row].clone(), true);
            }
        }
        builder.with_collections(self.collections.clone());
        builder.build()?.reconform(self.conformed.as_ref())
    }

    /// Rewrite collection labels everywhere
    ///
    /// Labels missing from `mapping` stay. Fails without side effects when
    /// two sets, or two collections, would end up under one label.
    pub fn rename_collections(&self, mapping: &BTreeMap<String, String>) -> Result<GeneSetDb> {
        let relabel = |key: &GeneSetKey| match mapping.get(&key.collection) {
            Some(target) => GeneSetKey::new(target.clone(), key.name.clone()),
            None => key.clone(),
        };

        let mut seen = HashSet::with_capacity(self.n_sets());
        for key in &self.sets.keys {
            let renamed = relabel(key);
            if !seen.insert(renamed.clone()) {
                return Err(GeneSetError::Schema {
                    reason: format!("renaming collections makes gene set '{}' ambiguous", renamed),
                });
            }
        }
        let collections = self.collections.renamed(mapping)?;

        let mut builder = GeneSetDbBuilder::new();
        self.seed_features(&mut builder);
        self.copy_sets(&mut builder, 0..self.n_sets(), &HashSet::new(), relabel);
        builder.with_collections(collections);
        builder.build()?.reconform(self.conformed.as_ref())
    }

    /// Add or replace a collection-level metadata entry
    pub fn add_collection_metadata(&self, collection: &str, key: &str, value: MetadataValue) -> Result<GeneSetDb> {
        self.collection_rows(collection)?;
        let mut db = self.clone();
        db.collections.insert(collection, key, value)?;
        db.validate()?;
        Ok(db)
    }

    pub fn set_url_function(&self, collection: &str, url_function: UrlFunction) -> Result<GeneSetDb> {
        self.add_collection_metadata(collection, URL_FUNCTION_KEY, MetadataValue::Url(url_function))
    }

    pub fn set_feature_id_type(&self, collection: &str, id_type: FeatureIdType) -> Result<GeneSetDb> {
        self.add_collection_metadata(collection, ID_TYPE_KEY, MetadataValue::IdType(id_type))
    }

    /// Replace the target-space mapping of every feature
    ///
    /// Features without an entry in `remap` get no `x_id`. The result is
    /// unconformed since the old positions no longer apply.
    pub fn remap_feature_ids(&self, remap: &FeatureRemap) -> Result<GeneSetDb> {
        let mut db = self.unconform()?;
        for (x_id, id) in db.features.x_id.iter_mut().zip(db.features.feature_id.iter()) {
            *x_id = remap.get(id).cloned();
        }
        let unmapped = db.features.x_id.iter().filter(|x| x.is_none()).count();
        if unmapped > 0 {
            log::warn!("{} of {} features have no entry in the remap", unmapped, db.n_features());
        }
        db.validate()?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conform::ConformParams;
    use crate::query::SetQuery;

    fn db() -> GeneSetDb {
        GeneSetDb::from_sets("c1", vec![("A", vec!["g1", "g2", "g3"]), ("B", vec!["g2", "g4"])]).unwrap()
    }

    fn members(db: &GeneSetDb, c: &str, n: &str) -> Vec<String> {
        db.gene_set(c, n, AddressMode::FeatureId)
            .unwrap()
            .as_ids()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_subset_to_single_set() {
        let sub = db().subset(&[true, false]).unwrap();
        assert_eq!(sub.n_sets(), 1);
        assert_eq!(members(&sub, "c1", "A"), vec!["g1", "g2", "g3"]);
        // the feature map is not pruned
        assert_eq!(sub.n_features(), 4);
        assert!(sub.feature_mapping("g4").is_some());
    }

    #[test]
    fn test_subset_closure_keeps_conform_state() {
        let gdb = db()
            .conform(&["g1", "g2", "g4", "g5"], &ConformParams::with_bounds(2, usize::MAX))
            .unwrap();
        let sub = gdb.subset(&[false, true]).unwrap();
        assert!(sub.is_conformed());
        assert_eq!(members(&sub, "c1", "B"), members(&gdb, "c1", "B"));
        assert_eq!(sub.gene_set_info("c1", "B").unwrap().n, Some(2));
        assert!(db().subset(&[true]).is_err());
    }

    #[test]
    fn test_subset_prunes_collection_metadata() {
        let both = db()
            .combine(&GeneSetDb::from_sets("c2", vec![("C", vec!["g9"])]).unwrap())
            .unwrap();
        let sub = both.subset(&[true, true, false]).unwrap();
        assert!(!sub.collection_metadata().contains_collection("c2"));
    }

    #[test]
    fn test_subset_by_features() {
        let gdb = db();
        let sub = gdb
            .subset_by_features(&FeatureValues::Ids(vec!["g4".to_string()]), AddressMode::FeatureId)
            .unwrap();
        assert_eq!(sub.keys(), &[GeneSetKey::new("c1", "B")]);
        assert!(gdb
            .subset_by_features(&FeatureValues::Indices(vec![0]), AddressMode::FeatureId)
            .is_err());
    }

    #[test]
    fn test_combine_unions_members_and_fills_columns() {
        let mut builder = GeneSetDbBuilder::new();
        builder.add_member("c1", "A", "g5");
        builder.add_member("c1", "A", "g1");
        builder.set_metadata("c1", "A", "source", Value::from("other"));
        let other = builder.build().unwrap();

        let both = db().combine(&other).unwrap();
        assert_eq!(both.n_sets(), 2);
        assert_eq!(members(&both, "c1", "A"), vec!["g1", "g2", "g3", "g5"]);
        let b = both.gene_set_info("c1", "B").unwrap();
        assert_eq!(b.metadata_value("source"), Some(&Value::Null));
        let a = both.gene_set_info("c1", "A").unwrap();
        assert_eq!(a.metadata_value("source"), Some(&Value::from("other")));
    }

    #[test]
    fn test_combine_demotes_mixed_level_columns() {
        let mut builder = GeneSetDbBuilder::new();
        builder.add_member("c1", "A", "g1");
        builder.add_member("c1", "A", "g2");
        builder.set_metadata("c1", "A", "source", Value::from("curated"));
        let set_level = builder.build().unwrap();

        let mut builder = GeneSetDbBuilder::new();
        let source = builder.member_column("source");
        let key = GeneSetKey::new("c2", "C");
        builder.add_member_with(&key, "g1", &[(source, Value::from("up"))]);
        builder.add_member_with(&key, "g3", &[(source, Value::from("down"))]);
        let member_level = builder.build().unwrap();

        let both = set_level.combine(&member_level).unwrap();
        assert!(both.set_columns().is_empty());
        assert_eq!(both.member_columns(), &["source".to_string()]);
        assert_eq!(
            both.members.columns[0],
            vec![Value::from("curated"), Value::from("curated"), Value::from("up"), Value::from("down")]
        );
        assert_eq!(member_level.combine(&set_level).unwrap().members.columns[0].len(), 4);
    }

    #[test]
    fn test_combine_conform_state() {
        let params = ConformParams::default();
        let a = db().conform(&["g1", "g2"], &params).unwrap();
        let b = GeneSetDb::from_sets("c2", vec![("C", vec!["g1"])])
            .unwrap()
            .conform(&["g1", "g2"], &params)
            .unwrap();
        assert!(a.combine(&b).unwrap().is_conformed_to(&["g1", "g2"]));
        assert!(!a.combine(&db()).unwrap().is_conformed());
    }

    #[test]
    fn test_add_set_metadata_left_join() {
        let table = LongTable::from_columns(vec![
            ("collection", vec![Value::from("c1"), Value::from("c9")]),
            ("name", vec![Value::from("B"), Value::from("X")]),
            ("description", vec![Value::from("second"), Value::from("unknown")]),
        ])
        .unwrap();
        let gdb = db().add_set_metadata(&table).unwrap();
        assert_eq!(gdb.set_columns(), &["description".to_string()]);
        assert_eq!(
            gdb.gene_set_info("c1", "B").unwrap().metadata_value("description"),
            Some(&Value::from("second"))
        );
        assert_eq!(
            gdb.gene_set_info("c1", "A").unwrap().metadata_value("description"),
            Some(&Value::Null)
        );
    }

    #[test]
    fn test_add_set_metadata_schema_errors() {
        let duplicated = LongTable::from_columns(vec![
            ("collection", vec![Value::from("c1"), Value::from("c1")]),
            ("name", vec![Value::from("A"), Value::from("A")]),
            ("x", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();
        assert!(matches!(db().add_set_metadata(&duplicated), Err(GeneSetError::Schema { .. })));

        let no_key = LongTable::from_columns(vec![("name", vec![Value::from("A")])]).unwrap();
        assert!(matches!(db().add_set_metadata(&no_key), Err(GeneSetError::Schema { .. })));

        let null_key = LongTable::from_columns(vec![
            ("collection", vec![Value::from("c1"), Value::Null]),
            ("name", vec![Value::from("A"), Value::from("B")]),
            ("x", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();
        assert!(matches!(db().add_set_metadata(&null_key), Err(GeneSetError::Schema { .. })));

        let reserved = LongTable::from_columns(vec![
            ("collection", vec![Value::from("c1")]),
            ("name", vec![Value::from("A")]),
            ("active", vec![Value::Bool(false)]),
        ])
        .unwrap();
        assert!(matches!(db().add_set_metadata(&reserved), Err(GeneSetError::Schema { .. })));
    }

    #[test]
    fn test_rename_collections() {
        let gdb = db().set_url_function("c1", UrlFunction::template("https://x/{name}")).unwrap();
        let mut mapping = BTreeMap::new();
        mapping.insert("c1".to_string(), "kegg".to_string());
        let renamed = gdb.rename_collections(&mapping).unwrap();
        assert!(!renamed.has_collection("c1"));
        assert_eq!(members(&renamed, "kegg", "A"), vec!["g1", "g2", "g3"]);
        assert_eq!(renamed.gene_set_url("kegg", "B").unwrap().as_deref(), Some("https://x/B"));

        // merging two collections that share a set name is rejected
        let two = gdb
            .combine(&GeneSetDb::from_sets("c2", vec![("A", vec!["g1"])]).unwrap())
            .unwrap();
        let mut clash = BTreeMap::new();
        clash.insert("c2".to_string(), "c1".to_string());
        assert!(matches!(two.rename_collections(&clash), Err(GeneSetError::Schema { .. })));
    }

    #[test]
    fn test_collection_metadata_mutations() {
        let gdb = db().set_feature_id_type("c1", FeatureIdType::Entrez).unwrap();
        assert_eq!(gdb.feature_id_type("c1").unwrap(), Some(&FeatureIdType::Entrez));
        assert!(matches!(
            gdb.set_feature_id_type("c9", FeatureIdType::Symbol),
            Err(GeneSetError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn test_remap_feature_ids() {
        let gdb = db().conform(&["g1"], &ConformParams::default()).unwrap();
        let remap: FeatureRemap = [("g1", "TP53"), ("g2", "MDM2")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let remapped = gdb.remap_feature_ids(&remap).unwrap();
        assert!(!remapped.is_conformed());
        assert_eq!(remapped.feature_mapping("g3").unwrap().x_id, None);

        let again = remapped.conform(&["MDM2", "TP53"], &ConformParams::default()).unwrap();
        let idx = again
            .feature_ids(SetQuery::Set("c1", "A"), AddressMode::XIdx, false)
            .unwrap();
        assert_eq!(idx.as_indices().unwrap(), &[1, 0]);
    }
}
