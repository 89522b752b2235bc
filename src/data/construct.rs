//! Constructing a GeneSetDb from gene-set source data
//!
//! Every input shape collapses into a long-form table first; the table is
//! then cleaned (null feature ids dropped, duplicate triples removed with
//! first-seen winning) and its extra columns are split into set-level and
//! member-level annotations.

use std::collections::{HashMap, HashSet};

use super::table::{COLLECTION_COL, FEATURE_ID_COL, NAME_COL};
use super::{GeneSetDb, GeneSetDbBuilder, LongTable, Value};
use crate::error::{GeneSetError, Result};
use crate::key::GeneSetKey;

/// Where an extra input column ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLevel {
    /// Constant within every (collection, name) group
    Set,
    /// Varies within at least one group
    Member,
}

impl GeneSetDb {
    /// Build from a long-form table
    ///
    /// The table needs `name` and `feature_id` columns, and a `collection`
    /// column unless `default_collection` is given. When both are present the
    /// column wins.
    pub fn from_table(table: &LongTable, default_collection: Option<&str>) -> Result<Self> {
        table.validate_shape().map_err(|e| GeneSetError::Construction {
            reason: e.to_string(),
        })?;

        let names = required_column(table, NAME_COL)?;
        let feature_ids = required_column(table, FEATURE_ID_COL)?;
        let collections = match (table.column(COLLECTION_COL), default_collection) {
            (Some(col), default) => {
                if default.is_some() {
                    log::warn!("Input has a '{}' column; ignoring the default collection", COLLECTION_COL);
                }
                CollectionSource::Column(col)
            }
            (None, Some(c)) => CollectionSource::Fixed(c),
            (None, None) => {
                return Err(GeneSetError::Construction {
                    reason: format!(
                        "ambiguous collection: input has no '{}' column and no collection name was given",
                        COLLECTION_COL
                    ),
                });
            }
        };

        // Clean rows: drop null feature ids, dedup triples (first seen wins)
        let mut keys: Vec<GeneSetKey> = Vec::with_capacity(table.n_rows());
        let mut features: Vec<String> = Vec::with_capacity(table.n_rows());
        let mut kept: Vec<usize> = Vec::with_capacity(table.n_rows());
        let mut seen: HashSet<(GeneSetKey, String)> = HashSet::new();
        let mut n_null = 0usize;
        let mut n_dup = 0usize;

        for row in 0..table.n_rows() {
            let feature = match &feature_ids[row] {
                Value::Null => {
                    n_null += 1;
                    continue;
                }
                v => v.to_string(),
            };
            let collection = collections.at(row)?;
            let name = match &names[row] {
                Value::Null => {
                    return Err(GeneSetError::Construction {
                        reason: format!("row {} has no gene set name", row + 1),
                    });
                }
                v => v.to_string(),
            };
            let key = GeneSetKey::new(collection, name);
            if !seen.insert((key.clone(), feature.clone())) {
                n_dup += 1;
                continue;
            }
            keys.push(key);
            features.push(feature);
            kept.push(row);
        }

        if n_null > 0 {
            log::warn!("Dropped {} rows with a missing feature_id", n_null);
        }
        if n_dup > 0 {
            log::debug!("Dropped {} duplicate (collection, name, feature_id) rows", n_dup);
        }

        let extra: Vec<(&str, &[Value])> = table
            .columns()
            .filter(|(n, _)| ![COLLECTION_COL, NAME_COL, FEATURE_ID_COL].contains(n))
            .collect();

        let mut builder = GeneSetDbBuilder::new();
        let mut set_cols: Vec<(usize, &[Value], &str)> = Vec::new();
        let mut member_cols: Vec<(usize, &[Value])> = Vec::new();
        for &(name, values) in &extra {
            match classify_column(&keys, &kept, values) {
                ColumnLevel::Set => set_cols.push((builder.set_column(name), values, name)),
                ColumnLevel::Member => member_cols.push((builder.member_column(name), values)),
            }
        }

        for (i, (key, feature)) in keys.iter().zip(features.iter()).enumerate() {
            let row = kept[i];
            let values: Vec<(usize, Value)> = member_cols
                .iter()
                .map(|(col, values)| (*col, values[row].clone()))
                .collect();
            builder.add_member_with(key, feature, &values);
            for (_, values, name) in &set_cols {
                builder.set_metadata_value(key, name, values[row].clone(), false);
            }
        }

        builder.build()
    }

    /// Build a single collection from `(name, feature ids)` pairs
    pub fn from_sets<I, N, F, S>(collection: &str, sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, F)>,
        N: AsRef<str>,
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_collections(std::iter::once((collection, sets)))
    }

    /// Build from a nested `collection -> (name -> feature ids)` structure
    pub fn from_collections<I, C, J, N, F, S>(collections: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, J)>,
        C: AsRef<str>,
        J: IntoIterator<Item = (N, F)>,
        N: AsRef<str>,
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GeneSetDbBuilder::new();
        for (collection, sets) in collections {
            for (name, ids) in sets {
                builder.add_gene_set(collection.as_ref(), name.as_ref());
                for id in ids {
                    builder.add_member(collection.as_ref(), name.as_ref(), id.as_ref());
                }
            }
        }
        builder.build()
    }

    /// Build from `(collection, name, feature_id)` records
    pub fn from_records<I, C, N, F>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, N, F)>,
        C: AsRef<str>,
        N: AsRef<str>,
        F: AsRef<str>,
    {
        let mut builder = GeneSetDbBuilder::new();
        for (collection, name, feature) in records {
            builder.add_member(collection.as_ref(), name.as_ref(), feature.as_ref());
        }
        builder.build()
    }
}

enum CollectionSource<'a> {
    Column(&'a [Value]),
    Fixed(&'a str),
}

impl CollectionSource<'_> {
    fn at(&self, row: usize) -> Result<String> {
        match self {
            CollectionSource::Fixed(c) => Ok(c.to_string()),
            CollectionSource::Column(col) => match &col[row] {
                Value::Null => Err(GeneSetError::Construction {
                    reason: format!("row {} has no collection", row + 1),
                }),
                v => Ok(v.to_string()),
            },
        }
    }
}

fn required_column<'a>(table: &'a LongTable, name: &str) -> Result<&'a [Value]> {
    table.column(name).ok_or_else(|| GeneSetError::Construction {
        reason: format!("required column '{}' is missing", name),
    })
}

/// Decide whether a column is constant within every gene set
///
/// `keys[i]` is the set of cleaned row `i`, which came from input row `rows[i]`.
pub fn classify_column(keys: &[GeneSetKey], rows: &[usize], values: &[Value]) -> ColumnLevel {
    let mut first: HashMap<&GeneSetKey, &Value> = HashMap::new();
    for (key, &row) in keys.iter().zip(rows.iter()) {
        let value = &values[row];
        match first.get(key) {
            Some(&v) if v != value => return ColumnLevel::Member,
            Some(_) => {}
            None => {
                first.insert(key, value);
            }
        }
    }
    ColumnLevel::Set
}
