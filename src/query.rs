//! Read access to a GeneSetDb
//!
//! Members can be addressed in three identifier spaces: the original
//! `feature_id`, the target-space `x_id`, and the target position `x_idx`.
//! With `active_only` set, inactive sets are skipped; on a database that was
//! never conformed nothing has been deactivated, so the filter is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::{FeatureIdType, GeneSetDb, LongTable, MetadataValue, Value};
use crate::data::{COLLECTION_COL, FEATURE_ID_COL, NAME_COL};
use crate::error::{GeneSetError, Result};
use crate::key::{GeneSetKey, DEFAULT_KEY_SEP};

/// Identifier space used to report set members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressMode {
    /// Identifiers the gene sets were defined with
    FeatureId,
    /// Identifiers of the conformed universe
    XId,
    /// Positions in the conformed universe
    XIdx,
}

impl AddressMode {
    /// Column name used when exporting in this mode
    pub fn column_name(&self) -> &'static str {
        match self {
            AddressMode::FeatureId => FEATURE_ID_COL,
            AddressMode::XId => "x_id",
            AddressMode::XIdx => "x_idx",
        }
    }
}

/// Which gene sets a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetQuery<'a> {
    All,
    Collection(&'a str),
    Set(&'a str, &'a str),
}

/// Members in one of the address modes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeatureValues {
    Ids(Vec<String>),
    Indices(Vec<usize>),
}

impl FeatureValues {
    pub fn len(&self) -> usize {
        match self {
            FeatureValues::Ids(v) => v.len(),
            FeatureValues::Indices(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ids(&self) -> Option<&[String]> {
        match self {
            FeatureValues::Ids(v) => Some(v),
            FeatureValues::Indices(_) => None,
        }
    }

    pub fn as_indices(&self) -> Option<&[usize]> {
        match self {
            FeatureValues::Indices(v) => Some(v),
            FeatureValues::Ids(_) => None,
        }
    }
}

/// One row of the gene set catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneSetInfo {
    pub collection: String,
    pub name: String,
    pub active: bool,
    /// Original number of members
    #[serde(rename = "N")]
    pub size: usize,
    /// Members found in the conformed universe
    pub n: Option<usize>,
    /// Set-level metadata in column order
    pub metadata: Vec<(String, Value)>,
}

impl GeneSetInfo {
    pub fn key(&self) -> GeneSetKey {
        GeneSetKey::new(&self.collection, &self.name)
    }

    pub fn metadata_value(&self, column: &str) -> Option<&Value> {
        self.metadata.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
}

/// Set membership indicator matrix (sets x features)
#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceMatrix {
    pub sets: Vec<GeneSetKey>,
    pub features: Vec<String>,
    pub values: Array2<bool>,
}

impl IncidenceMatrix {
    /// Members per set that appear among the columns
    pub fn row_sums(&self) -> Vec<usize> {
        self.values
            .rows()
            .into_iter()
            .map(|r| r.iter().filter(|&&b| b).count())
            .collect()
    }
}

/// Members of each set keyed by the encoded set key
///
/// Entry order is the catalog order of the database the lists were built
/// from; enrichment methods rely on that correspondence.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLists {
    sep: String,
    sets: Vec<GeneSetKey>,
    keys: Vec<String>,
    members: Vec<FeatureValues>,
    lookup: HashMap<String, usize>,
}

impl IndexLists {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn sep(&self) -> &str {
        &self.sep
    }

    /// Encoded keys in catalog order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn sets(&self) -> &[GeneSetKey] {
        &self.sets
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValues> {
        self.lookup.get(key).map(|&i| &self.members[i])
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValues)> {
        self.keys.iter().map(|k| k.as_str()).zip(self.members.iter())
    }
}

impl GeneSetDb {
    /// Rows of the per-set table covered by a query
    pub(crate) fn query_rows(&self, query: SetQuery<'_>, active_only: bool) -> Result<Vec<usize>> {
        let rows: Vec<usize> = match query {
            SetQuery::All => (0..self.n_sets()).collect(),
            SetQuery::Collection(c) => self.collection_rows(c)?.collect(),
            SetQuery::Set(c, n) => vec![self.set_row(c, n)?],
        };
        if active_only && self.is_conformed() {
            Ok(rows.into_iter().filter(|&i| self.sets.active[i]).collect())
        } else {
            Ok(rows)
        }
    }

    pub(crate) fn check_mode(&self, mode: AddressMode) -> Result<()> {
        if mode == AddressMode::XIdx && !self.is_conformed() {
            return Err(GeneSetError::InvalidInput {
                reason: "x_idx addressing requires a conformed GeneSetDb".to_string(),
            });
        }
        Ok(())
    }

    /// Translate feature-map indices into an address mode, dropping repeats
    fn address(&self, features: impl IntoIterator<Item = usize>, mode: AddressMode) -> FeatureValues {
        let conformed = self.is_conformed();
        let map = &self.features;
        match mode {
            AddressMode::FeatureId => {
                let mut seen = HashSet::new();
                FeatureValues::Ids(
                    features
                        .into_iter()
                        .filter(|&f| seen.insert(f))
                        .map(|f| map.feature_id[f].clone())
                        .collect(),
                )
            }
            AddressMode::XId => {
                let mut seen = HashSet::new();
                FeatureValues::Ids(
                    features
                        .into_iter()
                        .filter(|&f| !conformed || map.x_idx[f].is_some())
                        .filter_map(|f| map.x_id[f].as_ref())
                        .filter(|x| seen.insert(x.as_str()))
                        .cloned()
                        .collect(),
                )
            }
            AddressMode::XIdx => {
                let mut seen = HashSet::new();
                FeatureValues::Indices(
                    features
                        .into_iter()
                        .filter_map(|f| map.x_idx[f])
                        .filter(|&x| seen.insert(x))
                        .collect(),
                )
            }
        }
    }

    /// Member feature ids of a set, a collection, or the whole database
    ///
    /// For collections and the whole database the distinct union is returned
    /// in canonical order. In a conformed database `XId` and `XIdx` only
    /// report members found in the universe.
    pub fn feature_ids(&self, query: SetQuery<'_>, mode: AddressMode, active_only: bool) -> Result<FeatureValues> {
        self.check_mode(mode)?;
        let rows = self.query_rows(query, active_only)?;
        let features = rows.iter().flat_map(|&i| self.member_features(i).iter().copied());
        Ok(self.address(features, mode))
    }

    /// Members of one set regardless of its active flag
    pub fn gene_set(&self, collection: &str, name: &str, mode: AddressMode) -> Result<FeatureValues> {
        self.feature_ids(SetQuery::Set(collection, name), mode, false)
    }

    /// Catalog entry of one set
    pub fn gene_set_info(&self, collection: &str, name: &str) -> Result<GeneSetInfo> {
        let i = self.set_row(collection, name)?;
        Ok(self.info_at(i))
    }

    fn info_at(&self, i: usize) -> GeneSetInfo {
        let key = &self.sets.keys[i];
        GeneSetInfo {
            collection: key.collection.clone(),
            name: key.name.clone(),
            active: self.sets.active[i],
            size: self.sets.size[i],
            n: self.sets.n[i],
            metadata: self
                .sets
                .column_names
                .iter()
                .zip(self.sets.columns.iter())
                .map(|(c, values)| (c.clone(), values[i].clone()))
                .collect(),
        }
    }

    /// The gene set catalog in canonical order
    pub fn gene_sets(&self, active_only: bool) -> Vec<GeneSetInfo> {
        (0..self.n_sets())
            .filter(|&i| !active_only || !self.is_conformed() || self.sets.active[i])
            .map(|i| self.info_at(i))
            .collect()
    }

    /// Membership indicator matrix
    ///
    /// Columns are the universe when conformed, otherwise the distinct
    /// feature ids of the selected sets in order of appearance.
    pub fn incidence_matrix(&self, active_only: bool) -> Result<IncidenceMatrix> {
        let rows = self.query_rows(SetQuery::All, active_only)?;
        let sets: Vec<GeneSetKey> = rows.iter().map(|&i| self.sets.keys[i].clone()).collect();

        if let Some(universe) = self.universe() {
            let mut values = Array2::from_elem((rows.len(), universe.len()), false);
            for (r, &i) in rows.iter().enumerate() {
                for &f in self.member_features(i) {
                    if let Some(x) = self.features.x_idx[f] {
                        values[[r, x]] = true;
                    }
                }
            }
            return Ok(IncidenceMatrix {
                sets,
                features: universe.ids().to_vec(),
                values,
            });
        }

        let mut columns: HashMap<usize, usize> = HashMap::new();
        let mut features = Vec::new();
        for &i in &rows {
            for &f in self.member_features(i) {
                columns.entry(f).or_insert_with(|| {
                    features.push(self.features.feature_id[f].clone());
                    features.len() - 1
                });
            }
        }
        let mut values = Array2::from_elem((rows.len(), features.len()), false);
        for (r, &i) in rows.iter().enumerate() {
            for f in self.member_features(i) {
                values[[r, columns[f]]] = true;
            }
        }
        Ok(IncidenceMatrix { sets, features, values })
    }

    /// Per-set member lists keyed with the default separator
    pub fn as_index_lists(&self, mode: AddressMode, active_only: bool) -> Result<IndexLists> {
        self.as_index_lists_sep(mode, active_only, DEFAULT_KEY_SEP)
    }

    /// Per-set member lists keyed with `sep`
    pub fn as_index_lists_sep(&self, mode: AddressMode, active_only: bool, sep: &str) -> Result<IndexLists> {
        self.check_mode(mode)?;
        let rows = self.query_rows(SetQuery::All, active_only)?;
        let sets: Vec<GeneSetKey> = rows.iter().map(|&i| self.sets.keys[i].clone()).collect();
        let keys: Vec<String> = sets.iter().map(|k| k.encode(sep)).collect();
        let members = rows
            .iter()
            .map(|&i| self.address(self.member_features(i).iter().copied(), mode))
            .collect();
        let lookup = keys.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();
        Ok(IndexLists {
            sep: sep.to_string(),
            sets,
            keys,
            members,
            lookup,
        })
    }

    /// Export the membership relation as a long table
    ///
    /// One row per member; in `XId`/`XIdx` mode members outside the
    /// universe are left out. Set-level columns are repeated on each of the
    /// set's rows, followed by the member-level columns. Sets without
    /// members have no row.
    pub fn to_long_table(&self, mode: AddressMode, active_only: bool) -> Result<LongTable> {
        self.check_mode(mode)?;
        let rows = self.query_rows(SetQuery::All, active_only)?;
        let conformed = self.is_conformed();
        let map = &self.features;

        let mut positions = Vec::new();
        let mut set_rows = Vec::new();
        let mut collections = Vec::new();
        let mut names = Vec::new();
        let mut ids = Vec::new();
        for &i in &rows {
            let key = &self.sets.keys[i];
            for pos in self.member_range(i) {
                let f = self.members.features[pos];
                let value = match mode {
                    AddressMode::FeatureId => Value::from(map.feature_id[f].as_str()),
                    AddressMode::XId if conformed && map.x_idx[f].is_none() => continue,
                    AddressMode::XId => match &map.x_id[f] {
                        Some(x) => Value::from(x.as_str()),
                        None => continue,
                    },
                    AddressMode::XIdx => match map.x_idx[f] {
                        Some(x) => Value::from(x),
                        None => continue,
                    },
                };
                positions.push(pos);
                set_rows.push(i);
                collections.push(Value::from(key.collection.as_str()));
                names.push(Value::from(key.name.as_str()));
                ids.push(value);
            }
        }

        let mut table = LongTable::new(positions.len());
        table.add_column(COLLECTION_COL, collections)?;
        table.add_column(NAME_COL, names)?;
        table.add_column(mode.column_name(), ids)?;
        for (name, values) in self.sets.column_names.iter().zip(self.sets.columns.iter()) {
            table.add_column(name.as_str(), set_rows.iter().map(|&i| values[i].clone()).collect())?;
        }
        for (name, values) in self.members.column_names.iter().zip(self.members.columns.iter()) {
            table.add_column(name.as_str(), positions.iter().map(|&p| values[p].clone()).collect())?;
        }
        Ok(table)
    }

    pub fn has_gene_set(&self, collection: &str, name: &str) -> bool {
        self.set_index.contains_key(&GeneSetKey::new(collection, name))
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collection_rows(collection).is_ok()
    }

    /// Web link of a gene set, built by its collection's url function
    pub fn gene_set_url(&self, collection: &str, name: &str) -> Result<Option<String>> {
        self.set_row(collection, name)?;
        Ok(self.collections.url_function(collection).url_for(collection, name))
    }

    /// Feature identifier type recorded for a collection
    pub fn feature_id_type(&self, collection: &str) -> Result<Option<&FeatureIdType>> {
        self.collection_rows(collection)?;
        Ok(self.collections.id_type(collection))
    }

    /// All metadata entries of a collection
    pub fn collection_entries(&self, collection: &str) -> Result<&BTreeMap<String, MetadataValue>> {
        self.collection_rows(collection)?;
        self.collections
            .collection(collection)
            .ok_or_else(|| GeneSetError::CollectionNotFound {
                collection: collection.to_string(),
            })
    }

    /// Metadata value of a collection
    pub fn collection_value(&self, collection: &str, key: &str) -> Result<Option<&MetadataValue>> {
        self.collection_rows(collection)?;
        Ok(self.collections.get(collection, key))
    }
}
