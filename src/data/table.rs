//! Long-form tables: the exchange format between gene-set sources and the database

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::{GeneSetError, Result};

/// Column holding the collection label
pub const COLLECTION_COL: &str = "collection";
/// Column holding the gene set name
pub const NAME_COL: &str = "name";
/// Column holding the member feature identifier
pub const FEATURE_ID_COL: &str = "feature_id";

/// A column-oriented table with named columns of equal length
///
/// Gene-set sources hand their data over in this shape: one row per
/// `(collection, name, feature_id)` plus arbitrary annotation columns.
/// Column order carries no meaning; lookups are by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTable {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl LongTable {
    /// Create an empty table with a fixed number of rows
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Build a table from `(name, values)` pairs
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut columns = columns.into_iter().peekable();
        let n_rows = columns.peek().map(|(_, v)| v.len()).unwrap_or(0);
        let mut table = Self::new(n_rows);
        for (name, values) in columns {
            table.add_column(name, values)?;
        }
        Ok(table)
    }

    /// Add a column; its length must match the table
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_rows {
            return Err(GeneSetError::DimensionMismatch {
                expected: format!("{} values in column '{}'", self.n_rows, name),
                got: format!("{} values", values.len()),
            });
        }
        if self.has_column(&name) {
            return Err(GeneSetError::InvalidInput {
                reason: format!("duplicate column '{}'", name),
            });
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Iterate over `(name, values)` pairs in insertion order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.names
            .iter()
            .zip(self.columns.iter())
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Values of one row in column order
    pub fn row(&self, i: usize) -> Option<Vec<&Value>> {
        if i >= self.n_rows {
            return None;
        }
        Some(self.columns.iter().map(|c| &c[i]).collect())
    }

    /// Re-check shape invariants; deserialized tables bypass `add_column`
    pub(crate) fn validate_shape(&self) -> Result<()> {
        if self.names.len() != self.columns.len() {
            return Err(GeneSetError::InvalidInput {
                reason: "column names and columns differ in count".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for (name, values) in self.names.iter().zip(self.columns.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(GeneSetError::InvalidInput {
                    reason: format!("duplicate column '{}'", name),
                });
            }
            if values.len() != self.n_rows {
                return Err(GeneSetError::DimensionMismatch {
                    expected: format!("{} values in column '{}'", self.n_rows, name),
                    got: format!("{} values", values.len()),
                });
            }
        }
        Ok(())
    }
}
