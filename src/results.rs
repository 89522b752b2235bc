//! Enrichment results and their re-attachment to gene sets
//!
//! Methods receive anonymous index lists and hand back a numeric table whose
//! rows are either encoded set keys or positions in those lists. Before a
//! result leaves the dispatcher it is aligned to the set catalog so that row
//! `i` always describes the `i`-th active set.

use std::collections::HashSet;
use std::fmt;

use ndarray::{Array2, ArrayView1, Axis};

use crate::data::{GeneSetDb, LongTable, Value, COLLECTION_COL, NAME_COL};
use crate::error::{GeneSetError, Result};
use crate::key::{decode_key, GeneSetKey};
use crate::query::IndexLists;
use crate::testing::benjamini_hochberg;

/// Column holding nominal p-values
pub const PVAL_COL: &str = "pval";
/// Column holding adjusted p-values
pub const PADJ_COL: &str = "padj";

/// How the rows of a raw result are identified
#[derive(Debug, Clone, PartialEq)]
pub enum RowLabels {
    /// One encoded set key per row
    Keys(Vec<String>),
    /// Row `i` belongs to entry `i` of the index lists
    Positional,
}

/// A method's numeric output before alignment
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub labels: RowLabels,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl ResultTable {
    pub fn new(labels: RowLabels, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(GeneSetError::DimensionMismatch {
                expected: format!("{} columns", columns.len()),
                got: format!("{} columns", values.ncols()),
            });
        }
        if let RowLabels::Keys(keys) = &labels {
            if keys.len() != values.nrows() {
                return Err(GeneSetError::DimensionMismatch {
                    expected: format!("{} rows", keys.len()),
                    got: format!("{} rows", values.nrows()),
                });
            }
        }
        Ok(Self { labels, columns, values })
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(j))
    }
}

/// A result aligned to the active set catalog
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub sets: Vec<GeneSetKey>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl NormalizedResult {
    pub fn n_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(j))
    }

    /// Value of one cell by set and column
    pub fn get(&self, collection: &str, name: &str, column: &str) -> Option<f64> {
        let i = self
            .sets
            .iter()
            .position(|k| k.collection == collection && k.name == name)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.values[[i, j]])
    }

    /// Sets with `padj` below `alpha`
    pub fn significant(&self, alpha: f64) -> Vec<&GeneSetKey> {
        match self.column(PADJ_COL) {
            Some(padj) => self
                .sets
                .iter()
                .zip(padj.iter())
                .filter(|(_, &p)| p.is_finite() && p < alpha)
                .map(|(k, _)| k)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn summary(&self, alpha: f64) -> ResultSummary {
        let tested = self
            .column(PVAL_COL)
            .map_or(0, |p| p.iter().filter(|p| p.is_finite()).count());
        ResultSummary {
            total_sets: self.n_sets(),
            sets_tested: tested,
            significant: self.significant(alpha).len(),
            alpha,
        }
    }

    /// One row per set with `collection` and `name` leading
    pub fn to_long_table(&self) -> Result<LongTable> {
        let mut table = LongTable::new(self.n_sets());
        table.add_column(
            COLLECTION_COL,
            self.sets.iter().map(|k| Value::from(k.collection.as_str())).collect(),
        )?;
        table.add_column(NAME_COL, self.sets.iter().map(|k| Value::from(k.name.as_str())).collect())?;
        for (j, name) in self.columns.iter().enumerate() {
            table.add_column(name.as_str(), self.values.column(j).iter().map(|&x| Value::from(x)).collect())?;
        }
        Ok(table)
    }

    /// Append a BH `padj` column when only `pval` is present
    fn add_padj(&mut self) -> Result<()> {
        if self.columns.iter().any(|c| c == PADJ_COL) {
            return Ok(());
        }
        let padj = match self.column(PVAL_COL) {
            Some(pval) => benjamini_hochberg(&pval.to_vec()),
            None => return Ok(()),
        };
        let column = Array2::from_shape_vec((padj.len(), 1), padj).map_err(|e| GeneSetError::DimensionMismatch {
            expected: format!("{} rows", self.n_sets()),
            got: e.to_string(),
        })?;
        self.values
            .append(Axis(1), column.view())
            .map_err(|e| GeneSetError::DimensionMismatch {
                expected: format!("{} rows", self.n_sets()),
                got: e.to_string(),
            })?;
        self.columns.push(PADJ_COL.to_string());
        Ok(())
    }
}

/// What a method hands back to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum MethodOutput {
    Raw(ResultTable),
    Normalized(NormalizedResult),
}

/// Counts over one normalized result
#[derive(Debug, Clone)]
pub struct ResultSummary {
    pub total_sets: usize,
    pub sets_tested: usize,
    pub significant: usize,
    pub alpha: f64,
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gene set enrichment summary")?;
        writeln!(f, "===========================")?;
        writeln!(f, "Gene sets: {}", self.total_sets)?;
        writeln!(f, "Gene sets tested: {}", self.sets_tested)?;
        writeln!(f, "Significant (padj < {}): {}", self.alpha, self.significant)?;
        Ok(())
    }
}

fn misaligned(reason: impl Into<String>) -> GeneSetError {
    GeneSetError::ResultAlignment { reason: reason.into() }
}

/// Align a raw result to the sets of the index lists it was computed from
///
/// Keyed rows are decoded with the lists' separator and must each name a
/// distinct entry; entries without a row get NaN. Positional results must
/// have exactly one row per entry.
pub fn attach_results(db: &GeneSetDb, lists: &IndexLists, raw: ResultTable) -> Result<NormalizedResult> {
    for key in lists.sets() {
        let active = db
            .gene_set_info(&key.collection, &key.name)
            .map(|info| info.active || !db.is_conformed())
            .unwrap_or(false);
        if !active {
            return Err(misaligned(format!("'{}' is not an active gene set of this database", key)));
        }
    }

    let n = lists.len();
    let n_cols = raw.columns.len();
    let values = match raw.labels {
        RowLabels::Positional => {
            if raw.values.nrows() != n {
                return Err(misaligned(format!(
                    "positional result has {} rows for {} gene sets",
                    raw.values.nrows(),
                    n
                )));
            }
            raw.values
        }
        RowLabels::Keys(keys) => {
            let mut values = Array2::from_elem((n, n_cols), f64::NAN);
            let mut seen = HashSet::with_capacity(keys.len());
            for (row, key) in keys.iter().enumerate() {
                let decoded = decode_key(key, lists.sep()).map_err(|e| misaligned(e.to_string()))?;
                let i = lists
                    .position(key)
                    .ok_or_else(|| misaligned(format!("'{}' does not name an active gene set", decoded)))?;
                if !seen.insert(i) {
                    return Err(misaligned(format!("'{}' appears more than once", key)));
                }
                values.row_mut(i).assign(&raw.values.row(row));
            }
            if seen.len() < n {
                log::debug!("{} gene sets have no result row", n - seen.len());
            }
            values
        }
    };

    let mut result = NormalizedResult {
        sets: lists.sets().to_vec(),
        columns: raw.columns,
        values,
    };
    result.add_padj()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conform::ConformParams;
    use crate::query::AddressMode;
    use ndarray::array;

    fn lists() -> (GeneSetDb, IndexLists) {
        let db = GeneSetDb::from_collections(vec![
            ("c1", vec![("A", vec!["g1", "g2"]), ("B", vec!["g2", "g3"])]),
            ("c2", vec![("C", vec!["g9"])]),
        ])
        .unwrap()
        .conform(&["g1", "g2", "g3"], &ConformParams::default())
        .unwrap();
        let lists = db.as_index_lists(AddressMode::XIdx, true).unwrap();
        (db, lists)
    }

    #[test]
    fn test_keyed_result_fills_missing_rows() {
        let (db, lists) = lists();
        let raw = ResultTable::new(
            RowLabels::Keys(vec!["c1;;B".to_string()]),
            vec!["pval".to_string()],
            array![[0.01]],
        )
        .unwrap();
        let result = attach_results(&db, &lists, raw).unwrap();
        assert_eq!(result.n_sets(), 2);
        assert!(result.get("c1", "A", "pval").unwrap().is_nan());
        assert_eq!(result.get("c1", "B", "pval"), Some(0.01));
        // padj is added from pval
        assert_eq!(result.columns, vec!["pval", "padj"]);
        assert!((result.get("c1", "B", "padj").unwrap() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_positional_result_must_match_length() {
        let (db, lists) = lists();
        let ok = ResultTable::new(RowLabels::Positional, vec!["pval".into()], array![[0.2], [0.01]]).unwrap();
        let result = attach_results(&db, &lists, ok).unwrap();
        assert_eq!(result.sets[1], GeneSetKey::new("c1", "B"));
        assert_eq!(result.significant(0.05), vec![&GeneSetKey::new("c1", "B")]);

        let short = ResultTable::new(RowLabels::Positional, vec!["pval".into()], array![[0.2]]).unwrap();
        assert!(matches!(
            attach_results(&db, &lists, short),
            Err(GeneSetError::ResultAlignment { .. })
        ));
    }

    #[test]
    fn test_unknown_inactive_and_malformed_keys() {
        let (db, lists) = lists();
        for key in ["c2;;C", "c1;;Z", "no-separator"] {
            let raw = ResultTable::new(RowLabels::Keys(vec![key.to_string()]), vec!["pval".into()], array![[0.5]])
                .unwrap();
            assert!(matches!(
                attach_results(&db, &lists, raw),
                Err(GeneSetError::ResultAlignment { .. })
            ));
        }

        // lists from another database do not align
        let other = GeneSetDb::from_sets("c9", vec![("X", vec!["g1"])]).unwrap();
        let foreign = other.as_index_lists(AddressMode::FeatureId, false).unwrap();
        let raw = ResultTable::new(RowLabels::Positional, vec!["pval".into()], array![[0.5]]).unwrap();
        assert!(attach_results(&db, &foreign, raw).is_err());
    }

    #[test]
    fn test_table_dimension_checks_and_export() {
        assert!(ResultTable::new(RowLabels::Keys(vec![]), vec!["pval".into()], array![[0.5]]).is_err());
        assert!(ResultTable::new(RowLabels::Positional, vec![], array![[0.5]]).is_err());

        let (db, lists) = lists();
        let raw = ResultTable::new(RowLabels::Positional, vec!["pval".into()], array![[0.5], [0.01]]).unwrap();
        let result = attach_results(&db, &lists, raw).unwrap();
        let table = result.to_long_table().unwrap();
        assert_eq!(table.column_names(), &["collection", "name", "pval", "padj"]);
        let summary = result.summary(0.05);
        assert_eq!(summary.sets_tested, 2);
        assert!(summary.to_string().contains("Gene sets tested: 2"));
    }
}
