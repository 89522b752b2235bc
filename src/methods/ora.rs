//! Over-representation analysis with the hypergeometric test

use ndarray::Array2;

use super::{indices_of, EnrichmentInput, EnrichmentMethod};
use crate::error::{GeneSetError, Result};
use crate::query::IndexLists;
use crate::results::{MethodOutput, ResultTable, RowLabels};
use crate::testing::hypergeometric_upper_tail;

/// Tests whether selected features are enriched in each set
///
/// The universe is the conformed feature space, so set sizes are the
/// number of members found in it.
#[derive(Debug, Clone, Default)]
pub struct OverRepresentation;

impl EnrichmentMethod for OverRepresentation {
    fn name(&self) -> &str {
        "ora"
    }

    fn validate_inputs(&self, input: &EnrichmentInput) -> Result<()> {
        match &input.selected {
            Some(selected) if selected.iter().any(|&s| s) => Ok(()),
            Some(_) => Err(GeneSetError::EmptyData {
                reason: "no features are selected".to_string(),
            }),
            None => Err(GeneSetError::InvalidInput {
                reason: "'ora' needs a feature selection".to_string(),
            }),
        }
    }

    fn run(&self, lists: &IndexLists, input: &EnrichmentInput) -> Result<MethodOutput> {
        let selected = input.selected.as_deref().ok_or_else(|| GeneSetError::MethodFailed {
            method: self.name().to_string(),
            reason: "missing feature selection".to_string(),
        })?;
        let universe = selected.len() as u64;
        let marked = selected.iter().filter(|&&s| s).count() as u64;

        let mut values = Array2::from_elem((lists.len(), 4), f64::NAN);
        for (i, (_, members)) in lists.iter().enumerate() {
            let idx = indices_of(self.name(), members)?;
            let size = idx.len() as u64;
            let overlap = idx.iter().filter(|&&x| selected.get(x).copied().unwrap_or(false)).count() as u64;
            values[[i, 0]] = size as f64;
            values[[i, 1]] = overlap as f64;
            values[[i, 2]] = size as f64 * marked as f64 / universe as f64;
            values[[i, 3]] = hypergeometric_upper_tail(universe, marked, size, overlap);
        }

        let columns = ["size", "overlap", "expected", "pval"].map(String::from).to_vec();
        let table = ResultTable::new(RowLabels::Keys(lists.keys().to_vec()), columns, values)?;
        Ok(MethodOutput::Raw(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conform::ConformParams;
    use crate::data::GeneSetDb;
    use crate::query::AddressMode;

    #[test]
    fn test_ora_counts_and_pvalues() {
        let universe: Vec<String> = (0..10).map(|i| format!("g{}", i)).collect();
        let db = GeneSetDb::from_sets("c1", vec![("hit", vec!["g0", "g1", "g2"]), ("miss", vec!["g7", "g8"])])
            .unwrap()
            .conform(&universe, &ConformParams::default())
            .unwrap();
        let lists = db.as_index_lists(AddressMode::XIdx, true).unwrap();
        let mut selected = vec![false; 10];
        selected[..3].iter_mut().for_each(|s| *s = true);
        let input = EnrichmentInput::from_selection(selected);

        let method = OverRepresentation;
        method.validate_inputs(&input).unwrap();
        let MethodOutput::Raw(table) = method.run(&lists, &input).unwrap() else {
            panic!("expected a raw table");
        };
        let overlap = table.column("overlap").unwrap();
        assert_eq!(overlap.to_vec(), vec![3.0, 0.0]);
        let pval = table.column("pval").unwrap();
        assert!((pval[0] - 1.0 / 120.0).abs() < 1e-10);
        assert_eq!(pval[1], 1.0);
    }

    #[test]
    fn test_ora_rejects_missing_selection() {
        let method = OverRepresentation;
        assert!(method.validate_inputs(&EnrichmentInput::from_stats(vec![1.0])).is_err());
        assert!(method.validate_inputs(&EnrichmentInput::from_selection(vec![false; 4])).is_err());
    }
}
