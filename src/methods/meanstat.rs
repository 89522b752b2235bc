//! Mean-shift test of per-feature statistics

use ndarray::Array2;

use super::{indices_of, EnrichmentInput, EnrichmentMethod};
use crate::error::{GeneSetError, Result};
use crate::query::IndexLists;
use crate::results::{MethodOutput, ResultTable, RowLabels};
use crate::testing::two_sided_z_pvalue;

/// Compares the mean statistic of each set against all features
///
/// `z = (mean_set - mean_all) / (sd_all / sqrt(n))` with a two-sided
/// normal p-value. Non-finite statistics are ignored.
#[derive(Debug, Clone)]
pub struct MeanShift {
    /// Smallest number of finite statistics a set needs to be tested
    pub min_size: usize,
}

impl Default for MeanShift {
    fn default() -> Self {
        Self { min_size: 2 }
    }
}

impl EnrichmentMethod for MeanShift {
    fn name(&self) -> &str {
        "meanstat"
    }

    fn validate_inputs(&self, input: &EnrichmentInput) -> Result<()> {
        let stats = input.stats.as_ref().ok_or_else(|| GeneSetError::InvalidInput {
            reason: "'meanstat' needs a statistic per feature".to_string(),
        })?;
        if stats.iter().filter(|x| x.is_finite()).count() < 2 {
            return Err(GeneSetError::EmptyData {
                reason: "fewer than two finite statistics".to_string(),
            });
        }
        Ok(())
    }

    fn run(&self, lists: &IndexLists, input: &EnrichmentInput) -> Result<MethodOutput> {
        let stats = input.stats.as_deref().ok_or_else(|| GeneSetError::MethodFailed {
            method: self.name().to_string(),
            reason: "missing statistics".to_string(),
        })?;
        let finite: Vec<f64> = stats.iter().copied().filter(|x| x.is_finite()).collect();
        let n_all = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n_all;
        let sd = (finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n_all - 1.0)).sqrt();

        let mut values = Array2::from_elem((lists.len(), 4), f64::NAN);
        for (i, (_, members)) in lists.iter().enumerate() {
            let set: Vec<f64> = indices_of(self.name(), members)?
                .iter()
                .filter_map(|&x| stats.get(x).copied())
                .filter(|x| x.is_finite())
                .collect();
            values[[i, 0]] = set.len() as f64;
            if set.len() < self.min_size.max(1) || sd == 0.0 || !sd.is_finite() {
                continue;
            }
            let set_mean = set.iter().sum::<f64>() / set.len() as f64;
            let z = (set_mean - mean) / (sd / (set.len() as f64).sqrt());
            values[[i, 1]] = set_mean;
            values[[i, 2]] = z;
            values[[i, 3]] = two_sided_z_pvalue(z);
        }

        let columns = ["n", "mean", "z", "pval"].map(String::from).to_vec();
        let table = ResultTable::new(RowLabels::Positional, columns, values)?;
        Ok(MethodOutput::Raw(table))
    }
}
