//! Statistical helpers shared by the enrichment methods

mod fdr;
mod pvalue;

pub use fdr::{benjamini_hochberg, bonferroni};
pub use pvalue::{hypergeometric_upper_tail, two_sided_z_pvalue};
