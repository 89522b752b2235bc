//! rust_genesetdb: an indexed gene set database for enrichment analysis
//!
//! A [`GeneSetDb`](data::GeneSetDb) holds gene sets keyed by
//! `(collection, name)`. Conforming it to the feature universe of a study
//! (e.g. the rows of an expression matrix) maps every member to a position
//! in that universe and flags sets whose size falls outside the configured
//! bounds as inactive. Enrichment methods consume the resulting index
//! lists; their results are aligned back to the set catalog.
//!
//! # Example
//!
//! ```ignore
//! use rust_genesetdb::prelude::*;
//!
//! let gdb = read_gmt("h.all.entrez.gmt", "H")?;
//! // row names of the expression matrix, and one statistic per row
//! let universe: Vec<String> = gene_ids;
//! let input = EnrichmentInput::from_stats(t_statistics);
//! let params = EnrichmentParams::with_methods(&["meanstat"]);
//! let res = run_enrichment(&gdb, &universe, &input, &MethodRegistry::with_defaults(), &params)?;
//! println!("{}", res.result("meanstat")?.summary(0.05));
//! ```

pub mod conform;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod key;
pub mod methods;
pub mod mutate;
pub mod query;
pub mod results;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conform::{ConformParams, ConformReport, FeatureRemap, Universe};
    pub use crate::data::{
        CollectionMetadata, FeatureIdType, FeatureMapping, GeneSetDb, GeneSetDbBuilder, LongTable,
        MetadataValue, UrlFunction, Value,
    };
    pub use crate::dispatch::{run_enrichment, EnrichmentParams, EnrichmentResults};
    pub use crate::error::{GeneSetError, Result};
    pub use crate::io::{read_gene_sets, read_gmt, read_long_table, write_gene_sets, write_gmt, write_result};
    pub use crate::key::{decode_key, decode_keys, encode_key, encode_keys, GeneSetKey, DEFAULT_KEY_SEP};
    pub use crate::methods::{EnrichmentInput, EnrichmentMethod, MethodRegistry};
    pub use crate::query::{AddressMode, FeatureValues, GeneSetInfo, IncidenceMatrix, IndexLists, SetQuery};
    pub use crate::results::{attach_results, MethodOutput, NormalizedResult, ResultTable, RowLabels};
    pub use crate::testing::{benjamini_hochberg, bonferroni};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_full_pipeline() {
        let table = LongTable::from_columns(vec![
            ("collection", ["c1", "c1", "c1", "c1", "c1", "c2"].map(Value::from).to_vec()),
            ("name", ["A", "A", "A", "B", "B", "C"].map(Value::from).to_vec()),
            ("feature_id", ["g1", "g2", "g3", "g2", "g4", "g9"].map(Value::from).to_vec()),
        ])
        .unwrap();
        let gdb = GeneSetDb::from_table(&table, None).unwrap();

        let universe = ["g1", "g2", "g4", "g5"];
        let params = ConformParams::with_bounds(2, usize::MAX);
        let conformed = gdb.conform(&universe, &params).unwrap();
        assert_eq!(conformed.gene_sets(true).len(), 2);

        let lists = conformed.as_index_lists(AddressMode::XIdx, true).unwrap();
        assert_eq!(lists.keys(), &["c1;;A", "c1;;B"]);
        assert_eq!(decode_key(&lists.keys()[1], DEFAULT_KEY_SEP).unwrap(), GeneSetKey::new("c1", "B"));

        let input = EnrichmentInput {
            stats: Some(vec![1.0, 2.0, -1.0, 0.5]),
            selected: Some(vec![true, true, false, false]),
        };
        let run = run_enrichment(
            &gdb,
            &universe,
            &input,
            &MethodRegistry::with_defaults(),
            &EnrichmentParams {
                conform: params,
                methods: vec!["ora".to_string(), "meanstat".to_string()],
                ..EnrichmentParams::default()
            },
        )
        .unwrap();
        assert!(run.failures().is_empty());
        assert_eq!(run.gdb(), &conformed);

        let ora = run.result("ora").unwrap();
        assert_eq!(ora.get("c1", "A", "overlap"), Some(2.0));
        assert_eq!(ora.get("c1", "B", "overlap"), Some(1.0));
        assert!(ora.column("padj").is_some());

        // subsetting keeps the conformed view of the remaining sets
        let only_a = conformed.subset(&[true, false, false]).unwrap();
        assert_eq!(only_a.gene_set("c1", "A", AddressMode::XIdx).unwrap(), FeatureValues::Indices(vec![0, 1]));
    }
}
