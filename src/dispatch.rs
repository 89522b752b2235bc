//! Running several enrichment methods over one conformed database
//!
//! The database is conformed once and its index lists are shared between
//! all methods. Methods run in parallel; a method that fails is recorded and
//! does not affect the others.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::conform::ConformParams;
use crate::data::{GeneSetDb, LongTable, Value, COLLECTION_COL, NAME_COL};
use crate::error::{GeneSetError, Result};
use crate::key::DEFAULT_KEY_SEP;
use crate::methods::{EnrichmentInput, MethodRegistry};
use crate::query::{AddressMode, IndexLists};
use crate::results::NormalizedResult;

/// Parameters of an enrichment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentParams {
    pub conform: ConformParams,
    /// Separator used to encode set keys for the methods
    pub key_sep: String,
    /// Registry names of the methods to run
    pub methods: Vec<String>,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            conform: ConformParams::default(),
            key_sep: DEFAULT_KEY_SEP.to_string(),
            methods: vec!["ora".to_string()],
        }
    }
}

impl EnrichmentParams {
    pub fn with_methods<S: AsRef<str>>(methods: &[S]) -> Self {
        Self {
            methods: methods.iter().map(|m| m.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }
}

/// Outcome of [`run_enrichment`]
#[derive(Debug, Clone)]
pub struct EnrichmentResults {
    db: GeneSetDb,
    lists: Arc<IndexLists>,
    results: Vec<(String, NormalizedResult)>,
    failures: Vec<(String, String)>,
}

impl EnrichmentResults {
    /// The conformed database the methods ran against
    pub fn gdb(&self) -> &GeneSetDb {
        &self.db
    }

    pub fn index_lists(&self) -> &Arc<IndexLists> {
        &self.lists
    }

    /// Names of the methods that produced a result, in request order
    pub fn result_names(&self) -> Vec<&str> {
        self.results.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn result(&self, method: &str) -> Result<&NormalizedResult> {
        if let Some((_, result)) = self.results.iter().find(|(name, _)| name == method) {
            return Ok(result);
        }
        match self.failures.iter().find(|(name, _)| name == method) {
            Some((_, reason)) => Err(GeneSetError::MethodFailed {
                method: method.to_string(),
                reason: reason.clone(),
            }),
            None => Err(GeneSetError::UnknownMethod {
                name: method.to_string(),
            }),
        }
    }

    /// Methods that failed, with the reason
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// All results stacked into one long table
    ///
    /// One row per method and active set, with the set sizes `N` and `n`.
    /// Columns missing from a method's result are null.
    pub fn tabulate(&self) -> Result<LongTable> {
        let mut value_cols: Vec<&str> = Vec::new();
        for (_, result) in &self.results {
            for c in &result.columns {
                if !value_cols.contains(&c.as_str()) {
                    value_cols.push(c);
                }
            }
        }

        let mut method = Vec::new();
        let mut collection = Vec::new();
        let mut name = Vec::new();
        let mut size = Vec::new();
        let mut n = Vec::new();
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); value_cols.len()];
        for (m, result) in &self.results {
            for (i, key) in result.sets.iter().enumerate() {
                let info = self.db.gene_set_info(&key.collection, &key.name)?;
                method.push(Value::from(m.as_str()));
                collection.push(Value::from(key.collection.as_str()));
                name.push(Value::from(key.name.as_str()));
                size.push(Value::from(info.size));
                n.push(Value::from(info.n));
                for (column, out) in value_cols.iter().zip(values.iter_mut()) {
                    let cell = result
                        .columns
                        .iter()
                        .position(|c| c == column)
                        .map_or(Value::Null, |j| Value::from(result.values[[i, j]]));
                    out.push(cell);
                }
            }
        }

        let mut table = LongTable::new(method.len());
        table.add_column("method", method)?;
        table.add_column(COLLECTION_COL, collection)?;
        table.add_column(NAME_COL, name)?;
        table.add_column("N", size)?;
        table.add_column("n", n)?;
        for (column, values) in value_cols.into_iter().zip(values) {
            table.add_column(column, values)?;
        }
        Ok(table)
    }
}

/// Conform `db` to `universe` and run the requested methods on its active sets
///
/// Unknown method names and inputs a method rejects fail the whole call
/// before anything runs. Failures during a method's run are collected in
/// [`EnrichmentResults::failures`].
pub fn run_enrichment<S: AsRef<str>>(
    db: &GeneSetDb,
    universe: &[S],
    input: &EnrichmentInput,
    registry: &MethodRegistry,
    params: &EnrichmentParams,
) -> Result<EnrichmentResults> {
    if params.methods.is_empty() {
        return Err(GeneSetError::InvalidInput {
            reason: "no enrichment methods requested".to_string(),
        });
    }
    let methods = params
        .methods
        .iter()
        .map(|name| registry.get(name))
        .collect::<Result<Vec<_>>>()?;

    input.check_len(universe.len())?;
    for method in &methods {
        method.validate_inputs(input)?;
    }

    let db = if db.is_conformed_to(universe) && db.conform_params() == Some(&params.conform) {
        db.clone()
    } else {
        db.conform(universe, &params.conform)?
    };
    let lists = Arc::new(db.as_index_lists_sep(AddressMode::XIdx, true, &params.key_sep)?);
    if lists.is_empty() {
        return Err(GeneSetError::EmptyData {
            reason: "no active gene sets after conforming to the universe".to_string(),
        });
    }
    log::info!(
        "Running {} enrichment methods over {} active gene sets",
        methods.len(),
        lists.len()
    );

    let outcomes: Vec<(String, Result<NormalizedResult>)> = methods
        .par_iter()
        .map(|method| {
            let lists = Arc::clone(&lists);
            let outcome = method
                .run(&lists, input)
                .and_then(|output| method.normalize_result(&db, &lists, output));
            (method.name().to_string(), outcome)
        })
        .collect();

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push((name, result)),
            Err(e) => {
                log::warn!("Enrichment method '{}' failed: {}", name, e);
                failures.push((name, e.to_string()));
            }
        }
    }

    Ok(EnrichmentResults {
        db,
        lists,
        results,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::EnrichmentMethod;
    use crate::results::MethodOutput;

    struct Broken;

    impl EnrichmentMethod for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn validate_inputs(&self, _input: &EnrichmentInput) -> Result<()> {
            Ok(())
        }

        fn run(&self, _lists: &IndexLists, _input: &EnrichmentInput) -> Result<MethodOutput> {
            Err(GeneSetError::MethodFailed {
                method: "broken".to_string(),
                reason: "always fails".to_string(),
            })
        }
    }

    fn setup() -> (GeneSetDb, Vec<String>, EnrichmentInput) {
        let db = GeneSetDb::from_sets(
            "c1",
            vec![("A", vec!["g1", "g2", "g3"]), ("B", vec!["g4", "g5"]), ("C", vec!["x"])],
        )
        .unwrap();
        let universe: Vec<String> = (1..=8).map(|i| format!("g{}", i)).collect();
        let input = EnrichmentInput {
            stats: Some(vec![2.0, 2.5, 3.0, 0.1, -0.2, 0.0, -0.1, 0.2]),
            selected: Some(vec![true, true, true, false, false, false, false, false]),
        };
        (db, universe, input)
    }

    #[test]
    fn test_run_isolates_failures() {
        let (db, universe, input) = setup();
        let mut registry = MethodRegistry::with_defaults();
        registry.register(Arc::new(Broken));
        let params = EnrichmentParams::with_methods(&["ora", "broken", "meanstat"]);

        let res = run_enrichment(&db, &universe, &input, &registry, &params).unwrap();
        assert_eq!(res.result_names(), vec!["ora", "meanstat"]);
        assert_eq!(res.failures().len(), 1);
        assert!(matches!(res.result("broken"), Err(GeneSetError::MethodFailed { .. })));
        assert!(matches!(res.result("camera"), Err(GeneSetError::UnknownMethod { .. })));

        // C has no member in the universe and is not tested
        let ora = res.result("ora").unwrap();
        assert_eq!(ora.n_sets(), 2);
        assert!(ora.get("c1", "A", "padj").unwrap() < 0.05);
        assert!(res.gdb().is_conformed_to(&universe));
    }

    #[test]
    fn test_unknown_method_and_bad_input_fail_fast() {
        let (db, universe, input) = setup();
        let registry = MethodRegistry::with_defaults();
        let params = EnrichmentParams::with_methods(&["gsva"]);
        assert!(matches!(
            run_enrichment(&db, &universe, &input, &registry, &params),
            Err(GeneSetError::UnknownMethod { .. })
        ));

        let short = EnrichmentInput::from_selection(vec![true; 3]);
        assert!(matches!(
            run_enrichment(&db, &universe, &short, &registry, &EnrichmentParams::default()),
            Err(GeneSetError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_tabulate_stacks_methods() {
        let (db, universe, input) = setup();
        let params = EnrichmentParams::with_methods(&["ora", "meanstat"]);
        let res = run_enrichment(&db, &universe, &input, &MethodRegistry::with_defaults(), &params).unwrap();
        let table = res.tabulate().unwrap();
        assert_eq!(table.n_rows(), 4);
        assert!(table.has_column("overlap") && table.has_column("z"));
        let z = table.column("z").unwrap();
        // ora rows come first and have no z
        assert!(z[0].is_null());
        assert!(!z[2].is_null());
    }

    #[test]
    fn test_params_from_json() {
        let params: EnrichmentParams =
            serde_json::from_str(r#"{"methods": ["meanstat"], "conform": {"min_set_size": 2}}"#).unwrap();
        assert_eq!(params.key_sep, ";;");
        assert_eq!(params.conform.min_set_size, 2);
        assert_eq!(params.conform.max_set_size, usize::MAX);
    }
}
