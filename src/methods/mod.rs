//! Enrichment methods and their registry
//!
//! A method sees only the index lists of the active gene sets and the
//! per-feature inputs aligned to the universe. It may return either a raw
//! table, which the dispatcher aligns with [`attach_results`], or an already
//! normalized result.

mod meanstat;
mod ora;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::GeneSetDb;
use crate::error::{GeneSetError, Result};
use crate::query::{FeatureValues, IndexLists};
use crate::results::{attach_results, MethodOutput, NormalizedResult};

pub use meanstat::MeanShift;
pub use ora::OverRepresentation;

/// Per-feature inputs, aligned to the conformed universe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentInput {
    /// A statistic per feature (e.g. a t statistic or log fold change)
    pub stats: Option<Vec<f64>>,
    /// Whether each feature was selected (e.g. significantly changed)
    pub selected: Option<Vec<bool>>,
}

impl EnrichmentInput {
    pub fn from_stats(stats: Vec<f64>) -> Self {
        Self {
            stats: Some(stats),
            selected: None,
        }
    }

    pub fn from_selection(selected: Vec<bool>) -> Self {
        Self {
            stats: None,
            selected: Some(selected),
        }
    }

    /// Check every provided vector against the universe size
    pub fn check_len(&self, n: usize) -> Result<()> {
        let lens = [
            ("stats", self.stats.as_ref().map(Vec::len)),
            ("selected", self.selected.as_ref().map(Vec::len)),
        ];
        for (name, len) in lens {
            if let Some(len) = len {
                if len != n {
                    return Err(GeneSetError::DimensionMismatch {
                        expected: format!("{} values in '{}' (universe size)", n, name),
                        got: len.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A gene set enrichment test
pub trait EnrichmentMethod: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Reject inputs the method cannot work with, before anything runs
    fn validate_inputs(&self, input: &EnrichmentInput) -> Result<()>;

    /// Test every set of `lists`; members are universe positions
    fn run(&self, lists: &IndexLists, input: &EnrichmentInput) -> Result<MethodOutput>;

    /// Align the output to the active catalog of `db`
    fn normalize_result(&self, db: &GeneSetDb, lists: &IndexLists, output: MethodOutput) -> Result<NormalizedResult> {
        match output {
            MethodOutput::Raw(raw) => attach_results(db, lists, raw),
            MethodOutput::Normalized(result) if result.sets.as_slice() == lists.sets() => Ok(result),
            MethodOutput::Normalized(_) => Err(GeneSetError::ResultAlignment {
                reason: format!("result of '{}' does not follow the gene set catalog", self.name()),
            }),
        }
    }
}

/// Members of one list entry as universe positions
pub(crate) fn indices_of<'a>(method: &str, members: &'a FeatureValues) -> Result<&'a [usize]> {
    members.as_indices().ok_or_else(|| GeneSetError::MethodFailed {
        method: method.to_string(),
        reason: "index lists must address members by x_idx".to_string(),
    })
}

/// Named enrichment methods available to a run
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn EnrichmentMethod>>,
}

impl MethodRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in methods
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OverRepresentation::default()));
        registry.register(Arc::new(MeanShift::default()));
        registry
    }

    /// Add a method, replacing any method of the same name
    pub fn register(&mut self, method: Arc<dyn EnrichmentMethod>) -> &mut Self {
        let name = method.name().to_string();
        if self.methods.insert(name.clone(), method).is_some() {
            log::warn!("Replacing registered enrichment method '{}'", name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn EnrichmentMethod>> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| GeneSetError::UnknownMethod { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.methods.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry").field("methods", &self.names()).finish()
    }
}
