//! Conforming a GeneSetDb to a concrete feature universe
//!
//! Conforming cross-references every feature of the database against the
//! ordered feature ids of a study (e.g. expression matrix rows). Each feature
//! gets the position of its `x_id` in the universe (`x_idx`), each gene set
//! gets `n`, the number of its members that were found, and is flagged
//! active when `n` lies inside the configured size bounds. Sets outside the
//! bounds are kept, only flagged inactive.
//!
//! Matching is by first occurrence in the universe and runs in
//! O(|members| + |universe|).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::GeneSetDb;
use crate::error::{GeneSetError, Result};

/// Parameters for conforming a database to a universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformParams {
    /// Smallest `n` for a set to be active
    pub min_set_size: usize,
    /// Largest `n` for a set to be active
    pub max_set_size: usize,
    /// Fraction of membership rows that must match before a warning is raised
    pub min_match_fraction: f64,
}

impl Default for ConformParams {
    fn default() -> Self {
        Self {
            min_set_size: 1,
            max_set_size: usize::MAX,
            min_match_fraction: 0.05,
        }
    }
}

impl ConformParams {
    /// Default parameters with explicit size bounds
    pub fn with_bounds(min_set_size: usize, max_set_size: usize) -> Self {
        Self {
            min_set_size,
            max_set_size,
            ..Self::default()
        }
    }

    /// Whether a set with `n` matched members is active
    pub fn admits(&self, n: usize) -> bool {
        self.min_set_size <= n && n <= self.max_set_size
    }

    fn check(&self) -> Result<()> {
        if self.min_set_size > self.max_set_size {
            return Err(GeneSetError::InvalidInput {
                reason: format!(
                    "min_set_size ({}) is larger than max_set_size ({})",
                    self.min_set_size, self.max_set_size
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.min_match_fraction) {
            return Err(GeneSetError::InvalidInput {
                reason: format!("min_match_fraction must be in [0, 1], got {}", self.min_match_fraction),
            });
        }
        Ok(())
    }
}

/// An ordered list of target feature ids with a hash index
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    n_duplicates: usize,
}

impl Universe {
    /// Index the ids; a repeated id resolves to its first position
    pub fn new<S: AsRef<str>>(ids: &[S]) -> Self {
        let mut index = HashMap::with_capacity(ids.len());
        let mut n_duplicates = 0;
        let ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
        for (i, id) in ids.iter().enumerate() {
            if index.contains_key(id) {
                n_duplicates += 1;
            } else {
                index.insert(id.clone(), i);
            }
        }
        Self {
            ids,
            index,
            n_duplicates,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, idx: usize) -> Option<&String> {
        self.ids.get(idx)
    }

    /// First position of `id`
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Number of ids that repeat an earlier one
    pub fn n_duplicates(&self) -> usize {
        self.n_duplicates
    }

    fn same_ids<S: AsRef<str>>(&self, other: &[S]) -> bool {
        self.ids.len() == other.len() && self.ids.iter().zip(other).all(|(a, b)| a == b.as_ref())
    }
}

/// What a database was conformed to
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConformState {
    pub(crate) universe: Arc<Universe>,
    pub(crate) params: ConformParams,
}

/// Summary of a conform run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConformReport {
    /// Membership rows in the database
    pub n_members: usize,
    /// Membership rows whose feature was found in the universe
    pub n_matched: usize,
    /// `n_matched / n_members`; 1.0 for a database without members
    pub match_fraction: f64,
    pub n_active: usize,
    pub n_inactive: usize,
    /// Match fraction fell below `min_match_fraction`
    pub low_match: bool,
    /// Universe ids that repeat an earlier id
    pub n_universe_duplicates: usize,
}

/// Translation from db-space feature ids to universe-space ids
pub type FeatureRemap = HashMap<String, String>;

impl GeneSetDb {
    /// Conform to a universe of feature ids
    pub fn conform<S: AsRef<str>>(&self, universe: &[S], params: &ConformParams) -> Result<GeneSetDb> {
        self.conform_with_report(universe, None, params).map(|(db, _)| db)
    }

    /// Conform, optionally translating feature ids through `remap` first
    ///
    /// With a remap, a feature's `x_id` becomes `remap[feature_id]` and
    /// features absent from the remap match nothing. Without one the current
    /// `x_id` mapping is used.
    pub fn conform_with_report<S: AsRef<str>>(
        &self,
        universe: &[S],
        remap: Option<&FeatureRemap>,
        params: &ConformParams,
    ) -> Result<(GeneSetDb, ConformReport)> {
        self.conform_to(Arc::new(Universe::new(universe)), remap, params)
    }

    /// Conform to an already indexed universe
    pub fn conform_to(
        &self,
        universe: Arc<Universe>,
        remap: Option<&FeatureRemap>,
        params: &ConformParams,
    ) -> Result<(GeneSetDb, ConformReport)> {
        if universe.n_duplicates() > 0 {
            log::warn!(
                "Universe has {} duplicated feature ids; matching uses the first occurrence",
                universe.n_duplicates()
            );
        }
        let (db, report) = self.apply_conform(universe, remap, params)?;
        if report.low_match {
            log::warn!(
                "Only {} of {} gene set members ({:.1}%) match the universe; \
                 check that both use the same feature id type",
                report.n_matched,
                report.n_members,
                100.0 * report.match_fraction
            );
        }
        log::debug!(
            "Conformed {} gene sets: {} active, {} inactive",
            db.n_sets(),
            report.n_active,
            report.n_inactive
        );
        Ok((db, report))
    }

    fn apply_conform(
        &self,
        universe: Arc<Universe>,
        remap: Option<&FeatureRemap>,
        params: &ConformParams,
    ) -> Result<(GeneSetDb, ConformReport)> {
        params.check()?;
        let mut db = self.clone();

        if let Some(remap) = remap {
            for (x_id, feature_id) in db.features.x_id.iter_mut().zip(db.features.feature_id.iter()) {
                *x_id = remap.get(feature_id).cloned();
            }
        }
        for (x_idx, x_id) in db.features.x_idx.iter_mut().zip(db.features.x_id.iter()) {
            *x_idx = x_id.as_deref().and_then(|x| universe.position(x));
        }

        let mut n_matched = 0;
        let mut n_active = 0;
        for i in 0..db.n_sets() {
            let n = db
                .member_features(i)
                .iter()
                .filter(|&&f| db.features.x_idx[f].is_some())
                .count();
            let active = params.admits(n);
            db.sets.n[i] = Some(n);
            db.sets.active[i] = active;
            n_matched += n;
            n_active += usize::from(active);
        }

        let n_members = db.n_members();
        let match_fraction = if n_members == 0 {
            1.0
        } else {
            n_matched as f64 / n_members as f64
        };
        let report = ConformReport {
            n_members,
            n_matched,
            match_fraction,
            n_active,
            n_inactive: db.n_sets() - n_active,
            low_match: match_fraction < params.min_match_fraction,
            n_universe_duplicates: universe.n_duplicates(),
        };

        db.conformed = Some(ConformState {
            universe,
            params: params.clone(),
        });
        db.validate()?;
        Ok((db, report))
    }

    /// Drop all conform results
    pub fn unconform(&self) -> Result<GeneSetDb> {
        let mut db = self.clone();
        db.features.x_idx.iter_mut().for_each(|x| *x = None);
        db.sets.n.iter_mut().for_each(|n| *n = None);
        db.sets.active.iter_mut().for_each(|a| *a = false);
        db.conformed = None;
        db.validate()?;
        Ok(db)
    }

    pub fn is_conformed(&self) -> bool {
        self.conformed.is_some()
    }

    /// Whether the database is conformed to exactly this ordered universe
    pub fn is_conformed_to<S: AsRef<str>>(&self, universe: &[S]) -> bool {
        self.conformed
            .as_ref()
            .map_or(false, |state| state.universe.same_ids(universe))
    }

    /// The universe this database is conformed to
    pub fn universe(&self) -> Option<&Arc<Universe>> {
        self.conformed.as_ref().map(|s| &s.universe)
    }

    pub fn conform_params(&self) -> Option<&ConformParams> {
        self.conformed.as_ref().map(|s| &s.params)
    }

    /// Re-apply a previous conform state to a freshly built database
    pub(crate) fn reconform(&self, state: Option<&ConformState>) -> Result<GeneSetDb> {
        match state {
            Some(state) => self
                .apply_conform(Arc::clone(&state.universe), None, &state.params)
                .map(|(db, _)| db),
            None => Ok(self.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_db() -> GeneSetDb {
        GeneSetDb::from_sets(
            "c1",
            vec![("A", vec!["g1", "g2", "g3"]), ("B", vec!["g2", "g4"])],
        )
        .unwrap()
    }

    fn row(db: &GeneSetDb, name: &str) -> usize {
        db.set_row("c1", name).unwrap()
    }

    #[test]
    fn test_conform_scenario_min_size_two() {
        let db = scenario_db();
        let params = ConformParams::with_bounds(2, usize::MAX);
        let conformed = db.conform(&["g1", "g2", "g4", "g5"], &params).unwrap();

        let a = row(&conformed, "A");
        let b = row(&conformed, "B");
        assert_eq!(conformed.sets.n[a], Some(2));
        assert!(conformed.sets.active[a]);
        assert_eq!(conformed.sets.n[b], Some(2));
        assert!(conformed.sets.active[b]);

        let g4 = conformed.feature_mapping("g4").unwrap();
        assert_eq!(g4.x_idx, Some(2));
        assert_eq!(conformed.feature_mapping("g3").unwrap().x_idx, None);
    }

    #[test]
    fn test_conform_no_overlap_warns_but_succeeds() {
        let db = scenario_db();
        let (conformed, report) = db
            .conform_with_report(&["g5", "g6"], None, &ConformParams::default())
            .unwrap();
        assert_eq!(report.n_members, 5);
        assert_eq!(report.n_matched, 0);
        assert!(report.low_match);
        for i in 0..conformed.n_sets() {
            assert_eq!(conformed.sets.n[i], Some(0));
            assert!(!conformed.sets.active[i]);
        }
    }

    #[test]
    fn test_conform_is_idempotent_and_pure() {
        let db = scenario_db();
        let universe = ["g4", "g2", "g1"];
        let params = ConformParams::default();
        let once = db.conform(&universe, &params).unwrap();
        let twice = once.conform(&universe, &params).unwrap();
        assert_eq!(once, twice);
        // the input is untouched
        assert!(!db.is_conformed());
        assert!(db.sets.n.iter().all(Option::is_none));
    }

    #[test]
    fn test_count_invariant() {
        let db = scenario_db();
        let params = ConformParams::with_bounds(1, 2);
        let conformed = db.conform(&["g1", "g2", "g3", "g4"], &params).unwrap();
        for i in 0..conformed.n_sets() {
            let n = conformed.sets.n[i].unwrap();
            assert!(n <= conformed.sets.size[i]);
            assert_eq!(conformed.sets.active[i], params.admits(n));
        }
        // A has three members present and exceeds max_set_size
        assert!(!conformed.sets.active[row(&conformed, "A")]);
    }

    #[test]
    fn test_duplicate_universe_ids_first_wins() {
        let db = scenario_db();
        let (conformed, report) = db
            .conform_with_report(&["g2", "g1", "g2"], None, &ConformParams::default())
            .unwrap();
        assert_eq!(report.n_universe_duplicates, 1);
        assert_eq!(conformed.feature_mapping("g2").unwrap().x_idx, Some(0));
    }

    #[test]
    fn test_conform_with_remap() {
        let db = scenario_db();
        let mut remap = FeatureRemap::new();
        remap.insert("g1".to_string(), "TP53".to_string());
        remap.insert("g2".to_string(), "EGFR".to_string());
        let (conformed, report) = db
            .conform_with_report(&["EGFR", "TP53"], Some(&remap), &ConformParams::default())
            .unwrap();
        assert_eq!(report.n_matched, 3);
        let g1 = conformed.feature_mapping("g1").unwrap();
        assert_eq!(g1.x_id.as_deref(), Some("TP53"));
        assert_eq!(g1.x_idx, Some(1));
        // unmapped features match nothing
        assert_eq!(conformed.feature_mapping("g4").unwrap().x_id, None);

        let again = conformed
            .conform_with_report(&["EGFR", "TP53"], Some(&remap), &ConformParams::default())
            .unwrap()
            .0;
        assert_eq!(again, conformed);
    }

    #[test]
    fn test_bad_params_and_unconform() {
        let db = scenario_db();
        assert!(db.conform(&["g1"], &ConformParams::with_bounds(5, 2)).is_err());

        let conformed = db.conform(&["g1", "g2"], &ConformParams::default()).unwrap();
        assert!(conformed.is_conformed_to(&["g1", "g2"]));
        assert!(!conformed.is_conformed_to(&["g2", "g1"]));
        let back = conformed.unconform().unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn test_params_from_json() {
        let params: ConformParams = serde_json::from_str(r#"{"min_set_size": 10}"#).unwrap();
        assert_eq!(params.min_set_size, 10);
        assert_eq!(params.max_set_size, usize::MAX);
    }
}
