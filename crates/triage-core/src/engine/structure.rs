//! Greedy hill-climbing structure search.
//!
//! Starting from the empty graph, every iteration enumerates the legal local
//! edits (add, remove or reverse one edge), scores each by the change in total
//! network score and applies the single best edit if it strictly improves the
//! score. The search stops at a local optimum or at the iteration cap.
//!
//! ## Decomposability
//!
//! The total score is a sum of per-variable local scores, so an edit only
//! changes the terms of the one or two variables whose parent sets it touches.
//! Local scores are memoized by `(variable, parent set)`; after an edit only the
//! parent sets that were never seen before have to be scored against the data.
//!
//! ## Determinism
//!
//! Ties between equally good edits are broken by the lexicographic order of
//! `(operation, source name, target name)` with `Add < Remove < Reverse`.
//! Scoring may run in parallel (`rayon` feature); the chosen edit is applied
//! serially and the result does not depend on thread scheduling.

use std::cmp::Ordering;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::engine::dag::Dag;
use crate::engine::errors::TriageError;
use crate::engine::scoring::StructureScore;
use crate::storage::Dataset;

/// Score deltas closer than this are treated as ties.
const SCORE_EPSILON: f64 = 1e-12;

type ParentSet = SmallVec<[usize; 4]>;
type LocalKey = (usize, ParentSet);

/// Configuration for hill-climbing structure search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HillClimbConfig {
    /// Maximum number of applied edits.
    pub max_iterations: usize,
    /// Optional cap on the number of parents per variable.
    pub max_indegree: Option<usize>,
    /// Minimum score improvement for an edit to be applied.
    pub epsilon: f64,
}

impl Default for HillClimbConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            max_indegree: None,
            epsilon: 1e-8,
        }
    }
}

impl HillClimbConfig {
    pub fn validate(self) -> Result<Self, TriageError> {
        if self.max_iterations == 0 {
            return Err(TriageError::Validation(
                "hill_climb: max_iterations must be > 0".into(),
            ));
        }
        if self.max_indegree == Some(0) {
            return Err(TriageError::Validation(
                "hill_climb: max_indegree must be > 0 when set".into(),
            ));
        }
        if !(self.epsilon >= 0.0 && self.epsilon.is_finite()) {
            return Err(TriageError::Validation(
                "hill_climb: epsilon must be finite and >= 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Kind of local edit. The declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EditOp {
    Add,
    Remove,
    Reverse,
}

/// A single edit of the edge `source -> target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edit {
    pub op: EditOp,
    pub source: usize,
    pub target: usize,
}

impl Edit {
    /// Applies the edit, failing if it would break acyclicity.
    pub fn apply(&self, dag: &mut Dag) -> Result<(), TriageError> {
        match self.op {
            EditOp::Add => dag.add_edge(self.source, self.target),
            EditOp::Remove => dag.remove_edge(self.source, self.target),
            EditOp::Reverse => dag.reverse_edge(self.source, self.target),
        }
    }
}

/// Runtime diagnostics emitted by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct HillClimbDiagnostics {
    /// Iteration limit configured for this run.
    pub max_iterations: usize,
    /// Number of iterations executed (applied edits plus the final check).
    pub iterations_run: usize,
    /// Edits applied, in order.
    pub edits: Vec<Edit>,
    /// Whether the search stopped because no edit improved the score.
    pub local_optimum: bool,
    /// Score of the empty graph.
    pub initial_score: f64,
    /// Score of the returned graph.
    pub final_score: f64,
    /// Number of distinct local scores computed against the data.
    pub local_scores_computed: usize,
}

/// Candidate edit with the local terms it would change.
#[derive(Debug, Clone)]
struct Candidate {
    edit: Edit,
    changes: SmallVec<[LocalKey; 2]>,
}

/// Greedy hill climber over DAG space.
pub struct HillClimbSearch<'a> {
    data: &'a Dataset,
    score: &'a dyn StructureScore,
    config: HillClimbConfig,
}

impl<'a> HillClimbSearch<'a> {
    pub fn new(
        data: &'a Dataset,
        score: &'a dyn StructureScore,
        config: HillClimbConfig,
    ) -> Result<Self, TriageError> {
        Ok(Self {
            data,
            score,
            config: config.validate()?,
        })
    }

    /// Runs the search and returns the learned graph.
    pub fn estimate(&self) -> Result<(Dag, HillClimbDiagnostics), TriageError> {
        self.estimate_with_observer(|_, _| {})
    }

    /// Runs the search, calling `observer` with the graph after every applied edit.
    pub fn estimate_with_observer(
        &self,
        mut observer: impl FnMut(&Dag, &Edit),
    ) -> Result<(Dag, HillClimbDiagnostics), TriageError> {
        let n = self.data.num_variables();
        let mut dag = Dag::new(n);
        let mut cache: FxHashMap<LocalKey, f64> = FxHashMap::default();

        let empty_keys: Vec<LocalKey> = (0..n).map(|v| (v, ParentSet::new())).collect();
        self.fill_cache(&mut cache, empty_keys.iter())?;
        let mut local: Vec<f64> = empty_keys
            .iter()
            .map(|key| lookup(&cache, key))
            .collect::<Result<_, _>>()?;
        let initial_score: f64 = local.iter().sum();

        let mut diagnostics = HillClimbDiagnostics {
            max_iterations: self.config.max_iterations,
            iterations_run: 0,
            edits: Vec::new(),
            local_optimum: false,
            initial_score,
            final_score: initial_score,
            local_scores_computed: 0,
        };

        for iteration in 0..self.config.max_iterations {
            diagnostics.iterations_run = iteration + 1;
            let candidates = self.candidates(&dag);
            if candidates.is_empty() {
                diagnostics.local_optimum = true;
                break;
            }
            self.fill_cache(
                &mut cache,
                candidates.iter().flat_map(|c| c.changes.iter()),
            )?;

            let mut best: Option<(f64, &Candidate)> = None;
            for candidate in &candidates {
                let mut delta = 0.0;
                for key in &candidate.changes {
                    delta += lookup(&cache, key)? - local[key.0];
                }
                if !delta.is_finite() {
                    return Err(TriageError::Numerical(format!(
                        "hill_climb: non-finite score delta for {:?}",
                        candidate.edit
                    )));
                }
                best = match best {
                    None => Some((delta, candidate)),
                    Some((best_delta, current)) => {
                        if delta > best_delta + SCORE_EPSILON
                            || ((delta - best_delta).abs() <= SCORE_EPSILON
                                && self.tie_break(&candidate.edit, &current.edit)
                                    == Ordering::Less)
                        {
                            Some((delta, candidate))
                        } else {
                            Some((best_delta, current))
                        }
                    }
                };
            }

            let Some((delta, chosen)) = best else {
                diagnostics.local_optimum = true;
                break;
            };
            if delta <= self.config.epsilon {
                diagnostics.local_optimum = true;
                break;
            }

            chosen.edit.apply(&mut dag)?;
            if !dag.is_acyclic() {
                return Err(TriageError::Internal(format!(
                    "hill_climb: {:?} produced a cycle",
                    chosen.edit
                )));
            }
            for key in &chosen.changes {
                local[key.0] = lookup(&cache, key)?;
            }
            diagnostics.final_score += delta;
            diagnostics.edits.push(chosen.edit);
            observer(&dag, &chosen.edit);

            tracing::debug!(
                iteration,
                op = ?chosen.edit.op,
                source = self.data.name(chosen.edit.source),
                target = self.data.name(chosen.edit.target),
                delta,
                "applied structure edit"
            );
        }

        diagnostics.final_score = local.iter().sum();
        diagnostics.local_scores_computed = cache.len();
        tracing::info!(
            score = self.score.name(),
            edges = dag.edge_count(),
            iterations = diagnostics.iterations_run,
            local_optimum = diagnostics.local_optimum,
            final_score = diagnostics.final_score,
            "structure search finished"
        );
        Ok((dag, diagnostics))
    }

    /// Enumerates every legal edit of the current graph.
    fn candidates(&self, dag: &Dag) -> Vec<Candidate> {
        let n = dag.num_nodes();
        let indegree_ok = |node: usize| {
            self.config
                .max_indegree
                .map_or(true, |max| dag.in_degree(node) < max)
        };
        let mut out = Vec::new();
        for source in 0..n {
            for target in 0..n {
                if source == target {
                    continue;
                }
                if dag.has_edge(source, target) {
                    out.push(Candidate {
                        edit: Edit {
                            op: EditOp::Remove,
                            source,
                            target,
                        },
                        changes: smallvec::smallvec![(
                            target,
                            without(dag.parents(target), source)
                        )],
                    });
                    if indegree_ok(source) && dag.can_reverse(source, target) {
                        out.push(Candidate {
                            edit: Edit {
                                op: EditOp::Reverse,
                                source,
                                target,
                            },
                            changes: smallvec::smallvec![
                                (target, without(dag.parents(target), source)),
                                (source, with(dag.parents(source), target)),
                            ],
                        });
                    }
                } else if !dag.has_edge(target, source)
                    && indegree_ok(target)
                    && !dag.would_create_cycle(source, target)
                {
                    out.push(Candidate {
                        edit: Edit {
                            op: EditOp::Add,
                            source,
                            target,
                        },
                        changes: smallvec::smallvec![(target, with(dag.parents(target), source))],
                    });
                }
            }
        }
        out
    }

    /// Scores every key missing from the cache.
    fn fill_cache<'k>(
        &self,
        cache: &mut FxHashMap<LocalKey, f64>,
        keys: impl Iterator<Item = &'k LocalKey>,
    ) -> Result<(), TriageError> {
        let mut seen = FxHashSet::default();
        let missing: Vec<&LocalKey> = keys
            .filter(|key| !cache.contains_key(*key) && seen.insert(*key))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "rayon")]
        let scored: Vec<(LocalKey, f64)> = missing
            .par_iter()
            .map(|key| {
                self.score
                    .local_score(self.data, key.0, &key.1)
                    .map(|s| ((*key).clone(), s))
            })
            .collect::<Result<_, _>>()?;

        #[cfg(not(feature = "rayon"))]
        let scored: Vec<(LocalKey, f64)> = missing
            .iter()
            .map(|key| {
                self.score
                    .local_score(self.data, key.0, &key.1)
                    .map(|s| ((*key).clone(), s))
            })
            .collect::<Result<_, _>>()?;

        cache.extend(scored);
        Ok(())
    }

    fn tie_break(&self, a: &Edit, b: &Edit) -> Ordering {
        (a.op, self.data.name(a.source), self.data.name(a.target)).cmp(&(
            b.op,
            self.data.name(b.source),
            self.data.name(b.target),
        ))
    }
}

fn lookup(cache: &FxHashMap<LocalKey, f64>, key: &LocalKey) -> Result<f64, TriageError> {
    cache.get(key).copied().ok_or_else(|| {
        TriageError::Internal(format!("hill_climb: local score for {:?} missing", key))
    })
}

fn with(parents: &[usize], extra: usize) -> ParentSet {
    let mut set: ParentSet = parents.iter().copied().collect();
    if let Err(pos) = set.binary_search(&extra) {
        set.insert(pos, extra);
    }
    set
}

fn without(parents: &[usize], removed: usize) -> ParentSet {
    parents.iter().copied().filter(|&p| p != removed).collect()
}
