//! Exact inference by variable elimination.
//!
//! A query runs in four steps:
//!
//! 1. Keep only the CPT factors of the query and evidence variables and their
//!    ancestors. Every other variable is barren: summing it out yields 1, so
//!    dropping it is exact.
//! 2. Reduce every factor that mentions an evidence variable to the observed state.
//! 3. Eliminate the remaining hidden variables one at a time: multiply the
//!    factors that mention it, sum it out, put the result back.
//! 4. Multiply what is left and normalize over the query variables.
//!
//! The elimination order only affects cost, never the result. The default
//! [`EliminationOrder::MinWeight`] greedily picks the variable whose
//! elimination creates the smallest intermediate factor (ties go to the lowest
//! variable index).
//!
//! The engine holds the network behind an `Arc` and never mutates it; every
//! query allocates its own factors, so concurrent queries need no locking.

use std::sync::Arc;

use crate::engine::errors::TriageError;
use crate::engine::evidence::{Evidence, Posterior};
use crate::engine::factor::{Factor, Scope};
use crate::engine::model::BayesNet;

/// Strategy for choosing the elimination order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EliminationOrder {
    /// Greedy: smallest resulting factor first, ties by variable index.
    #[default]
    MinWeight,
    /// Caller-supplied order by variable name. Names of query or evidence
    /// variables are skipped; hidden variables left out are appended in index
    /// order.
    Explicit(Vec<String>),
}

/// Normalized joint distribution over several query variables.
#[derive(Debug, Clone, PartialEq)]
pub struct JointPosterior {
    variables: Vec<String>,
    states: Vec<Vec<String>>,
    probabilities: Vec<f64>,
}

impl JointPosterior {
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn states(&self, slot: usize) -> &[String] {
        &self.states[slot]
    }

    /// Row-major probabilities, last variable fastest.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Probability of a joint assignment of state indices, in variable order.
    pub fn probability(&self, assignment: &[usize]) -> Option<f64> {
        if assignment.len() != self.variables.len() {
            return None;
        }
        let mut index = 0;
        for (&state, states) in assignment.iter().zip(&self.states) {
            if state >= states.len() {
                return None;
            }
            index = index * states.len() + state;
        }
        Some(self.probabilities[index])
    }
}

/// Variable elimination over a shared, immutable network.
#[derive(Debug, Clone)]
pub struct VariableElimination {
    network: Arc<BayesNet>,
    factors: Arc<[Factor]>,
}

impl VariableElimination {
    pub fn new(network: Arc<BayesNet>) -> Self {
        let factors: Arc<[Factor]> = network.cpts().iter().map(Factor::from_cpt).collect();
        Self { network, factors }
    }

    pub fn network(&self) -> &BayesNet {
        &self.network
    }

    /// Shared handle to the network.
    pub fn network_arc(&self) -> Arc<BayesNet> {
        Arc::clone(&self.network)
    }

    /// `P(target | evidence)` with the default elimination order.
    pub fn query(&self, target: &str, evidence: &Evidence) -> Result<Posterior, TriageError> {
        self.query_with_order(target, evidence, &EliminationOrder::default())
    }

    /// `P(target | evidence)` with an explicit elimination strategy.
    pub fn query_with_order(
        &self,
        target: &str,
        evidence: &Evidence,
        order: &EliminationOrder,
    ) -> Result<Posterior, TriageError> {
        let joint = self.query_joint_with_order(&[target], evidence, order)?;
        let JointPosterior {
            mut variables,
            mut states,
            probabilities,
        } = joint;
        match (variables.pop(), states.pop()) {
            (Some(variable), Some(states)) => Ok(Posterior::new(variable, states, probabilities)),
            _ => Err(TriageError::Internal("empty joint posterior".into())),
        }
    }

    /// Joint `P(targets | evidence)` with the default elimination order.
    pub fn query_joint(
        &self,
        targets: &[&str],
        evidence: &Evidence,
    ) -> Result<JointPosterior, TriageError> {
        self.query_joint_with_order(targets, evidence, &EliminationOrder::default())
    }

    pub fn query_joint_with_order(
        &self,
        targets: &[&str],
        evidence: &Evidence,
        order: &EliminationOrder,
    ) -> Result<JointPosterior, TriageError> {
        let target_ids = self.resolve_targets(targets)?;
        let observed = self.resolve_evidence(evidence, &target_ids)?;
        let joint = self.eliminate(&target_ids, &observed, order)?;

        if joint.values().iter().any(|p| !p.is_finite()) {
            return Err(TriageError::Numerical(
                "posterior contains non-finite probabilities".into(),
            ));
        }
        Ok(JointPosterior {
            variables: target_ids
                .iter()
                .map(|&v| self.network.variable(v).name().to_string())
                .collect(),
            states: target_ids
                .iter()
                .map(|&v| self.network.variable(v).states().to_vec())
                .collect(),
            probabilities: joint.values().to_vec(),
        })
    }

    /// Most probable state of `target` given the evidence. Ties go to the earliest state.
    pub fn map_query(
        &self,
        target: &str,
        evidence: &Evidence,
    ) -> Result<(String, f64), TriageError> {
        let posterior = self.query(target, evidence)?;
        posterior
            .top()
            .map(|(state, p)| (state.to_string(), p))
            .ok_or_else(|| TriageError::Internal(format!("'{}' has no states", target)))
    }

    /// Names of the hidden variables in the order a query would eliminate them.
    pub fn elimination_order(
        &self,
        targets: &[&str],
        evidence: &Evidence,
        order: &EliminationOrder,
    ) -> Result<Vec<String>, TriageError> {
        let target_ids = self.resolve_targets(targets)?;
        let observed = self.resolve_evidence(evidence, &target_ids)?;
        let (factors, hidden) = self.prepare(&target_ids, &observed)?;
        let ordered = self.order_hidden(&factors, hidden, order)?;
        Ok(ordered
            .into_iter()
            .map(|v| self.network.variable(v).name().to_string())
            .collect())
    }

    fn resolve_targets(&self, targets: &[&str]) -> Result<Vec<usize>, TriageError> {
        if targets.is_empty() {
            return Err(TriageError::Inference("query needs at least one variable".into()));
        }
        let mut ids = Vec::with_capacity(targets.len());
        for name in targets {
            let id = self.network.index_of(name).ok_or_else(|| {
                TriageError::Inference(format!("unknown query variable '{}'", name))
            })?;
            if ids.contains(&id) {
                return Err(TriageError::Inference(format!(
                    "query variable '{}' listed twice",
                    name
                )));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    fn resolve_evidence(
        &self,
        evidence: &Evidence,
        targets: &[usize],
    ) -> Result<Vec<(usize, usize)>, TriageError> {
        let mut observed = Vec::with_capacity(evidence.len());
        for (name, state) in evidence.iter() {
            let id = self.network.index_of(name).ok_or_else(|| {
                TriageError::Inference(format!("unknown evidence variable '{}'", name))
            })?;
            let cardinality = self.network.variable(id).cardinality();
            if state >= cardinality {
                return Err(TriageError::Inference(format!(
                    "evidence state {} out of range for '{}' with {} states",
                    state, name, cardinality
                )));
            }
            if targets.contains(&id) {
                return Err(TriageError::Inference(format!(
                    "variable '{}' is both queried and observed",
                    name
                )));
            }
            observed.push((id, state));
        }
        Ok(observed)
    }

    /// Relevant factors reduced by the evidence, plus the hidden variables.
    fn prepare(
        &self,
        targets: &[usize],
        observed: &[(usize, usize)],
    ) -> Result<(Vec<Factor>, Vec<usize>), TriageError> {
        let dag = self.network.dag();
        let relevant = dag.ancestral_set(
            targets
                .iter()
                .copied()
                .chain(observed.iter().map(|&(v, _)| v)),
        );

        let mut factors = Vec::new();
        for (v, _) in relevant.iter().enumerate().filter(|&(_, &keep)| keep) {
            let mut factor = self.factors[v].clone();
            for &(var, state) in observed {
                if factor.contains(var) {
                    factor = factor.reduce(var, state)?;
                }
            }
            factors.push(factor);
        }

        let hidden = relevant
            .iter()
            .enumerate()
            .filter(|&(v, &keep)| {
                keep && !targets.contains(&v) && !observed.iter().any(|&(o, _)| o == v)
            })
            .map(|(v, _)| v)
            .collect();
        Ok((factors, hidden))
    }

    fn order_hidden(
        &self,
        factors: &[Factor],
        hidden: Vec<usize>,
        order: &EliminationOrder,
    ) -> Result<Vec<usize>, TriageError> {
        match order {
            EliminationOrder::MinWeight => Ok(self.min_weight_order(factors, hidden)),
            EliminationOrder::Explicit(names) => {
                let mut ordered = Vec::with_capacity(hidden.len());
                for name in names {
                    let id = self.network.index_of(name).ok_or_else(|| {
                        TriageError::Inference(format!(
                            "unknown variable '{}' in elimination order",
                            name
                        ))
                    })?;
                    if hidden.contains(&id) && !ordered.contains(&id) {
                        ordered.push(id);
                    }
                }
                for v in hidden {
                    if !ordered.contains(&v) {
                        ordered.push(v);
                    }
                }
                Ok(ordered)
            }
        }
    }

    fn min_weight_order(&self, factors: &[Factor], mut hidden: Vec<usize>) -> Vec<usize> {
        let card = |v: usize| self.network.variable(v).cardinality();
        let mut scopes: Vec<Scope> = factors
            .iter()
            .map(|f| f.scope().iter().copied().collect())
            .collect();
        let mut ordered = Vec::with_capacity(hidden.len());

        while !hidden.is_empty() {
            let mut best: Option<(usize, usize, Scope)> = None;
            for (slot, &v) in hidden.iter().enumerate() {
                let mut merged: Scope = scopes
                    .iter()
                    .filter(|s| s.contains(&v))
                    .flat_map(|s| s.iter().copied())
                    .filter(|&u| u != v)
                    .collect();
                merged.sort_unstable();
                merged.dedup();
                let weight = merged
                    .iter()
                    .fold(1usize, |acc, &u| acc.saturating_mul(card(u)));
                // hidden is ascending, so strict < keeps the lowest index on ties
                if best.as_ref().map_or(true, |(w, _, _)| weight < *w) {
                    best = Some((weight, slot, merged));
                }
            }
            let Some((_, slot, merged)) = best else {
                break;
            };
            let v = hidden.remove(slot);
            scopes.retain(|s| !s.contains(&v));
            scopes.push(merged);
            ordered.push(v);
        }
        ordered
    }

    fn eliminate(
        &self,
        targets: &[usize],
        observed: &[(usize, usize)],
        order: &EliminationOrder,
    ) -> Result<Factor, TriageError> {
        let (mut factors, hidden) = self.prepare(targets, observed)?;
        let ordered = self.order_hidden(&factors, hidden, order)?;
        tracing::trace!(order = ?ordered, "elimination order");

        for v in ordered {
            let (mentioning, rest): (Vec<Factor>, Vec<Factor>) =
                factors.into_iter().partition(|f| f.contains(v));
            factors = rest;
            if mentioning.is_empty() {
                continue;
            }
            let product = mentioning
                .iter()
                .skip(1)
                .fold(mentioning[0].clone(), |acc, f| acc.product(f));
            factors.push(product.sum_out(v));
        }

        let joint = factors
            .iter()
            .fold(Factor::unit(), |acc, f| acc.product(f));
        if let Some(stray) = joint.scope().iter().find(|v| !targets.contains(v)) {
            return Err(TriageError::Internal(format!(
                "variable {} survived elimination",
                stray
            )));
        }
        joint.reorder(targets)?.normalized()
    }
}
