//! Conditional probability table estimation.
//!
//! Two strategies are provided behind the [`ParameterEstimator`] trait:
//!
//! - [`BayesianEstimator`]: BDeu pseudo-counts. An equivalent sample size `α`
//!   is spread uniformly over all `q · r` cells of a table, so every cell gets
//!   `α / (q r)` virtual observations and
//!   `P(k | j) = (N_jk + α/(q r)) / (N_j + α/q)`.
//!   Every probability is strictly positive, including rows for parent
//!   configurations that never occur in the data (those become uniform).
//! - [`MaximumLikelihood`]: relative frequencies. Unobserved configurations
//!   become uniform and zero cells are floored at [`MIN_PROBABILITY`] before
//!   renormalizing, so the CPT invariants still hold.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::engine::counts::ContingencyTable;
use crate::engine::dag::Dag;
use crate::engine::errors::TriageError;
use crate::engine::model::Cpt;
use crate::storage::Dataset;

/// Floor applied to maximum-likelihood cells.
pub const MIN_PROBABILITY: f64 = 1e-9;

/// A strategy that turns counts into a CPT.
pub trait ParameterEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fits the CPT of `variable` given `parents` (sorted variable indices).
    fn estimate_cpt(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<Cpt, TriageError>;
}

/// BDeu smoothed estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BayesianEstimator {
    pub equivalent_sample_size: f64,
}

impl Default for BayesianEstimator {
    fn default() -> Self {
        Self {
            equivalent_sample_size: 5.0,
        }
    }
}

impl ParameterEstimator for BayesianEstimator {
    fn name(&self) -> &'static str {
        "bayesian"
    }

    fn estimate_cpt(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<Cpt, TriageError> {
        let ess = self.equivalent_sample_size;
        if !(ess > 0.0 && ess.is_finite()) {
            return Err(TriageError::Validation(
                "bayesian estimator: equivalent_sample_size must be finite and > 0".into(),
            ));
        }
        let table = ContingencyTable::tabulate(data, variable, parents)?;
        let r = table.cardinality;
        let pseudo = ess / (table.configurations as f64 * r as f64);

        let mut values = table.to_dense()?;
        for row in values.chunks_mut(r) {
            for cell in row.iter_mut() {
                *cell += pseudo;
            }
            normalize_row(row);
        }
        build_cpt(data, variable, parents, values)
    }
}

/// Relative-frequency estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaximumLikelihood;

impl ParameterEstimator for MaximumLikelihood {
    fn name(&self) -> &'static str {
        "maximum_likelihood"
    }

    fn estimate_cpt(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<Cpt, TriageError> {
        let table = ContingencyTable::tabulate(data, variable, parents)?;
        let r = table.cardinality;
        let mut values = table.to_dense()?;
        for row in values.chunks_mut(r) {
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                row.fill(1.0 / r as f64);
                continue;
            }
            for cell in row.iter_mut() {
                *cell = (*cell / total).max(MIN_PROBABILITY);
            }
            normalize_row(row);
        }
        build_cpt(data, variable, parents, values)
    }
}

/// Estimator selector used by configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorKind {
    #[default]
    Bayesian,
    MaximumLikelihood,
}

impl EstimatorKind {
    pub fn build(self, equivalent_sample_size: f64) -> Box<dyn ParameterEstimator> {
        match self {
            EstimatorKind::Bayesian => Box::new(BayesianEstimator {
                equivalent_sample_size,
            }),
            EstimatorKind::MaximumLikelihood => Box::new(MaximumLikelihood),
        }
    }
}

impl std::str::FromStr for EstimatorKind {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bayes" | "bayesian" | "bdeu" => Ok(EstimatorKind::Bayesian),
            "mle" | "ml" | "maximum_likelihood" => Ok(EstimatorKind::MaximumLikelihood),
            other => Err(TriageError::Validation(format!(
                "unknown estimator '{}', expected bayes or mle",
                other
            ))),
        }
    }
}

/// Fits one CPT per node of `dag`, in variable order.
pub fn fit_parameters(
    data: &Dataset,
    dag: &Dag,
    estimator: &dyn ParameterEstimator,
) -> Result<Vec<Cpt>, TriageError> {
    if dag.num_nodes() != data.num_variables() {
        return Err(TriageError::InconsistentStructure(format!(
            "graph has {} nodes but dataset has {} columns",
            dag.num_nodes(),
            data.num_variables()
        )));
    }

    #[cfg(feature = "rayon")]
    let cpts = (0..dag.num_nodes())
        .into_par_iter()
        .map(|v| estimator.estimate_cpt(data, v, dag.parents(v)))
        .collect::<Result<Vec<_>, _>>()?;

    #[cfg(not(feature = "rayon"))]
    let cpts = (0..dag.num_nodes())
        .map(|v| estimator.estimate_cpt(data, v, dag.parents(v)))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        estimator = estimator.name(),
        tables = cpts.len(),
        "fitted conditional probability tables"
    );
    Ok(cpts)
}

fn normalize_row(row: &mut [f64]) {
    let total: f64 = row.iter().sum();
    for cell in row.iter_mut() {
        *cell /= total;
    }
}

fn build_cpt(
    data: &Dataset,
    variable: usize,
    parents: &[usize],
    values: Vec<f64>,
) -> Result<Cpt, TriageError> {
    let parent_cards: Vec<(usize, usize)> =
        parents.iter().map(|&p| (p, data.cardinality(p))).collect();
    Cpt::new(variable, data.cardinality(variable), &parent_cards, values)
}
