//! Decomposable structure scores for network search.
//!
//! A score is a sum of local terms, one per variable, each depending only on
//! that variable and its parent set. Higher is better. The hill climber only
//! sees the [`StructureScore`] trait, so new criteria plug in without touching
//! the search loop.
//!
//! Available criteria:
//! - `Bic`: `LL - ½ ln(N) · q(r-1)`
//! - `Aic`: `LL - q(r-1)`
//! - `Bdeu`: log marginal likelihood under a uniform Dirichlet prior with an
//!   equivalent sample size

use std::f64::consts::PI;

use crate::engine::counts::ContingencyTable;
use crate::engine::errors::TriageError;
use crate::storage::Dataset;

/// A decomposable network score.
pub trait StructureScore: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Local score of `variable` given `parents` (sorted variable indices).
    fn local_score(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<f64, TriageError>;
}

/// Bayesian Information Criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct BicScore;

impl StructureScore for BicScore {
    fn name(&self) -> &'static str {
        "bic"
    }

    fn local_score(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<f64, TriageError> {
        let table = ContingencyTable::tabulate(data, variable, parents)?;
        let n = table.total.max(1.0);
        Ok(table.log_likelihood() - 0.5 * n.ln() * table.free_parameters())
    }
}

/// Akaike Information Criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AicScore;

impl StructureScore for AicScore {
    fn name(&self) -> &'static str {
        "aic"
    }

    fn local_score(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<f64, TriageError> {
        let table = ContingencyTable::tabulate(data, variable, parents)?;
        Ok(table.log_likelihood() - table.free_parameters())
    }
}

/// Bayesian Dirichlet equivalent uniform score.
#[derive(Debug, Clone, Copy)]
pub struct BdeuScore {
    pub equivalent_sample_size: f64,
}

impl Default for BdeuScore {
    fn default() -> Self {
        Self {
            equivalent_sample_size: 10.0,
        }
    }
}

impl StructureScore for BdeuScore {
    fn name(&self) -> &'static str {
        "bdeu"
    }

    fn local_score(
        &self,
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<f64, TriageError> {
        if !(self.equivalent_sample_size > 0.0 && self.equivalent_sample_size.is_finite()) {
            return Err(TriageError::Validation(
                "bdeu: equivalent_sample_size must be finite and > 0".into(),
            ));
        }
        let table = ContingencyTable::tabulate(data, variable, parents)?;
        let q = table.configurations as f64;
        let r = table.cardinality as f64;
        let alpha_j = self.equivalent_sample_size / q;
        let alpha_jk = alpha_j / r;

        // Unobserved configurations contribute exactly zero.
        let mut score = 0.0;
        for counts in table.observed.values() {
            let n_j: f64 = counts.iter().sum();
            score += ln_gamma(alpha_j) - ln_gamma(alpha_j + n_j);
            for &n_jk in counts {
                score += ln_gamma(alpha_jk + n_jk) - ln_gamma(alpha_jk);
            }
        }
        Ok(score)
    }
}

/// Score selector used by configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreKind {
    #[default]
    Bic,
    Aic,
    Bdeu,
}

impl ScoreKind {
    /// Builds the scoring strategy. `equivalent_sample_size` is used by BDeu only.
    pub fn build(self, equivalent_sample_size: f64) -> Box<dyn StructureScore> {
        match self {
            ScoreKind::Bic => Box::new(BicScore),
            ScoreKind::Aic => Box::new(AicScore),
            ScoreKind::Bdeu => Box::new(BdeuScore {
                equivalent_sample_size,
            }),
        }
    }
}

impl std::str::FromStr for ScoreKind {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bic" => Ok(ScoreKind::Bic),
            "aic" => Ok(ScoreKind::Aic),
            "bdeu" => Ok(ScoreKind::Bdeu),
            other => Err(TriageError::Validation(format!(
                "unknown score '{}', expected bic, aic or bdeu",
                other
            ))),
        }
    }
}

/// Total score of a parent assignment: the sum of local scores.
pub fn network_score(
    data: &Dataset,
    score: &dyn StructureScore,
    parents: impl IntoIterator<Item = (usize, Vec<usize>)>,
) -> Result<f64, TriageError> {
    let mut total = 0.0;
    for (variable, parent_set) in parents {
        total += score.local_score(data, variable, &parent_set)?;
    }
    Ok(total)
}

/// `ln Γ(x)` via recurrence and Stirling's series.
fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }
    let mut x = x;
    let mut result = 0.0;
    while x < 10.0 {
        result -= x.ln();
        x += 1.0;
    }
    let inv_x = 1.0 / x;
    let inv_x2 = inv_x * inv_x;
    let correction = inv_x * (1.0 / 12.0 - inv_x2 * (1.0 / 360.0 - inv_x2 / 1260.0));
    result + (x - 0.5) * x.ln() - x + 0.5 * (2.0 * PI).ln() + correction
}
