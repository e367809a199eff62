//! Discrete factors over variable indices.
//!
//! A factor maps every joint assignment of its scope to a non-negative value.
//! Values are stored row-major with the last scope variable varying fastest.
//! All operations walk assignments with an odometer and carry precomputed
//! strides, so no per-entry index arithmetic is redone from scratch.

use smallvec::SmallVec;

use crate::engine::errors::TriageError;
use crate::engine::model::Cpt;

/// Scopes are small in practice; keep them inline.
pub(crate) type Scope = SmallVec<[usize; 8]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    scope: Scope,
    cardinalities: Scope,
    values: Vec<f64>,
}

impl Factor {
    pub fn new(
        scope: &[usize],
        cardinalities: &[usize],
        values: Vec<f64>,
    ) -> Result<Self, TriageError> {
        if scope.len() != cardinalities.len() {
            return Err(TriageError::Internal(
                "factor scope and cardinalities differ in length".into(),
            ));
        }
        for (idx, var) in scope.iter().enumerate() {
            if scope[..idx].contains(var) {
                return Err(TriageError::Internal(format!(
                    "factor scope repeats variable {}",
                    var
                )));
            }
        }
        let size: usize = cardinalities.iter().product();
        if size != values.len() {
            return Err(TriageError::Internal(format!(
                "factor expects {} values, found {}",
                size,
                values.len()
            )));
        }
        Ok(Self {
            scope: scope.iter().copied().collect(),
            cardinalities: cardinalities.iter().copied().collect(),
            values,
        })
    }

    /// The constant factor with empty scope.
    pub fn unit() -> Self {
        Self {
            scope: Scope::new(),
            cardinalities: Scope::new(),
            values: vec![1.0],
        }
    }

    /// A CPT as a factor over `parents ∪ {child}`; the child is the last scope entry.
    pub fn from_cpt(cpt: &Cpt) -> Self {
        let mut scope: Scope = cpt.parents().iter().copied().collect();
        scope.push(cpt.variable());
        let mut cardinalities: Scope = cpt.parent_cardinalities().iter().copied().collect();
        cardinalities.push(cpt.cardinality());
        Self {
            scope,
            cardinalities,
            values: cpt.values().to_vec(),
        }
    }

    pub fn scope(&self) -> &[usize] {
        &self.scope
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn contains(&self, variable: usize) -> bool {
        self.scope.contains(&variable)
    }

    fn position(&self, variable: usize) -> Option<usize> {
        self.scope.iter().position(|&v| v == variable)
    }

    /// Value at an assignment given in scope order.
    pub fn value(&self, assignment: &[usize]) -> Option<f64> {
        if assignment.len() != self.scope.len() {
            return None;
        }
        let mut index = 0;
        for (&state, &card) in assignment.iter().zip(&self.cardinalities) {
            if state >= card {
                return None;
            }
            index = index * card + state;
        }
        Some(self.values[index])
    }

    /// Pointwise product over the sorted union of both scopes.
    pub fn product(&self, other: &Factor) -> Factor {
        let mut scope: Scope = self.scope.iter().chain(&other.scope).copied().collect();
        scope.sort_unstable();
        scope.dedup();
        let cardinalities: Scope = scope
            .iter()
            .map(|&v| {
                self.position(v)
                    .map(|p| self.cardinalities[p])
                    .or_else(|| other.position(v).map(|p| other.cardinalities[p]))
                    .unwrap_or(1)
            })
            .collect();

        let lhs = self.strides_in(&scope);
        let rhs = other.strides_in(&scope);
        let size: usize = cardinalities.iter().product();
        let mut values = Vec::with_capacity(size);
        let mut assignment: Scope = SmallVec::from_elem(0, scope.len());
        let (mut li, mut ri) = (0usize, 0usize);
        for _ in 0..size {
            values.push(self.values[li] * other.values[ri]);
            for k in (0..scope.len()).rev() {
                assignment[k] += 1;
                li += lhs[k];
                ri += rhs[k];
                if assignment[k] < cardinalities[k] {
                    break;
                }
                li -= lhs[k] * cardinalities[k];
                ri -= rhs[k] * cardinalities[k];
                assignment[k] = 0;
            }
        }
        Factor {
            scope,
            cardinalities,
            values,
        }
    }

    /// Sums `variable` out. A factor that does not mention it is returned unchanged.
    pub fn sum_out(&self, variable: usize) -> Factor {
        let Some(pos) = self.position(variable) else {
            return self.clone();
        };
        let (scope, cardinalities) = self.without(pos);
        let out_strides = {
            let kept = strides(&cardinalities);
            let mut full: Scope = SmallVec::with_capacity(self.scope.len());
            let mut next = 0;
            for k in 0..self.scope.len() {
                if k == pos {
                    full.push(0);
                } else {
                    full.push(kept[next]);
                    next += 1;
                }
            }
            full
        };
        let mut values = vec![0.0; cardinalities.iter().product()];
        let mut assignment: Scope = SmallVec::from_elem(0, self.scope.len());
        let mut oi = 0usize;
        for &value in &self.values {
            values[oi] += value;
            for k in (0..self.scope.len()).rev() {
                assignment[k] += 1;
                oi += out_strides[k];
                if assignment[k] < self.cardinalities[k] {
                    break;
                }
                oi -= out_strides[k] * self.cardinalities[k];
                assignment[k] = 0;
            }
        }
        Factor {
            scope,
            cardinalities,
            values,
        }
    }

    /// Fixes `variable` to `state` and drops it from the scope.
    pub fn reduce(&self, variable: usize, state: usize) -> Result<Factor, TriageError> {
        let Some(pos) = self.position(variable) else {
            return Ok(self.clone());
        };
        if state >= self.cardinalities[pos] {
            return Err(TriageError::Inference(format!(
                "state {} out of range for variable {} with {} states",
                state, variable, self.cardinalities[pos]
            )));
        }
        let (scope, cardinalities) = self.without(pos);
        let stride = strides(&self.cardinalities)[pos];
        let block = stride * self.cardinalities[pos];
        let mut values = Vec::with_capacity(cardinalities.iter().product());
        for outer in (0..self.values.len()).step_by(block) {
            let start = outer + state * stride;
            values.extend_from_slice(&self.values[start..start + stride]);
        }
        Ok(Factor {
            scope,
            cardinalities,
            values,
        })
    }

    /// Marginal over `variables`, returned in the requested order.
    pub fn marginal(&self, variables: &[usize]) -> Result<Factor, TriageError> {
        let mut reduced = self.clone();
        for &v in self.scope.iter().filter(|v| !variables.contains(v)) {
            reduced = reduced.sum_out(v);
        }
        reduced.reorder(variables)
    }

    /// Same factor with the scope permuted into `order`.
    pub fn reorder(&self, order: &[usize]) -> Result<Factor, TriageError> {
        if order.len() != self.scope.len() || order.iter().any(|&v| !self.contains(v)) {
            return Err(TriageError::Internal(format!(
                "cannot reorder factor over {:?} into {:?}",
                self.scope.as_slice(),
                order
            )));
        }
        let source = strides(&self.cardinalities);
        let positions: Scope = order.iter().filter_map(|&v| self.position(v)).collect();
        let cardinalities: Scope = positions.iter().map(|&p| self.cardinalities[p]).collect();
        let mapped: Scope = positions.iter().map(|&p| source[p]).collect();
        let size = self.values.len();
        let mut values = Vec::with_capacity(size);
        let mut assignment: Scope = SmallVec::from_elem(0, order.len());
        let mut si = 0usize;
        for _ in 0..size {
            values.push(self.values[si]);
            for k in (0..order.len()).rev() {
                assignment[k] += 1;
                si += mapped[k];
                if assignment[k] < cardinalities[k] {
                    break;
                }
                si -= mapped[k] * cardinalities[k];
                assignment[k] = 0;
            }
        }
        Ok(Factor {
            scope: order.iter().copied().collect(),
            cardinalities,
            values,
        })
    }

    /// Sum of all entries.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Scales entries to sum to one.
    pub fn normalized(&self) -> Result<Factor, TriageError> {
        let total = self.total();
        if !total.is_finite() {
            return Err(TriageError::Numerical("factor mass is not finite".into()));
        }
        if total <= 0.0 {
            return Err(TriageError::Inference(
                "evidence has zero probability under the model".into(),
            ));
        }
        Ok(Factor {
            scope: self.scope.clone(),
            cardinalities: self.cardinalities.clone(),
            values: self.values.iter().map(|v| v / total).collect(),
        })
    }

    /// Strides of this factor's variables laid out along `scope` (0 where absent).
    fn strides_in(&self, scope: &[usize]) -> Scope {
        let own = strides(&self.cardinalities);
        scope
            .iter()
            .map(|&v| self.position(v).map_or(0, |p| own[p]))
            .collect()
    }

    fn without(&self, pos: usize) -> (Scope, Scope) {
        let scope = self
            .scope
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != pos)
            .map(|(_, &v)| v)
            .collect();
        let cardinalities = self
            .cardinalities
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != pos)
            .map(|(_, &c)| c)
            .collect();
        (scope, cardinalities)
    }
}

/// Row-major strides, last entry fastest.
fn strides(cardinalities: &[usize]) -> Scope {
    let mut out: Scope = SmallVec::from_elem(1, cardinalities.len());
    for k in (0..cardinalities.len().saturating_sub(1)).rev() {
        out[k] = out[k + 1] * cardinalities[k + 1];
    }
    out
}
