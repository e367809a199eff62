//! # Bayesian Network Model
//!
//! Owned value types for a discrete Bayesian network:
//!
//! - **Variable**: a named variable with an ordered, non-empty state set
//! - **Cpt**: the conditional distribution of one variable given its parents
//! - **BayesNet**: the arena holding every variable, the DAG and one CPT per node
//!
//! ## CPT layout
//!
//! A CPT stores one distribution per parent configuration, row-major. Parents
//! are ordered by ascending variable index (the DAG's order). The configuration
//! index treats the first parent as the most significant digit, so for parents
//! `[a, b]` with cardinalities `[2, 3]` the configuration `(a=1, b=2)` is row
//! `1 * 3 + 2`. Within a row, probabilities follow the child's state order.
//!
//! A `BayesNet` is immutable after construction and is shared read-only by
//! every inference call.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::dag::Dag;
use crate::engine::errors::TriageError;

/// Tolerance for a CPT row to count as normalized.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// A named discrete variable with ordered states.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    name: String,
    states: Vec<String>,
}

impl Variable {
    /// Creates a variable, rejecting empty or duplicated state sets.
    pub fn new(name: impl Into<String>, states: Vec<String>) -> Result<Self, TriageError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TriageError::Validation("variable name must not be empty".into()));
        }
        if states.is_empty() {
            return Err(TriageError::Validation(format!(
                "variable '{}' has no states",
                name
            )));
        }
        for (idx, state) in states.iter().enumerate() {
            if states[..idx].contains(state) {
                return Err(TriageError::Validation(format!(
                    "variable '{}' repeats state '{}'",
                    name, state
                )));
            }
        }
        Ok(Self { name, states })
    }

    /// A `{0, 1}` symptom variable.
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: vec!["0".into(), "1".into()],
        }
    }

    /// Used by the dataset loader, whose state sets are validated on load.
    pub(crate) fn from_parts(name: String, states: Vec<String>) -> Self {
        Self { name, states }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }
}

/// Conditional probability table of one variable given its parents.
#[derive(Debug, Clone, PartialEq)]
pub struct Cpt {
    variable: usize,
    cardinality: usize,
    parents: SmallVec<[usize; 4]>,
    parent_cardinalities: SmallVec<[usize; 4]>,
    values: Vec<f64>,
}

impl Cpt {
    /// Creates a CPT and checks its invariants.
    ///
    /// `parents` pairs each parent variable index with its cardinality and must
    /// be sorted by variable index. `values` holds one normalized row per
    /// parent configuration (see the module docs for the layout). Every
    /// probability must lie in `(0, 1)` unless the child has a single state.
    pub fn new(
        variable: usize,
        cardinality: usize,
        parents: &[(usize, usize)],
        values: Vec<f64>,
    ) -> Result<Self, TriageError> {
        if cardinality == 0 {
            return Err(TriageError::Validation(format!(
                "cpt for variable {} has zero states",
                variable
            )));
        }
        if parents.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(TriageError::Validation(format!(
                "cpt for variable {} must list parents in ascending order without repeats",
                variable
            )));
        }
        if parents.iter().any(|&(p, card)| p == variable || card == 0) {
            return Err(TriageError::Validation(format!(
                "cpt for variable {} has an invalid parent",
                variable
            )));
        }
        let configurations = configuration_count(parents.iter().map(|&(_, c)| c))?;
        let expected = configurations.checked_mul(cardinality).ok_or_else(|| {
            TriageError::Validation(format!("cpt for variable {} is too large", variable))
        })?;
        if values.len() != expected {
            return Err(TriageError::Validation(format!(
                "cpt for variable {} expects {} values, found {}",
                variable,
                expected,
                values.len()
            )));
        }

        for (row_idx, row) in values.chunks(cardinality).enumerate() {
            if row.iter().any(|p| !p.is_finite()) {
                return Err(TriageError::Numerical(format!(
                    "cpt for variable {} row {} contains a non-finite value",
                    variable, row_idx
                )));
            }
            let open_interval = cardinality > 1;
            if row
                .iter()
                .any(|&p| if open_interval { p <= 0.0 || p >= 1.0 } else { p <= 0.0 })
            {
                return Err(TriageError::Validation(format!(
                    "cpt for variable {} row {} has a probability outside (0, 1)",
                    variable, row_idx
                )));
            }
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
                return Err(TriageError::Validation(format!(
                    "cpt for variable {} row {} sums to {}",
                    variable, row_idx, sum
                )));
            }
        }

        Ok(Self {
            variable,
            cardinality,
            parents: parents.iter().map(|&(p, _)| p).collect(),
            parent_cardinalities: parents.iter().map(|&(_, c)| c).collect(),
            values,
        })
    }

    /// Index of the variable this table belongs to.
    pub fn variable(&self) -> usize {
        self.variable
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn parent_cardinalities(&self) -> &[usize] {
        &self.parent_cardinalities
    }

    pub fn num_configurations(&self) -> usize {
        self.values.len() / self.cardinality
    }

    /// Flat row-major probabilities.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Child distribution for one parent configuration index.
    pub fn distribution(&self, configuration: usize) -> &[f64] {
        let start = configuration * self.cardinality;
        &self.values[start..start + self.cardinality]
    }

    /// All rows in configuration order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.cardinality)
    }

    /// Configuration index for parent states given in parent order.
    pub fn configuration_index(&self, parent_states: &[usize]) -> Option<usize> {
        if parent_states.len() != self.parents.len() {
            return None;
        }
        let mut index = 0;
        for (&state, &card) in parent_states.iter().zip(&self.parent_cardinalities) {
            if state >= card {
                return None;
            }
            index = index * card + state;
        }
        Some(index)
    }

    /// Parent states of a configuration index, in parent order.
    pub fn configuration_states(&self, mut configuration: usize) -> SmallVec<[usize; 4]> {
        let mut states: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.parents.len());
        for (slot, &card) in self.parent_cardinalities.iter().enumerate().rev() {
            states[slot] = configuration % card;
            configuration /= card;
        }
        states
    }

    /// `P(variable = state | parents = parent_states)`.
    pub fn probability(&self, parent_states: &[usize], state: usize) -> Option<f64> {
        if state >= self.cardinality {
            return None;
        }
        self.configuration_index(parent_states)
            .map(|config| self.distribution(config)[state])
    }
}

/// Product of parent cardinalities, guarded against overflow.
pub(crate) fn configuration_count(
    cardinalities: impl IntoIterator<Item = usize>,
) -> Result<usize, TriageError> {
    cardinalities.into_iter().try_fold(1usize, |acc, card| {
        acc.checked_mul(card).ok_or_else(|| {
            TriageError::Validation("parent configuration count overflows".into())
        })
    })
}

/// A DAG with one CPT per variable.
#[derive(Debug, Clone)]
pub struct BayesNet {
    variables: Vec<Variable>,
    index: FxHashMap<String, usize>,
    dag: Dag,
    cpts: Vec<Cpt>,
}

impl BayesNet {
    /// Assembles a network.
    ///
    /// Fails with [`TriageError::InconsistentStructure`] when the CPTs do not
    /// line up with the DAG: a missing or duplicated CPT, a parent list that
    /// differs from the DAG's recorded parents, or mismatched cardinalities.
    pub fn new(variables: Vec<Variable>, dag: Dag, cpts: Vec<Cpt>) -> Result<Self, TriageError> {
        if dag.num_nodes() != variables.len() {
            return Err(TriageError::InconsistentStructure(format!(
                "graph has {} nodes but {} variables were declared",
                dag.num_nodes(),
                variables.len()
            )));
        }
        if !dag.is_acyclic() {
            return Err(TriageError::Structure("graph contains a cycle".into()));
        }

        let mut index = FxHashMap::default();
        for (idx, variable) in variables.iter().enumerate() {
            if index.insert(variable.name.clone(), idx).is_some() {
                return Err(TriageError::InconsistentStructure(format!(
                    "variable '{}' declared twice",
                    variable.name
                )));
            }
        }

        let mut slots: Vec<Option<Cpt>> = vec![None; variables.len()];
        for cpt in cpts {
            let idx = cpt.variable;
            let slot = slots.get_mut(idx).ok_or_else(|| {
                TriageError::InconsistentStructure(format!(
                    "cpt refers to unknown variable index {}",
                    idx
                ))
            })?;
            if slot.is_some() {
                return Err(TriageError::InconsistentStructure(format!(
                    "variable '{}' has more than one cpt",
                    variables[idx].name
                )));
            }
            *slot = Some(cpt);
        }

        let mut ordered = Vec::with_capacity(variables.len());
        for (idx, slot) in slots.into_iter().enumerate() {
            let name = &variables[idx].name;
            let cpt = slot.ok_or_else(|| {
                TriageError::InconsistentStructure(format!("variable '{}' has no cpt", name))
            })?;
            if cpt.parents() != dag.parents(idx) {
                return Err(TriageError::InconsistentStructure(format!(
                    "cpt parents of '{}' do not match the graph",
                    name
                )));
            }
            if cpt.cardinality != variables[idx].cardinality() {
                return Err(TriageError::InconsistentStructure(format!(
                    "cpt of '{}' has {} states, variable has {}",
                    name,
                    cpt.cardinality,
                    variables[idx].cardinality()
                )));
            }
            for (&parent, &card) in cpt.parents.iter().zip(&cpt.parent_cardinalities) {
                if variables[parent].cardinality() != card {
                    return Err(TriageError::InconsistentStructure(format!(
                        "cpt of '{}' assumes {} states for parent '{}'",
                        name, card, variables[parent].name
                    )));
                }
            }
            ordered.push(cpt);
        }

        Ok(Self {
            variables,
            index,
            dag,
            cpts: ordered,
        })
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, idx: usize) -> &Variable {
        &self.variables[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.index_of(name).map(|idx| &self.variables[idx])
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn cpt(&self, idx: usize) -> &Cpt {
        &self.cpts[idx]
    }

    pub fn cpts(&self) -> &[Cpt] {
        &self.cpts
    }

    pub fn cpt_by_name(&self, name: &str) -> Option<&Cpt> {
        self.index_of(name).map(|idx| &self.cpts[idx])
    }

    /// Edges as `(parent, child)` names, in index order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.dag
            .edges()
            .into_iter()
            .map(|(src, dst)| (self.variables[src].name(), self.variables[dst].name()))
            .collect()
    }

    /// Parent names of a variable.
    pub fn parent_names(&self, idx: usize) -> Vec<&str> {
        self.dag
            .parents(idx)
            .iter()
            .map(|&p| self.variables[p].name())
            .collect()
    }

    /// Number of free parameters: `Σ q_i (r_i - 1)`.
    pub fn num_parameters(&self) -> usize {
        self.cpts
            .iter()
            .map(|cpt| cpt.num_configurations() * (cpt.cardinality - 1))
            .sum()
    }

    /// Read-only snapshot for visualization and serialization.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .variables
            .iter()
            .enumerate()
            .map(|(idx, variable)| {
                let cpt = &self.cpts[idx];
                let table = (0..cpt.num_configurations())
                    .map(|config| CptRowExport {
                        parent_states: cpt
                            .configuration_states(config)
                            .iter()
                            .zip(cpt.parents())
                            .map(|(&state, &parent)| self.variables[parent].states[state].clone())
                            .collect(),
                        probabilities: cpt.distribution(config).to_vec(),
                    })
                    .collect();
                NodeExport {
                    name: variable.name.clone(),
                    states: variable.states.clone(),
                    parents: self.parent_names(idx).into_iter().map(str::to_string).collect(),
                    table,
                }
            })
            .collect();
        let edges = self
            .edges()
            .into_iter()
            .map(|(source, target)| EdgeExport {
                source: source.to_string(),
                target: target.to_string(),
            })
            .collect();
        GraphExport { nodes, edges }
    }
}

/// Exported graph: nodes with their CPTs plus the edge list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeExport {
    pub name: String,
    pub states: Vec<String>,
    pub parents: Vec<String>,
    pub table: Vec<CptRowExport>,
}

/// One CPT row: the parent state names and the child distribution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CptRowExport {
    pub parent_states: Vec<String>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EdgeExport {
    pub source: String,
    pub target: String,
}

impl GraphExport {
    /// Renders the structure as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph bayes_net {\n    rankdir=LR;\n");
        for node in &self.nodes {
            out.push_str(&format!(
                "    \"{}\" [label=\"{}\\n({} states)\"];\n",
                escape_dot(&node.name),
                escape_dot(&node.name),
                node.states.len()
            ));
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape_dot(&edge.source),
                escape_dot(&edge.target)
            ));
        }
        out.push_str("}\n");
        out
    }
}

fn escape_dot(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flu_variables() -> Vec<Variable> {
        vec![
            Variable::binary("fever"),
            Variable::binary("cough"),
            Variable::new("flu", vec!["no".into(), "yes".into()]).expect("flu"),
        ]
    }

    fn flu_net() -> BayesNet {
        let dag = Dag::from_edges(3, [(0, 2), (1, 2)]).expect("dag");
        let cpts = vec![
            Cpt::new(0, 2, &[], vec![0.7, 0.3]).expect("fever"),
            Cpt::new(1, 2, &[], vec![0.6, 0.4]).expect("cough"),
            Cpt::new(
                2,
                2,
                &[(0, 2), (1, 2)],
                vec![0.95, 0.05, 0.8, 0.2, 0.6, 0.4, 0.1, 0.9],
            )
            .expect("flu"),
        ];
        BayesNet::new(flu_variables(), dag, cpts).expect("net")
    }

    #[test]
    fn cpt_indexes_first_parent_most_significant() {
        let net = flu_net();
        let cpt = net.cpt_by_name("flu").expect("cpt");
        assert_eq!(cpt.configuration_index(&[1, 0]), Some(2));
        assert_eq!(cpt.probability(&[1, 0], 1), Some(0.4));
        assert_eq!(cpt.configuration_states(3).as_slice(), &[1, 1]);
        assert_eq!(cpt.probability(&[2, 0], 0), None);
    }

    #[test]
    fn cpt_rejects_unnormalized_and_zero_rows() {
        let err = Cpt::new(0, 2, &[], vec![0.5, 0.6]).expect_err("sum");
        assert!(err.to_string().contains("sums to"));
        assert!(Cpt::new(0, 2, &[], vec![1.0, 0.0]).is_err());
        assert!(Cpt::new(0, 2, &[(1, 2)], vec![0.5, 0.5]).is_err());
        assert!(Cpt::new(0, 1, &[], vec![1.0]).is_ok());
    }

    #[test]
    fn network_rejects_parent_mismatch() {
        let dag = Dag::from_edges(3, [(0, 2)]).expect("dag");
        let cpts = vec![
            Cpt::new(0, 2, &[], vec![0.7, 0.3]).expect("fever"),
            Cpt::new(1, 2, &[], vec![0.6, 0.4]).expect("cough"),
            Cpt::new(2, 2, &[(1, 2)], vec![0.9, 0.1, 0.2, 0.8]).expect("flu"),
        ];
        let err = BayesNet::new(flu_variables(), dag, cpts).expect_err("mismatch");
        assert!(matches!(err, TriageError::InconsistentStructure(_)));
    }

    #[test]
    fn network_rejects_missing_cpt() {
        let dag = Dag::new(3);
        let cpts = vec![Cpt::new(0, 2, &[], vec![0.7, 0.3]).expect("fever")];
        let err = BayesNet::new(flu_variables(), dag, cpts).expect_err("missing");
        assert!(err.to_string().contains("has no cpt"));
    }

    #[test]
    fn export_lists_rows_with_state_names() {
        let export = flu_net().export();
        assert_eq!(export.edges.len(), 2);
        let flu = &export.nodes[2];
        assert_eq!(flu.parents, vec!["fever", "cough"]);
        assert_eq!(flu.table.len(), 4);
        assert_eq!(flu.table[1].parent_states, vec!["0", "1"]);
        assert_eq!(flu.table[1].probabilities, vec![0.8, 0.2]);

        let dot = export.to_dot();
        assert!(dot.contains("\"fever\" -> \"flu\";"));
    }

    #[test]
    fn parameter_count_sums_free_entries() {
        assert_eq!(flu_net().num_parameters(), 1 + 1 + 4);
    }
}
