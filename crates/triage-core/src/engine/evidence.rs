//! Evidence and posterior value types.
//!
//! Both are transient: evidence is supplied by the caller per query and a
//! posterior is produced fresh by every query. Neither is stored in the model.

use std::collections::BTreeMap;

/// Observed states for a subset of variables, keyed by variable name.
///
/// Values are state indices. For symptom variables `0` means absent and `1`
/// means present. Iteration order is by name, which keeps every consumer
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    observations: BTreeMap<String, usize>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state index for a variable, replacing any earlier observation.
    pub fn insert(&mut self, variable: impl Into<String>, state: usize) {
        self.observations.insert(variable.into(), state);
    }

    /// Records a binary symptom observation.
    pub fn observe(&mut self, symptom: impl Into<String>, present: bool) {
        self.insert(symptom, usize::from(present));
    }

    /// Builder form of [`Self::observe`].
    pub fn with(mut self, symptom: impl Into<String>, present: bool) -> Self {
        self.observe(symptom, present);
        self
    }

    pub fn remove(&mut self, variable: &str) -> Option<usize> {
        self.observations.remove(variable)
    }

    pub fn get(&self, variable: &str) -> Option<usize> {
        self.observations.get(variable).copied()
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.observations.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.observations.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of observations whose state is `1`.
    pub fn positive_count(&self) -> usize {
        self.observations.values().filter(|&&v| v == 1).count()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Evidence {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        let mut evidence = Evidence::new();
        for (name, present) in iter {
            evidence.observe(name, present);
        }
        evidence
    }
}

/// A probability distribution over the states of one variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Posterior {
    variable: String,
    states: Vec<String>,
    probabilities: Vec<f64>,
}

impl Posterior {
    pub(crate) fn new(variable: String, states: Vec<String>, probabilities: Vec<f64>) -> Self {
        debug_assert_eq!(states.len(), probabilities.len());
        Self {
            variable,
            states,
            probabilities,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Probabilities aligned with [`Self::states`].
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn probability(&self, state: &str) -> Option<f64> {
        self.states
            .iter()
            .position(|s| s == state)
            .map(|idx| self.probabilities[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.states
            .iter()
            .map(String::as_str)
            .zip(self.probabilities.iter().copied())
    }

    /// States sorted by descending probability; ties keep state order.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Most probable state. Ties resolve to the earliest state.
    pub fn top(&self) -> Option<(&str, f64)> {
        self.ranked().into_iter().next()
    }

    /// Shannon entropy in bits.
    pub fn entropy(&self) -> f64 {
        shannon_entropy(&self.probabilities)
    }
}

/// Shannon entropy in bits, `-Σ p·log2(p)` over nonzero probabilities.
pub fn shannon_entropy(probabilities: &[f64]) -> f64 {
    let h: f64 = probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum();
    // -0.0 for degenerate distributions
    h.max(0.0)
}
