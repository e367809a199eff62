//! End-to-end model construction.
//!
//! [`learn_model`] runs the whole learning pipeline on a loaded dataset:
//! hill-climbing structure search, CPT estimation, network assembly. It
//! returns a [`DiagnosticModel`], which bundles the immutable network with a
//! ready-to-query inference engine. Any failure aborts the pipeline; no
//! partially built model is ever returned.

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::sync::Arc;

use crate::engine::errors::TriageError;
use crate::engine::estimator::{fit_parameters, EstimatorKind};
use crate::engine::evidence::{Evidence, Posterior};
use crate::engine::inference::VariableElimination;
use crate::engine::model::{BayesNet, GraphExport};
use crate::engine::scoring::ScoreKind;
use crate::engine::structure::{HillClimbConfig, HillClimbDiagnostics, HillClimbSearch};
use crate::engine::triage::{TriageAgent, TriageConfig};
use crate::storage::Dataset;

/// Configuration for [`learn_model`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnConfig {
    /// Maximum number of structure edits.
    pub max_iterations: usize,
    /// Optional cap on parents per variable.
    pub max_indegree: Option<usize>,
    /// Structure score.
    pub score: ScoreKind,
    /// Parameter estimator.
    pub estimator: EstimatorKind,
    /// Equivalent sample size shared by the BDeu score and the Bayesian estimator.
    pub equivalent_sample_size: f64,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            max_indegree: None,
            score: ScoreKind::default(),
            estimator: EstimatorKind::default(),
            equivalent_sample_size: 5.0,
        }
    }
}

impl LearnConfig {
    pub fn validate(self) -> Result<Self, TriageError> {
        self.hill_climb().validate()?;
        if !(self.equivalent_sample_size > 0.0 && self.equivalent_sample_size.is_finite()) {
            return Err(TriageError::Validation(format!(
                "learn: equivalent_sample_size must be finite and > 0, got {}",
                self.equivalent_sample_size
            )));
        }
        Ok(self)
    }

    pub fn hill_climb(&self) -> HillClimbConfig {
        HillClimbConfig {
            max_iterations: self.max_iterations,
            max_indegree: self.max_indegree,
            ..HillClimbConfig::default()
        }
    }
}

/// Learns structure and parameters from `data` and wraps the result for querying.
pub fn learn_model(data: &Dataset, config: &LearnConfig) -> Result<DiagnosticModel, TriageError> {
    let config = config.validate()?;
    tracing::info!(
        records = data.len(),
        variables = data.num_variables(),
        target = data.target_name(),
        "learning diagnostic model"
    );

    let score = config.score.build(config.equivalent_sample_size);
    let search = HillClimbSearch::new(data, score.as_ref(), config.hill_climb())?;
    let (dag, diagnostics) = search.estimate()?;

    let estimator = config.estimator.build(config.equivalent_sample_size);
    let cpts = fit_parameters(data, &dag, estimator.as_ref())?;
    let network = BayesNet::new(data.variables(), dag, cpts)?;

    tracing::info!(
        edges = network.dag().edge_count(),
        parameters = network.num_parameters(),
        iterations = diagnostics.iterations_run,
        final_score = diagnostics.final_score,
        "model ready"
    );

    let mut model = DiagnosticModel::from_network(network, data.target_name())?;
    model.diagnostics = Some(diagnostics);
    Ok(model)
}

/// A learned network plus its inference handle.
#[derive(Debug, Clone)]
pub struct DiagnosticModel {
    engine: VariableElimination,
    target: String,
    symptoms: Vec<String>,
    diagnostics: Option<HillClimbDiagnostics>,
}

impl DiagnosticModel {
    /// Wraps an existing network. Every variable other than `target` is a symptom.
    pub fn from_network(network: BayesNet, target: &str) -> Result<Self, TriageError> {
        if network.index_of(target).is_none() {
            return Err(TriageError::Inference(format!(
                "unknown target variable '{}'",
                target
            )));
        }
        let mut symptoms: Vec<String> = network
            .variables()
            .iter()
            .map(|v| v.name().to_string())
            .filter(|name| name != target)
            .collect();
        symptoms.sort();
        Ok(Self {
            engine: VariableElimination::new(Arc::new(network)),
            target: target.to_string(),
            symptoms,
            diagnostics: None,
        })
    }

    pub fn network(&self) -> &BayesNet {
        self.engine.network()
    }

    pub fn engine(&self) -> &VariableElimination {
        &self.engine
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn target_states(&self) -> &[String] {
        self.network()
            .variable_by_name(&self.target)
            .map(|v| v.states())
            .unwrap_or(&[])
    }

    /// Symptom names, sorted.
    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    /// Structure search diagnostics; `None` for wrapped networks.
    pub fn diagnostics(&self) -> Option<&HillClimbDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Diagnosis posterior given the evidence (the prior when it is empty).
    pub fn query(&self, evidence: &Evidence) -> Result<Posterior, TriageError> {
        self.engine.query(&self.target, evidence)
    }

    /// Posterior of any variable.
    pub fn query_variable(
        &self,
        variable: &str,
        evidence: &Evidence,
    ) -> Result<Posterior, TriageError> {
        self.engine.query(variable, evidence)
    }

    pub fn triage_agent(&self, config: TriageConfig) -> Result<TriageAgent, TriageError> {
        TriageAgent::with_symptoms(
            self.engine.clone(),
            &self.target,
            self.symptoms.clone(),
            config,
        )
    }

    /// Next question under the default triage configuration.
    pub fn next_best_question(&self, evidence: &Evidence) -> Option<String> {
        match self.triage_agent(TriageConfig::default()) {
            Ok(agent) => agent.next_best_question(evidence),
            Err(err) => {
                tracing::warn!(error = %err, "triage agent unavailable");
                None
            }
        }
    }

    /// Most probable diagnosis for the evidence.
    pub fn predict(&self, evidence: &Evidence) -> Result<String, TriageError> {
        self.engine
            .map_query(&self.target, evidence)
            .map(|(state, _)| state)
    }

    /// Predicts every record of `data`, using all of its symptom columns as evidence.
    pub fn predict_batch(&self, data: &Dataset) -> Result<Vec<String>, TriageError> {
        #[cfg(feature = "rayon")]
        let predictions = (0..data.len())
            .into_par_iter()
            .map(|row| self.predict(&data.row_evidence(row)))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let predictions = (0..data.len())
            .map(|row| self.predict(&data.row_evidence(row)))
            .collect();

        predictions
    }

    pub fn export(&self) -> GraphExport {
        self.network().export()
    }
}
