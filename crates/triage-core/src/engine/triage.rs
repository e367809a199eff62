//! Information-gain question selection.
//!
//! [`TriageAgent`] is a stateless policy over a [`VariableElimination`]
//! engine. Every call receives the evidence gathered so far and derives its
//! answer from the network alone, so one agent can serve any number of
//! concurrent sessions.
//!
//! ## Question selection
//!
//! For each unanswered symptom `s` the agent computes
//!
//! ```text
//! IG(s) = H(T | e) - Σ_k P(s = k | e) · H(T | e, s = k)
//! ```
//!
//! and asks the symptom with the largest gain. Gains within
//! [`GAIN_EPSILON`] of each other are ties, resolved by the smaller symptom
//! name. No question is asked once the most probable diagnosis exceeds the
//! confidence threshold.
//!
//! ## Sessions
//!
//! [`TriageSession`] is owned by the caller and holds the answer history.
//! The agent only ever sees `&Evidence`.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::engine::errors::TriageError;
use crate::engine::evidence::{shannon_entropy, Evidence, Posterior};
use crate::engine::inference::VariableElimination;

/// Gains closer than this are treated as equal.
pub const GAIN_EPSILON: f64 = 1e-12;

/// Tunables for the triage policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriageConfig {
    /// Stop asking once the top diagnosis probability exceeds this value.
    pub confidence_threshold: f64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.95,
        }
    }
}

impl TriageConfig {
    pub fn validate(self) -> Result<Self, TriageError> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(TriageError::Validation(format!(
                "triage: confidence_threshold must be in (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(self)
    }
}

/// Expected value of asking one symptom.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QuestionScore {
    pub symptom: String,
    /// Expected entropy reduction of the diagnosis, in bits.
    pub information_gain: f64,
    /// Expected diagnosis entropy after the answer, in bits.
    pub expected_entropy: f64,
    /// `P(symptom present | evidence)`.
    pub p_present: f64,
}

#[derive(Debug, Clone)]
pub struct TriageAgent {
    engine: VariableElimination,
    target: String,
    symptoms: Vec<String>,
    config: TriageConfig,
}

impl TriageAgent {
    /// Agent whose candidate questions are every variable except `target`.
    pub fn new(
        engine: VariableElimination,
        target: &str,
        config: TriageConfig,
    ) -> Result<Self, TriageError> {
        let symptoms = engine
            .network()
            .variables()
            .iter()
            .map(|v| v.name().to_string())
            .filter(|name| name != target)
            .collect();
        Self::with_symptoms(engine, target, symptoms, config)
    }

    /// Agent restricted to an explicit set of candidate questions.
    pub fn with_symptoms(
        engine: VariableElimination,
        target: &str,
        mut symptoms: Vec<String>,
        config: TriageConfig,
    ) -> Result<Self, TriageError> {
        let config = config.validate()?;
        if engine.network().index_of(target).is_none() {
            return Err(TriageError::Inference(format!(
                "unknown target variable '{}'",
                target
            )));
        }
        for symptom in &symptoms {
            if symptom == target {
                return Err(TriageError::Validation(format!(
                    "target '{}' cannot be a question",
                    target
                )));
            }
            if engine.network().index_of(symptom).is_none() {
                return Err(TriageError::Inference(format!(
                    "unknown symptom '{}'",
                    symptom
                )));
            }
        }
        symptoms.sort();
        symptoms.dedup();
        Ok(Self {
            engine,
            target: target.to_string(),
            symptoms,
            config,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Candidate questions, sorted by name.
    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    pub fn config(&self) -> TriageConfig {
        self.config
    }

    pub fn engine(&self) -> &VariableElimination {
        &self.engine
    }

    /// Diagnosis posterior, or `None` when nothing has been observed yet or
    /// the query fails.
    pub fn current_posterior(&self, evidence: &Evidence) -> Option<Posterior> {
        if evidence.is_empty() {
            return None;
        }
        match self.engine.query(&self.target, evidence) {
            Ok(posterior) => Some(posterior),
            Err(err) => {
                tracing::warn!(error = %err, "diagnosis query failed");
                None
            }
        }
    }

    /// Diagnosis posterior including the prior for empty evidence.
    pub fn posterior(&self, evidence: &Evidence) -> Result<Posterior, TriageError> {
        self.engine.query(&self.target, evidence)
    }

    /// Shannon entropy of a posterior, in bits.
    pub fn entropy(posterior: &Posterior) -> f64 {
        shannon_entropy(posterior.probabilities())
    }

    /// Whether the top diagnosis already exceeds the confidence threshold.
    pub fn is_confident(&self, posterior: &Posterior) -> bool {
        posterior
            .top()
            .map_or(false, |(_, p)| p > self.config.confidence_threshold)
    }

    /// Unanswered symptoms, sorted by name.
    pub fn unanswered<'a>(
        &'a self,
        evidence: &'a Evidence,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.symptoms
            .iter()
            .map(String::as_str)
            .filter(move |s| !evidence.contains(s))
    }

    /// Scores every unanswered symptom, best question first. Candidates whose
    /// queries fail are logged and left out.
    pub fn rank_questions(&self, evidence: &Evidence) -> Vec<QuestionScore> {
        let Some(current) = self.diagnosis(evidence) else {
            return Vec::new();
        };
        let current_entropy = Self::entropy(&current);
        let candidates: Vec<&str> = self.unanswered(evidence).collect();

        #[cfg(feature = "rayon")]
        let scored: Vec<Option<QuestionScore>> = candidates
            .par_iter()
            .map(|s| self.score_candidate(s, evidence, current_entropy))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let scored: Vec<Option<QuestionScore>> = candidates
            .iter()
            .map(|s| self.score_candidate(s, evidence, current_entropy))
            .collect();

        // candidates are name-sorted, so stable insertion keeps name order on ties
        let mut ranked: Vec<QuestionScore> = Vec::with_capacity(scored.len());
        for score in scored.into_iter().flatten() {
            let slot = ranked
                .iter()
                .position(|r| score.information_gain > r.information_gain + GAIN_EPSILON)
                .unwrap_or(ranked.len());
            ranked.insert(slot, score);
        }
        ranked
    }

    /// Symptom with the largest expected information gain, or `None` when
    /// every symptom is answered or the diagnosis is already confident.
    pub fn next_best_question(&self, evidence: &Evidence) -> Option<String> {
        let current = self.diagnosis(evidence)?;
        if self.is_confident(&current) {
            tracing::debug!(top = ?current.top(), "confidence threshold reached");
            return None;
        }
        self.rank_questions(evidence)
            .into_iter()
            .next()
            .map(|q| q.symptom)
    }

    fn diagnosis(&self, evidence: &Evidence) -> Option<Posterior> {
        match self.posterior(evidence) {
            Ok(posterior) => Some(posterior),
            Err(err) => {
                tracing::warn!(error = %err, "diagnosis query failed");
                None
            }
        }
    }

    fn score_candidate(
        &self,
        symptom: &str,
        evidence: &Evidence,
        current_entropy: f64,
    ) -> Option<QuestionScore> {
        match self.expected_entropy(symptom, evidence) {
            Ok((expected_entropy, p_present)) => Some(QuestionScore {
                symptom: symptom.to_string(),
                information_gain: (current_entropy - expected_entropy).max(0.0),
                expected_entropy,
                p_present,
            }),
            Err(err) => {
                tracing::warn!(symptom, error = %err, "skipping candidate question");
                None
            }
        }
    }

    fn expected_entropy(
        &self,
        symptom: &str,
        evidence: &Evidence,
    ) -> Result<(f64, f64), TriageError> {
        let answers = self.engine.query(symptom, evidence)?;
        let mut expected = 0.0;
        for (state, &p_answer) in answers.probabilities().iter().enumerate() {
            if p_answer <= 0.0 {
                continue;
            }
            let mut branch = evidence.clone();
            branch.insert(symptom, state);
            let posterior = self.engine.query(&self.target, &branch)?;
            expected += p_answer * Self::entropy(&posterior);
        }
        if !expected.is_finite() {
            return Err(TriageError::Numerical(format!(
                "expected entropy for '{}' is not finite",
                symptom
            )));
        }
        let p_present = answers.probability("1").unwrap_or(0.0);
        Ok((expected, p_present))
    }
}

/// Caller-owned record of one triage conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriageSession {
    history: Vec<(String, bool)>,
    evidence: Evidence,
}

impl TriageSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answer. Answering again replaces the earlier answer and
    /// moves it to the end of the history.
    pub fn record(&mut self, symptom: impl Into<String>, present: bool) {
        let symptom = symptom.into();
        self.history.retain(|(s, _)| *s != symptom);
        self.evidence.observe(symptom.clone(), present);
        self.history.push((symptom, present));
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    /// Answers in the order they were given.
    pub fn history(&self) -> &[(String, bool)] {
        &self.history
    }

    pub fn is_answered(&self, symptom: &str) -> bool {
        self.evidence.contains(symptom)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dag::Dag;
    use crate::engine::model::{BayesNet, Cpt, Variable};
    use std::sync::Arc;

    /// `d` is the diagnosis; `strong` and `twin` are identical informative
    /// symptoms, `noise` is independent of `d`.
    fn agent(prior: [f64; 2]) -> TriageAgent {
        let variables = vec![
            Variable::binary("d"),
            Variable::binary("strong"),
            Variable::binary("twin"),
            Variable::binary("noise"),
        ];
        let dag = Dag::from_edges(4, [(0, 1), (0, 2), (0, 3)]).expect("dag");
        let cpts = vec![
            Cpt::new(0, 2, &[], prior.to_vec()).expect("d"),
            Cpt::new(1, 2, &[(0, 2)], vec![0.9, 0.1, 0.2, 0.8]).expect("strong"),
            Cpt::new(2, 2, &[(0, 2)], vec![0.9, 0.1, 0.2, 0.8]).expect("twin"),
            Cpt::new(3, 2, &[(0, 2)], vec![0.5, 0.5, 0.5, 0.5]).expect("noise"),
        ];
        let net = BayesNet::new(variables, dag, cpts).expect("net");
        TriageAgent::new(
            VariableElimination::new(Arc::new(net)),
            "d",
            TriageConfig::default(),
        )
        .expect("agent")
    }

    #[test]
    fn symptoms_exclude_target_and_are_sorted() {
        let agent = agent([0.5, 0.5]);
        assert_eq!(agent.symptoms(), &["noise", "strong", "twin"]);
    }

    #[test]
    fn current_posterior_is_empty_without_evidence() {
        let agent = agent([0.5, 0.5]);
        assert!(agent.current_posterior(&Evidence::new()).is_none());
        let evidence = Evidence::new().with("noise", true);
        let first = agent.current_posterior(&evidence).expect("posterior");
        let second = agent.current_posterior(&evidence).expect("posterior");
        assert_eq!(first, second);
    }

    #[test]
    fn current_posterior_swallows_unknown_symptoms() {
        let agent = agent([0.5, 0.5]);
        assert!(agent
            .current_posterior(&Evidence::new().with("rash", true))
            .is_none());
    }

    #[test]
    fn informative_symptom_wins_and_ties_go_to_name() {
        let agent = agent([0.5, 0.5]);
        let ranked = agent.rank_questions(&Evidence::new());
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].symptom, "strong");
        assert_eq!(ranked[1].symptom, "twin");
        assert_eq!(ranked[2].symptom, "noise");
        assert!(ranked[2].information_gain < 1e-9);
        assert!((ranked[0].p_present - 0.45).abs() < 1e-12);
        assert_eq!(agent.next_best_question(&Evidence::new()).as_deref(), Some("strong"));
    }

    #[test]
    fn never_asks_an_answered_symptom() {
        let agent = agent([0.5, 0.5]);
        let evidence = Evidence::new().with("strong", false);
        assert_eq!(agent.next_best_question(&evidence).as_deref(), Some("twin"));
        let evidence = evidence.with("twin", false).with("noise", true);
        assert_eq!(agent.next_best_question(&evidence), None);
    }

    #[test]
    fn stops_when_confident() {
        let agent = agent([0.97, 0.03]);
        assert_eq!(agent.next_best_question(&Evidence::new()), None);
    }

    #[test]
    fn entropy_in_bits() {
        let agent = agent([0.5, 0.5]);
        let prior = agent.posterior(&Evidence::new()).expect("prior");
        assert!((TriageAgent::entropy(&prior) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn session_rerecording_moves_answer_to_end() {
        let mut session = TriageSession::new();
        session.record("a", true);
        session.record("b", false);
        session.record("a", false);
        assert_eq!(
            session.history(),
            &[("b".to_string(), false), ("a".to_string(), false)]
        );
        assert_eq!(session.evidence().get("a"), Some(0));
        assert!(session.is_answered("b"));
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn rejects_bad_threshold() {
        let err = TriageConfig {
            confidence_threshold: 1.5,
        }
        .validate()
        .expect_err("invalid");
        assert!(matches!(err, TriageError::Validation(_)));
    }
}
