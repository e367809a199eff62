//! Question selection and caller-owned sessions.

use std::sync::Arc;

use triage_core::{
    DiagnosticModel, Evidence, TriageAgent, TriageConfig, TriageSession, VariableElimination,
};
use triage_tests::{flu_network, naive_network};

fn agent(symptoms: usize) -> TriageAgent {
    let engine = VariableElimination::new(Arc::new(naive_network(symptoms)));
    TriageAgent::new(engine, "flu", TriageConfig::default()).expect("agent")
}

#[test]
fn all_negative_answers_still_yield_a_question() {
    let agent = agent(6);
    let mut evidence = Evidence::new();
    for s in 0..5 {
        evidence.observe(format!("s{}", s), false);
    }
    let posterior = agent.current_posterior(&evidence).expect("posterior");
    let (_, top) = posterior.top().expect("top");
    assert!(top < 0.95);
    assert_eq!(agent.next_best_question(&evidence).as_deref(), Some("s5"));
}

#[test]
fn confident_diagnosis_ends_questioning() {
    let agent = agent(10);
    let mut evidence = Evidence::new();
    for s in 0..8 {
        evidence.observe(format!("s{}", s), false);
    }
    let posterior = agent.current_posterior(&evidence).expect("posterior");
    assert!(agent.is_confident(&posterior));
    assert_eq!(agent.next_best_question(&evidence), None);
}

#[test]
fn session_drives_agent_until_symptoms_run_out() {
    // four negative answers never push the top diagnosis past 0.95
    let agent = agent(4);
    let mut session = TriageSession::new();
    while let Some(question) = agent.next_best_question(session.evidence()) {
        assert!(!session.is_answered(&question));
        session.record(question, false);
        assert!(session.len() <= 4);
    }
    assert_eq!(session.len(), 4);
    assert!(session.history().iter().all(|(_, present)| !present));
}

#[test]
fn parent_symptoms_are_ranked_by_information_gain() {
    let model = DiagnosticModel::from_network(flu_network(), "flu").expect("model");
    let agent = model.triage_agent(TriageConfig::default()).expect("agent");
    let ranked = agent.rank_questions(&Evidence::new());
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].information_gain >= ranked[1].information_gain);
    assert!(ranked.iter().all(|q| q.information_gain >= 0.0));
    // fever moves P(flu) further than cough does
    assert_eq!(ranked[0].symptom, "fever");
    assert!((ranked[0].p_present - 0.25).abs() < 1e-12);
}

#[test]
fn entropy_matches_closed_forms() {
    let agent = agent(2);
    let prior = agent.posterior(&Evidence::new()).expect("prior");
    let expected = -(0.25f64 * 0.25f64.log2() + 0.75 * 0.75f64.log2());
    assert!((TriageAgent::entropy(&prior) - expected).abs() < 1e-12);
}
