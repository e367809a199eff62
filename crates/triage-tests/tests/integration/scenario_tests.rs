//! Hand-computed posteriors on small fixed networks.

use std::sync::Arc;

use triage_core::{DiagnosticModel, EliminationOrder, Evidence, TriageError, VariableElimination};
use triage_tests::{flu_network, naive_network};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

#[test]
fn observed_parents_give_cpt_row() {
    let model = DiagnosticModel::from_network(flu_network(), "flu").expect("model");
    let evidence = Evidence::new().with("fever", true).with("cough", true);
    let posterior = model.query(&evidence).expect("query");
    assert_eq!(posterior.states(), &["0", "1"]);
    assert!(close(posterior.probability("1").expect("flu"), 0.9));
}

#[test]
fn one_observed_parent_marginalizes_the_other() {
    let engine = VariableElimination::new(Arc::new(flu_network()));
    let posterior = engine
        .query("flu", &Evidence::new().with("fever", true))
        .expect("query");
    // 0.5 * 0.4 + 0.5 * 0.9
    assert!(close(posterior.probabilities()[1], 0.65));
}

#[test]
fn bayes_rule_against_the_arrows() {
    let engine = VariableElimination::new(Arc::new(flu_network()));
    let flu = Evidence::new().with("flu", true);

    // joint P(fever, cough, flu = 1)
    let f0c0 = 0.75 * 0.5 * 0.05;
    let f0c1 = 0.75 * 0.5 * 0.2;
    let f1c0 = 0.25 * 0.5 * 0.4;
    let f1c1 = 0.25 * 0.5 * 0.9;
    let p_flu = f0c0 + f0c1 + f1c0 + f1c1;

    let fever = engine.query("fever", &flu).expect("fever");
    assert!(close(fever.probabilities()[1], (f1c0 + f1c1) / p_flu));

    // explaining away: fever lowers the cough posterior once flu is known
    let cough = engine.query("cough", &flu).expect("cough");
    let cough_given_fever = engine
        .query("cough", &flu.clone().with("fever", true))
        .expect("cough | fever");
    assert!(close(cough.probabilities()[1], (f0c1 + f1c1) / p_flu));
    assert!(close(cough_given_fever.probabilities()[1], f1c1 / (f1c0 + f1c1)));
    assert!(cough_given_fever.probabilities()[1] < cough.probabilities()[1]);
}

#[test]
fn empty_evidence_returns_root_prior_exactly() {
    let model = DiagnosticModel::from_network(naive_network(3), "flu").expect("model");
    let prior = model.query(&Evidence::new()).expect("prior");
    assert_eq!(prior.probabilities(), &[0.25, 0.75]);
    assert_eq!(
        prior.probabilities(),
        model.network().cpt_by_name("flu").expect("cpt").values()
    );
}

#[test]
fn elimination_orders_agree() {
    let engine = VariableElimination::new(Arc::new(naive_network(4)));
    let evidence = Evidence::new().with("s0", true).with("s3", false);
    let orders = [
        EliminationOrder::MinWeight,
        EliminationOrder::Explicit(vec!["flu".into(), "s1".into(), "s2".into()]),
        EliminationOrder::Explicit(vec!["s2".into(), "s1".into(), "flu".into()]),
    ];
    let reference = engine.query("s1", &evidence).expect("reference");
    for order in &orders {
        let posterior = engine
            .query_with_order("s1", &evidence, order)
            .expect("query");
        for (a, b) in posterior.probabilities().iter().zip(reference.probabilities()) {
            assert!((a - b).abs() < 1e-12, "{:?}", order);
        }
    }
}

#[test]
fn queries_are_idempotent_and_do_not_mutate_the_model() {
    let model = DiagnosticModel::from_network(flu_network(), "flu").expect("model");
    let before = model.network().cpts().to_vec();
    let evidence = Evidence::new().with("cough", false);
    let first = model.query(&evidence).expect("first");
    let second = model.query(&evidence).expect("second");
    assert_eq!(first, second);
    assert_eq!(model.network().cpts(), before.as_slice());
}

#[test]
fn unknown_variables_are_inference_errors() {
    let model = DiagnosticModel::from_network(flu_network(), "flu").expect("model");
    let err = model
        .query(&Evidence::new().with("rash", true))
        .expect_err("unknown");
    assert!(matches!(err, TriageError::Inference(_)));
    let err = model
        .query_variable("rash", &Evidence::new())
        .expect_err("unknown");
    assert!(matches!(err, TriageError::Inference(_)));
    assert!(DiagnosticModel::from_network(flu_network(), "rash").is_err());
}

#[test]
fn concurrent_queries_share_one_model() {
    let engine = VariableElimination::new(Arc::new(naive_network(5)));
    let expected = engine
        .query("flu", &Evidence::new().with("s0", true))
        .expect("expected");
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            let expected = &expected;
            scope.spawn(move || {
                let posterior = engine
                    .query("flu", &Evidence::new().with("s0", true))
                    .expect("query");
                assert_eq!(&posterior, expected);
            });
        }
    });
}
