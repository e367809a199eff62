//! Learning pipeline on synthetic records.

use triage_core::engine::estimator::fit_parameters;
use triage_core::{
    learn_model, BicScore, Dataset, EstimatorKind, HillClimbConfig, HillClimbSearch, LearnConfig,
    MaximumLikelihood, ScoreKind, TriageError,
};
use triage_tests::{synthetic_csv, SYMPTOMS};

fn records(rows: usize) -> Dataset {
    Dataset::from_reader(synthetic_csv(rows, 5).as_bytes(), "TYPE").expect("load")
}

#[test]
fn every_column_becomes_a_variable() {
    let data = records(400);
    let model = learn_model(&data, &LearnConfig::default()).expect("learn");
    let names: Vec<&str> = model
        .network()
        .variables()
        .iter()
        .map(|v| v.name())
        .collect();
    let mut expected: Vec<&str> = SYMPTOMS.to_vec();
    expected.push("TYPE");
    assert_eq!(names, expected);
    assert_eq!(model.symptoms().len(), SYMPTOMS.len());
    assert!(model.network().dag().edge_count() > 0);
}

#[test]
fn independent_columns_stay_isolated_but_present() {
    let mut csv = String::from("a,b,TYPE\n");
    for i in 0..64 {
        csv.push_str(&format!("{},{},{}\n", i % 2, (i / 2) % 2, ["X", "Y"][(i / 4) % 2]));
    }
    let data = Dataset::from_reader(csv.as_bytes(), "TYPE").expect("load");
    let model = learn_model(&data, &LearnConfig::default()).expect("learn");
    assert_eq!(model.network().variables().len(), 3);
    assert_eq!(model.network().dag().edge_count(), 0);
    let prior = model.query(&Default::default()).expect("prior");
    assert!((prior.probabilities()[0] - 0.5).abs() < 1e-12);
}

#[test]
fn learned_tables_are_normalized_for_every_configuration() {
    let data = records(300);
    for estimator in [EstimatorKind::Bayesian, EstimatorKind::MaximumLikelihood] {
        for score in [ScoreKind::Bic, ScoreKind::Aic, ScoreKind::Bdeu] {
            let config = LearnConfig {
                score,
                estimator,
                ..LearnConfig::default()
            };
            let model = learn_model(&data, &config).expect("learn");
            for cpt in model.network().cpts() {
                assert_eq!(cpt.values().len(), cpt.num_configurations() * cpt.cardinality());
                for row in cpt.rows() {
                    assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                    assert!(row.iter().all(|&p| p > 0.0 && p < 1.0));
                }
            }
        }
    }
}

#[test]
fn search_is_reproducible() {
    let data = records(300);
    let first = learn_model(&data, &LearnConfig::default()).expect("first");
    let second = learn_model(&data, &LearnConfig::default()).expect("second");
    assert_eq!(first.network().edges(), second.network().edges());
    assert_eq!(first.network().cpts(), second.network().cpts());
}

#[test]
fn indegree_cap_is_respected() {
    let data = records(400);
    let config = LearnConfig {
        max_indegree: Some(1),
        ..LearnConfig::default()
    };
    let model = learn_model(&data, &config).expect("learn");
    let dag = model.network().dag();
    assert!((0..dag.num_nodes()).all(|v| dag.in_degree(v) <= 1));
}

#[test]
fn observer_sees_an_acyclic_graph_after_every_edit() {
    let data = records(300);
    let search = HillClimbSearch::new(&data, &BicScore, HillClimbConfig::default()).expect("search");
    let mut checked = 0;
    let (dag, diagnostics) = search
        .estimate_with_observer(|dag, _| {
            assert!(dag.is_acyclic());
            checked += 1;
        })
        .expect("estimate");
    assert_eq!(checked, diagnostics.edits.len());
    assert!(dag.is_acyclic());
    assert!(diagnostics.final_score >= diagnostics.initial_score);

    let cpts = fit_parameters(&data, &dag, &MaximumLikelihood).expect("fit");
    assert_eq!(cpts.len(), data.num_variables());
}

#[test]
fn invalid_configuration_aborts_learning() {
    let data = records(50);
    let config = LearnConfig {
        max_iterations: 0,
        ..LearnConfig::default()
    };
    let err = learn_model(&data, &config).expect_err("invalid");
    assert!(matches!(err, TriageError::Validation(_)));
}
