//! Property tests for learning, inference and triage invariants

use std::sync::Arc;

use proptest::prelude::*;
use triage_core::engine::estimator::fit_parameters;
use triage_core::{
    shannon_entropy, BayesNet, BayesianEstimator, BicScore, Cpt, Dag, Dataset, EliminationOrder,
    Evidence, HillClimbConfig, HillClimbSearch, MaximumLikelihood, TriageAgent, TriageConfig,
    Variable, VariableElimination,
};
use triage_tests::naive_network;

/// Random records over three binary symptoms and a diagnosis with up to three labels.
fn records() -> impl Strategy<Value = Dataset> {
    prop::collection::vec((any::<[bool; 3]>(), 0usize..3), 4..60).prop_map(|rows| {
        let headers = ["a", "b", "c", "TYPE"].map(String::from).to_vec();
        let rows = rows
            .into_iter()
            .map(|(symptoms, label)| {
                let mut row: Vec<String> = symptoms
                    .iter()
                    .map(|&s| u8::from(s).to_string())
                    .collect();
                row.push(["cold", "flu", "strep"][label].to_string());
                row
            })
            .collect();
        Dataset::from_rows(headers, rows, "TYPE").expect("records")
    })
}

fn probability() -> impl Strategy<Value = f64> {
    0.02f64..0.98
}

/// Diamond `a -> b, a -> c, b -> d, c -> d` with random tables.
fn diamond(p: &[f64]) -> BayesNet {
    let variables = ["a", "b", "c", "d"].map(Variable::binary).to_vec();
    let dag = Dag::from_edges(4, [(0, 1), (0, 2), (1, 3), (2, 3)]).expect("dag");
    let row = |q: f64| [1.0 - q, q];
    let cpts = vec![
        Cpt::new(0, 2, &[], row(p[0]).to_vec()).expect("a"),
        Cpt::new(1, 2, &[(0, 2)], [row(p[1]), row(p[2])].concat()).expect("b"),
        Cpt::new(2, 2, &[(0, 2)], [row(p[3]), row(p[4])].concat()).expect("c"),
        Cpt::new(
            3,
            2,
            &[(1, 2), (2, 2)],
            [row(p[5]), row(p[6]), row(p[7]), row(p[8])].concat(),
        )
        .expect("d"),
    ];
    BayesNet::new(variables, dag, cpts).expect("network")
}

proptest! {
    #[test]
    fn fitted_tables_sum_to_one(data in records(), ess in 0.5f64..20.0) {
        let search = HillClimbSearch::new(&data, &BicScore, HillClimbConfig::default()).expect("search");
        let (dag, _) = search.estimate().expect("estimate");
        let bayes = fit_parameters(&data, &dag, &BayesianEstimator { equivalent_sample_size: ess }).expect("bayes");
        let mle = fit_parameters(&data, &dag, &MaximumLikelihood).expect("mle");
        for cpt in bayes.iter().chain(&mle) {
            for row in cpt.rows() {
                prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                prop_assert!(row.iter().all(|&p| p > 0.0));
            }
        }
    }

    #[test]
    fn every_accepted_edit_keeps_the_graph_acyclic(data in records(), cap in prop::option::of(1usize..3)) {
        let config = HillClimbConfig { max_indegree: cap, ..HillClimbConfig::default() };
        let search = HillClimbSearch::new(&data, &BicScore, config).expect("search");
        let mut acyclic = true;
        let (dag, diagnostics) = search
            .estimate_with_observer(|dag, _| acyclic &= dag.topological_order().is_some())
            .expect("estimate");
        prop_assert!(acyclic);
        prop_assert!(dag.is_acyclic());
        prop_assert!(diagnostics.final_score + 1e-9 >= diagnostics.initial_score);
        if let Some(cap) = cap {
            prop_assert!((0..dag.num_nodes()).all(|v| dag.in_degree(v) <= cap));
        }
    }

    #[test]
    fn elimination_order_does_not_change_posteriors(
        p in prop::collection::vec(probability(), 9),
        d in any::<bool>(),
        observe_c in any::<bool>(),
    ) {
        let engine = VariableElimination::new(Arc::new(diamond(&p)));
        let mut evidence = Evidence::new().with("d", d);
        if observe_c {
            evidence.observe("c", true);
        }
        let orders = [
            EliminationOrder::MinWeight,
            EliminationOrder::Explicit(vec!["b".into(), "c".into(), "d".into()]),
            EliminationOrder::Explicit(vec!["c".into(), "b".into()]),
        ];
        let reference = engine.query("a", &evidence).expect("reference");
        for order in &orders {
            let posterior = engine.query_with_order("a", &evidence, order).expect("query");
            for (x, y) in posterior.probabilities().iter().zip(reference.probabilities()) {
                prop_assert!((x - y).abs() < 1e-9);
            }
        }
        let sum: f64 = reference.probabilities().iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn entropy_is_bounded(weights in prop::collection::vec(0f64..1.0, 1..8)) {
        let total: f64 = weights.iter().sum();
        prop_assume!(total > 1e-6);
        let p: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let h = shannon_entropy(&p);
        prop_assert!(h >= 0.0);
        prop_assert!(h <= (p.len() as f64).log2() + 1e-9);
    }

    #[test]
    fn uniform_and_degenerate_entropy(k in 1usize..16) {
        let uniform = vec![1.0 / k as f64; k];
        prop_assert!((shannon_entropy(&uniform) - (k as f64).log2()).abs() < 1e-9);
        let mut degenerate = vec![0.0; k];
        degenerate[0] = 1.0;
        prop_assert_eq!(shannon_entropy(&degenerate), 0.0);
    }

    #[test]
    fn next_question_is_never_already_answered(answers in prop::collection::vec(prop::option::of(any::<bool>()), 5)) {
        let engine = VariableElimination::new(Arc::new(naive_network(5)));
        let agent = TriageAgent::new(engine, "flu", TriageConfig::default()).expect("agent");
        let mut evidence = Evidence::new();
        for (s, answer) in answers.iter().enumerate() {
            if let Some(present) = answer {
                evidence.observe(format!("s{}", s), *present);
            }
        }
        if let Some(question) = agent.next_best_question(&evidence) {
            prop_assert!(!evidence.contains(&question));
        }
        let first = agent.current_posterior(&evidence);
        let second = agent.current_posterior(&evidence);
        prop_assert_eq!(first, second);
    }
}
