//! Shared fixtures for the integration and property tests.

use triage_core::{BayesNet, Cpt, Dag, Variable};

/// Diagnoses of the synthetic record generator.
pub const DIAGNOSES: [&str; 4] = ["ALLERGY", "COLD", "COVID", "FLU"];

/// Symptom columns of the synthetic record generator.
pub const SYMPTOMS: [&str; 6] = [
    "cough",
    "fatigue",
    "fever",
    "itchy_eyes",
    "loss_of_taste",
    "sneezing",
];

/// `P(symptom = 1 | diagnosis)`, rows follow [`DIAGNOSES`], columns [`SYMPTOMS`].
const PROFILES: [[f64; 6]; 4] = [
    [0.30, 0.20, 0.05, 0.85, 0.05, 0.90],
    [0.70, 0.40, 0.20, 0.10, 0.10, 0.70],
    [0.70, 0.70, 0.70, 0.05, 0.80, 0.10],
    [0.80, 0.90, 0.90, 0.05, 0.10, 0.20],
];

/// Deterministic CSV text of `rows` records. Every fifth record cycle holds two
/// ALLERGY records, so ALLERGY is the majority class (40%).
pub fn synthetic_csv(rows: usize, seed: u64) -> String {
    let mut state = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 11) as f64) / ((u64::MAX >> 11) as f64)
    };

    let mut csv = SYMPTOMS.join(",");
    csv.push_str(",TYPE\n");
    for i in 0..rows {
        let class = [0, 0, 1, 2, 3][i % 5];
        for (s, &p) in PROFILES[class].iter().enumerate() {
            if s > 0 {
                csv.push(',');
            }
            csv.push(if next() < p { '1' } else { '0' });
        }
        csv.push(',');
        csv.push_str(DIAGNOSES[class]);
        csv.push('\n');
    }
    csv
}

/// `fever -> flu <- cough` with hand-picked tables.
///
/// - `P(fever = 1) = 0.25`, `P(cough = 1) = 0.5`
/// - `P(flu = 1 | fever, cough)`: `0.05, 0.2, 0.4, 0.9` for
///   `(0,0), (0,1), (1,0), (1,1)`
pub fn flu_network() -> BayesNet {
    let variables = vec![
        Variable::binary("fever"),
        Variable::binary("cough"),
        Variable::binary("flu"),
    ];
    let dag = Dag::from_edges(3, [(0, 2), (1, 2)]).expect("dag");
    let cpts = vec![
        Cpt::new(0, 2, &[], vec![0.75, 0.25]).expect("fever"),
        Cpt::new(1, 2, &[], vec![0.5, 0.5]).expect("cough"),
        Cpt::new(
            2,
            2,
            &[(0, 2), (1, 2)],
            vec![0.95, 0.05, 0.8, 0.2, 0.6, 0.4, 0.1, 0.9],
        )
        .expect("flu"),
    ];
    BayesNet::new(variables, dag, cpts).expect("network")
}

/// Diagnosis root `flu` with `symptoms` binary children. Every symptom has
/// `P(s = 1 | flu = 0) = 0.3` and `P(s = 1 | flu = 1) = 0.6`; `P(flu = 1) = 0.75`.
pub fn naive_network(symptoms: usize) -> BayesNet {
    let mut variables = vec![Variable::binary("flu")];
    variables.extend((0..symptoms).map(|s| Variable::binary(format!("s{}", s))));
    let dag = Dag::from_edges(symptoms + 1, (1..=symptoms).map(|s| (0, s))).expect("dag");
    let mut cpts = vec![Cpt::new(0, 2, &[], vec![0.25, 0.75]).expect("flu")];
    for s in 1..=symptoms {
        cpts.push(Cpt::new(s, 2, &[(0, 2)], vec![0.7, 0.3, 0.4, 0.6]).expect("symptom"));
    }
    BayesNet::new(variables, dag, cpts).expect("network")
}
