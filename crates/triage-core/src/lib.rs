//! # Triage Core
//!
//! Bayesian-network diagnosis: learn a network from a table of binary
//! symptoms and a diagnosis column, query it exactly, and pick the most
//! informative next question.
//!
//! ```no_run
//! use triage_core::{learn_model, Dataset, Evidence, LearnConfig};
//!
//! let data = Dataset::from_csv_path("records.csv", "TYPE")?;
//! let model = learn_model(&data, &LearnConfig::default())?;
//! let evidence = Evidence::new().with("fever", true);
//! let posterior = model.query(&evidence)?;
//! let next = model.next_best_question(&evidence);
//! # let _ = (posterior, next);
//! # Ok::<(), triage_core::TriageError>(())
//! ```

pub mod engine;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use engine::dag::Dag;
pub use engine::errors::TriageError;
pub use engine::estimator::{
    BayesianEstimator, EstimatorKind, MaximumLikelihood, ParameterEstimator,
};
pub use engine::evidence::{shannon_entropy, Evidence, Posterior};
pub use engine::inference::{EliminationOrder, JointPosterior, VariableElimination};
pub use engine::learn::{learn_model, DiagnosticModel, LearnConfig};
pub use engine::model::{BayesNet, Cpt, GraphExport, Variable};
pub use engine::scoring::{AicScore, BdeuScore, BicScore, ScoreKind, StructureScore};
pub use engine::structure::{HillClimbConfig, HillClimbDiagnostics, HillClimbSearch};
pub use engine::triage::{QuestionScore, TriageAgent, TriageConfig, TriageSession};
pub use metrics::{evaluate, stratified_split, undersample, EvaluationReport};
pub use storage::Dataset;
