//! Dataset ingestion.
//!
//! Records are read once at startup and held in memory as encoded columns.
//! Nothing learned from them is persisted; every run relearns from the raw table.

pub mod dataset;

pub use dataset::{Dataset, SYMPTOM_STATES};
