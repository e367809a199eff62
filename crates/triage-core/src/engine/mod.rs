//! The diagnosis engine.
//!
//! This module provides:
//! - **dag**: directed acyclic graph with cycle checks
//! - **scoring** / **structure**: score strategies and hill-climbing structure search
//! - **estimator**: CPT estimation strategies
//! - **model**: variables, CPTs and the immutable network
//! - **factor** / **inference**: factor algebra and variable elimination
//! - **triage**: information-gain question selection
//! - **learn**: the learning pipeline and the queryable model

pub mod counts;
pub mod dag;
pub mod errors;
pub mod estimator;
pub mod evidence;
pub mod factor;
pub mod inference;
pub mod learn;
pub mod model;
pub mod scoring;
pub mod structure;
pub mod triage;
