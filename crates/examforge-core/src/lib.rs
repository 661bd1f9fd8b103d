//! examforge-core — Blueprint validation, corpus indexing, and test-series assembly.
//!
//! This crate defines the question/group data model, the corpus index, the
//! selectors that draw items and atomic groups for one test instance, and the
//! orchestrator that generates a series of instances under an overlap budget.

pub mod assembler;
pub mod audit;
pub mod blueprint;
pub mod config;
pub mod corpus;
pub mod error;
pub mod ledger;
pub mod model;
pub mod plan;
pub mod presets;
pub mod selector;
pub mod series;
pub mod statistics;
pub mod summary;
pub mod validator;
