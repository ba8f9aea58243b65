//! examlens-core — answer-sheet analysis engine.
//!
//! This crate defines the data model, the oracle trait, the deterministic
//! segmentation and aggregation logic, and the bounded protocols that obtain
//! structured output from an unreliable text oracle.

pub mod aggregate;
pub mod analyzer;
pub mod chart;
pub mod error;
pub mod extraction;
pub mod grading;
pub mod mock;
pub mod model;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod settings;
pub mod traits;
pub mod verify;
