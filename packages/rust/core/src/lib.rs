//! Core pipeline orchestration and domain logic for bookcorpus.
//!
//! This crate ties together manifest resolution, boilerplate filtering, text
//! normalization, and record assembly into the end-to-end workflows
//! ([`pipeline::extract_package`], [`pipeline::run_catalog`]).

pub mod assembler;
pub mod filter;
pub mod pipeline;
pub mod progress;
