//! Core types and trait definitions for the specimen lifecycle engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the versioned transition tables, the authorization policy, the QC
//! evaluator and the series renderer as pure functions, plus the
//! [`store::LabStore`] trait that backends implement transactionally.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod artifact;
pub mod audit;
pub mod error;
pub mod policy;
pub mod qc;
pub mod role;
pub mod sample;
pub mod sequence;
pub mod status;
pub mod store;
pub mod workflow;

pub use error::{BlockReason, Error, Result};
pub use role::{Actor, Role};
