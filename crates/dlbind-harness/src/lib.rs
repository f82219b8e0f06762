//! Probe tooling for dlbind.
//!
//! This crate provides:
//! - Probe runs: open a library, resolve symbols, close, report
//! - Structured JSONL logging with a validated schema
//! - Constants inventory for the running platform
//! - stderr diagnostics via tracing-subscriber

#![forbid(unsafe_code)]

pub mod constants;
pub mod error;
pub mod logging;
pub mod probe;
pub mod structured_log;

pub use error::HarnessError;
pub use probe::{ProbeOutcome, ProbePlan, ProbeReport, run_probe};
