//! The `s3bench` command.
//!
//! This wires the benchmark engine of [`s3bench_service`] to configuration, logging and report
//! rendering. The sweep itself lives in [`bench`].

pub mod bench;
pub mod cli;
pub mod config;
pub mod observability;
pub mod report;
