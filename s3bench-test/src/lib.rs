//! Test utilities for s3bench.
//!
//! This crate provides fixtures shared by the tests of all s3bench crates. See the modules for all
//! available utilities.

pub mod repo;
pub mod tracing;
