//! The benchmark engine of `s3bench`.
//!
//! The engine measures an object store under concurrent load. A benchmark consists of rounds, each
//! performing one [`Action`] with a fixed number of workers:
//!
//! - [`JobFeeder`] produces jobs, either payloads from a [`PayloadSource`] or keys listed from the
//!   backend, into a bounded queue.
//! - [`WorkerPool`] starts the workers that perform the jobs against a [`Backend`] and time every
//!   operation.
//! - [`Stats`] aggregates the measurements into throughput and latency percentiles.
//! - [`BenchmarkRunner`] wires these together for one round and returns its [`RoundReport`].
//!
//! Storage backends live in the [`backend`] module. Every object written by the benchmark is stored
//! under a content-addressed key below [`KEY_PREFIX`].

#![warn(missing_debug_implementations)]

pub mod backend;
pub mod datamodel;
pub mod error;
pub mod feeder;
pub mod key;
pub mod runner;
pub mod source;
pub mod stats;
pub mod worker;

pub use backend::{
    Backend, BackendError, BackendResult, KeyStream, SharedBackend, StorageConfig, create_backend,
};
pub use datamodel::{Action, Job, Measurement};
pub use error::{Error, Result};
pub use feeder::{FeedSummary, JOB_QUEUE_CAPACITY, JobFeeder, OpenFeed};
pub use key::{HEALTH_CHECK_KEY, KEY_PREFIX, content_key};
pub use runner::{BenchmarkRunner, RESULT_QUEUE_CAPACITY, RoundConfig, RoundReport};
pub use source::{CommitLog, MemorySource, PayloadSource, SourceError, SourceResult};
pub use stats::{HEADER, LatencySummary, Stats};
pub use worker::{MAX_WORKER_FAILURES, WorkerPool, WorkerSummary};
