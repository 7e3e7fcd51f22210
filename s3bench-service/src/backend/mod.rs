//! Storage backends the benchmark can run against.

use std::path::Path;
use std::sync::Arc;

pub mod common;
pub mod in_memory;
pub mod local_fs;
pub mod s3_compatible;

pub use common::{Backend, BackendError, BackendResult, KeyStream, SharedBackend};
pub use in_memory::{InMemoryBackend, Operation};
pub use local_fs::LocalFs;
pub use s3_compatible::{S3Compatible, S3CompatibleConfig};

/// Configuration to initialize a [`Backend`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use a local filesystem as the storage backend.
    FileSystem {
        /// The path to the directory where files will be stored.
        path: &'a Path,
    },
    /// Use an S3-compatible storage backend.
    S3Compatible(S3CompatibleConfig),
    /// Keep all objects in memory for the lifetime of the process.
    Memory,
}

/// Creates the backend described by `config`.
///
/// No requests are issued here. Call [`Backend::setup`] and [`Backend::health_check`] before
/// running any rounds.
pub fn create_backend(config: StorageConfig<'_>) -> BackendResult<SharedBackend> {
    Ok(match config {
        StorageConfig::FileSystem { path } => Arc::new(LocalFs::new(path)),
        StorageConfig::S3Compatible(config) => Arc::new(S3Compatible::new(config)?),
        StorageConfig::Memory => Arc::new(InMemoryBackend::new()),
    })
}
