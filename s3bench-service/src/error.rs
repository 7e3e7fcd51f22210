use thiserror::Error;

use crate::backend::BackendError;
use crate::datamodel::Action;
use crate::source::SourceError;

/// Errors that abort a benchmark round.
///
/// Individual failed operations are not errors at this level. They are counted by the worker that
/// performed them and only escalate once a worker exceeds its failure budget.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the storage backend outside of a job, e.g. while listing keys.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The payload source could not be opened or read.
    #[error("payload source error: {0}")]
    Source(#[from] SourceError),

    /// A worker exceeded its failure budget.
    #[error("{action}: too many failures ({failures}), last error: {source}")]
    TooManyFailures {
        action: Action,
        failures: u64,
        #[source]
        source: BackendError,
    },

    /// A worker received a job it cannot perform.
    #[error("{action} worker received a {job} job")]
    UnexpectedJob { action: Action, job: &'static str },

    /// An upload round was started without a payload source.
    #[error("no payload source configured for upload")]
    NoPayloadSource,

    /// The progress bar template is invalid.
    #[error("invalid progress template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    /// A task of the round panicked or was cancelled.
    #[error("benchmark task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for benchmark rounds.
pub type Result<T, E = Error> = std::result::Result<T, E>;
