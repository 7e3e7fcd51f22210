use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::key::HEALTH_CHECK_KEY;

/// A type-erased [`Backend`] instance, shared by all workers of a round.
pub type SharedBackend = Arc<dyn Backend>;

/// A stream of object keys, as returned by [`Backend::list_objects`].
///
/// Dropping the stream stops the listing. No further pages are requested after that.
pub type KeyStream = BoxStream<'static, BackendResult<String>>;

/// The object storage under test.
///
/// Implementations must be safe for concurrent use. The engine shares a single instance across all
/// workers of a round and never serializes access to it.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Performs one-time initialization, such as creating the bucket.
    async fn setup(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Verifies that objects can be written and deleted.
    ///
    /// The default implementation writes a small object to [`HEALTH_CHECK_KEY`] and deletes it
    /// again.
    async fn health_check(&self) -> BackendResult<()> {
        self.put_object(HEALTH_CHECK_KEY, Bytes::from_static(b"test"))
            .await?;
        self.delete_object(HEALTH_CHECK_KEY).await
    }

    /// Stores or overwrites the object at the given key.
    async fn put_object(&self, key: &str, payload: Bytes) -> BackendResult<()>;

    /// Retrieves the full contents of the object at the given key.
    ///
    /// The body is read to completion before this returns.
    async fn get_object(&self, key: &str) -> BackendResult<Bytes>;

    /// Deletes the object at the given key.
    async fn delete_object(&self, key: &str) -> BackendResult<()>;

    /// Lists all keys starting with `prefix`.
    fn list_objects(&self, prefix: &str) -> KeyStream;
}

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the S3 client, covering both transport failures and error responses.
    #[error("s3 error: {context}")]
    S3 {
        context: String,
        #[source]
        cause: s3::error::S3Error,
    },

    /// The backend answered with an unexpected status code.
    #[error("{context}: unexpected status {status}")]
    Status { context: String, status: u16 },

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Any other error stemming from one of the storage backends, which might be specific to that
    /// backend or to a certain operation.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    pub(crate) fn s3(context: impl Into<String>, cause: s3::error::S3Error) -> Self {
        Self::S3 {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn generic<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Generic {
            context: context.into(),
            cause: cause.into(),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
