//! In-memory backend for tests and dry runs.
//!
//! This provides a [`Backend`] backed by a `BTreeMap`, removing the need for a running object store
//! in tests. The backend is [`Clone`] so tests can hold a handle for direct inspection while the
//! engine owns a shared copy. It can inject failures and artificial latency per operation.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use crate::backend::common::{Backend, BackendError, BackendResult, KeyStream};

/// The operations of a [`Backend`] that can be instrumented.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// [`Backend::put_object`].
    Put,
    /// [`Backend::get_object`].
    Get,
    /// [`Backend::delete_object`].
    Delete,
}

#[derive(Debug, Default)]
struct Counters {
    put: AtomicU64,
    get: AtomicU64,
    delete: AtomicU64,
}

impl Counters {
    fn get(&self, operation: Operation) -> &AtomicU64 {
        match operation {
            Operation::Put => &self.put,
            Operation::Get => &self.get,
            Operation::Delete => &self.delete,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    store: Mutex<BTreeMap<String, Bytes>>,
    attempts: Counters,
    pending_failures: Counters,
    latency: Mutex<Duration>,
}

/// A [`Backend`] holding all objects in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by the given duration before it completes.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock().unwrap() = latency;
        self
    }

    /// Makes the next `count` calls of `operation` fail.
    ///
    /// Pass `u64::MAX` to fail all calls.
    pub fn fail_next(&self, operation: Operation, count: u64) {
        self.inner
            .pending_failures
            .get(operation)
            .store(count, Ordering::SeqCst);
    }

    /// Returns how often `operation` was called, including failed calls.
    pub fn attempts(&self, operation: Operation) -> u64 {
        self.inner.attempts.get(operation).load(Ordering::SeqCst)
    }

    /// Inserts an object directly, bypassing instrumentation.
    pub fn insert(&self, key: impl Into<String>, payload: impl Into<Bytes>) {
        self.inner
            .store
            .lock()
            .unwrap()
            .insert(key.into(), payload.into());
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.inner.store.lock().unwrap().get(key).cloned()
    }

    /// Returns all stored keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.store.lock().unwrap().keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.store.lock().unwrap().len()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, operation: Operation) -> BackendResult<()> {
        self.inner.attempts.get(operation).fetch_add(1, Ordering::SeqCst);

        let latency = *self.inner.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let pending = self.inner.pending_failures.get(operation);
        let injected = pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u64::MAX => Some(u64::MAX),
                left => Some(left - 1),
            })
            .is_ok();

        if injected {
            let cause = io::Error::new(io::ErrorKind::ConnectionReset, "injected failure");
            return Err(BackendError::generic(format!("{operation:?} failed"), cause));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        self.enter(Operation::Put).await?;
        self.insert(key, payload);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        self.enter(Operation::Get).await?;
        self.get_stored(key)
            .ok_or_else(|| BackendError::NotFound(key.to_owned()))
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.enter(Operation::Delete).await?;
        match self.inner.store.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(key.to_owned())),
        }
    }

    fn list_objects(&self, prefix: &str) -> KeyStream {
        let keys: Vec<_> = self
            .inner
            .store
            .lock()
            .unwrap()
            .range(prefix.to_owned()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .map(Ok)
            .collect();

        futures_util::stream::iter(keys).boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn injects_a_limited_number_of_failures() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Put, 2);

        assert!(backend.put_object("a", Bytes::new()).await.is_err());
        assert!(backend.put_object("a", Bytes::new()).await.is_err());
        assert!(backend.put_object("a", Bytes::new()).await.is_ok());

        assert_eq!(backend.attempts(Operation::Put), 3);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn lists_only_matching_prefix() {
        let backend = InMemoryBackend::new();
        backend.insert("a/1", "x");
        backend.insert("s3bench/1", "x");
        backend.insert("s3bench/2", "x");
        backend.insert("t/1", "x");

        let keys: Vec<String> = backend.list_objects("s3bench/").try_collect().await.unwrap();
        assert_eq!(keys, ["s3bench/1", "s3bench/2"]);
    }
}
