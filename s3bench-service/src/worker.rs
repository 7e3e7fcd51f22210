//! Concurrent workers performing the operation of a round.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::backend::{BackendError, BackendResult, SharedBackend};
use crate::datamodel::{Action, Job, Measurement};
use crate::error::{Error, Result};
use crate::key::content_key;

/// Number of failed operations a single worker tolerates.
///
/// The next failure after this aborts the round. Failures are counted per worker over the whole
/// round and are never reset by successful operations.
pub const MAX_WORKER_FAILURES: u64 = 10;

/// What a single worker did before the job queue ran dry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkerSummary {
    /// Operations that completed and were reported.
    pub completed: u64,
    /// Operations that failed and were skipped.
    pub failures: u64,
}

/// A fixed number of workers sharing one job queue.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    action: Action,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(action: Action, concurrency: usize) -> Self {
        Self {
            action,
            concurrency,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts all workers.
    ///
    /// Workers pull from `jobs` until it is closed and drained, and report every successful
    /// operation to `results`. A worker returns an error once it exceeds
    /// [`MAX_WORKER_FAILURES`]. The other workers keep running until the caller aborts the set.
    pub fn spawn(
        &self,
        backend: SharedBackend,
        jobs: flume::Receiver<Job>,
        results: mpsc::Sender<Measurement>,
    ) -> JoinSet<Result<WorkerSummary>> {
        let mut set = JoinSet::new();
        for id in 0..self.concurrency {
            let worker = Worker {
                id,
                action: self.action,
                backend: backend.clone(),
                summary: WorkerSummary::default(),
            };
            set.spawn(worker.run(jobs.clone(), results.clone()));
        }
        set
    }
}

struct Worker {
    id: usize,
    action: Action,
    backend: SharedBackend,
    summary: WorkerSummary,
}

impl Worker {
    async fn run(
        mut self,
        jobs: flume::Receiver<Job>,
        results: mpsc::Sender<Measurement>,
    ) -> Result<WorkerSummary> {
        while let Ok(job) = jobs.recv_async().await {
            let (key, outcome) = self.perform(job).await?;
            match outcome {
                Ok(measurement) => {
                    self.summary.completed += 1;
                    if results.send(measurement).await.is_err() {
                        tracing::debug!(worker = self.id, "result queue closed, stopping");
                        break;
                    }
                }
                Err(err) => self.record_failure(&key, err)?,
            }
        }

        tracing::debug!(
            worker = self.id,
            completed = self.summary.completed,
            failures = self.summary.failures,
            "worker finished"
        );
        Ok(self.summary)
    }

    /// Performs a single job and returns the key it operated on.
    ///
    /// The outer result is fatal for the round, the inner one is a failed operation.
    async fn perform(&self, job: Job) -> Result<(String, BackendResult<Measurement>)> {
        let outcome = match (self.action, job) {
            (Action::Upload, Job::Payload(payload)) => {
                let key = content_key(&payload);
                let outcome = self.upload(&key, payload).await;
                (key, outcome)
            }
            (Action::Download, Job::Key(key)) => {
                let outcome = self.download(&key).await;
                (key, outcome)
            }
            (Action::Clean, Job::Key(key)) => {
                let outcome = self.delete(&key).await;
                (key, outcome)
            }
            (action, job) => {
                return Err(Error::UnexpectedJob {
                    action,
                    job: job.kind(),
                });
            }
        };
        Ok(outcome)
    }

    fn record_failure(&mut self, key: &str, err: BackendError) -> Result<()> {
        self.summary.failures += 1;
        tracing::warn!(
            worker = self.id,
            action = %self.action,
            key,
            failures = self.summary.failures,
            error = &err as &dyn std::error::Error,
            "operation failed"
        );

        if self.summary.failures > MAX_WORKER_FAILURES {
            return Err(Error::TooManyFailures {
                action: self.action,
                failures: self.summary.failures,
                source: err,
            });
        }
        Ok(())
    }

    async fn upload(&self, key: &str, payload: Bytes) -> BackendResult<Measurement> {
        let size = payload.len() as u64;

        let start = Instant::now();
        self.backend.put_object(key, payload).await?;
        Ok(Measurement {
            latency: start.elapsed(),
            size,
        })
    }

    async fn download(&self, key: &str) -> BackendResult<Measurement> {
        let start = Instant::now();
        let body = self.backend.get_object(key).await?;
        Ok(Measurement {
            latency: start.elapsed(),
            size: body.len() as u64,
        })
    }

    async fn delete(&self, key: &str) -> BackendResult<Measurement> {
        let start = Instant::now();
        self.backend.delete_object(key).await?;
        Ok(Measurement {
            latency: start.elapsed(),
            size: 0,
        })
    }
}
