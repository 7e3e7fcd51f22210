//! Orchestration of a single benchmark round.
//!
//! A round wires one feeder, a pool of workers, and one result consumer together:
//!
//! ```text
//! feeder --(jobs, 64)--> workers --(measurements, 8)--> consumer --> Stats
//! ```
//!
//! Both queues are bounded, so a slow backend throttles the feeder and a slow consumer throttles
//! the workers. The round ends once every worker has returned, which happens when the feeder closed
//! the job queue and all queued jobs are done.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::backend::SharedBackend;
use crate::datamodel::{Action, Measurement};
use crate::error::{Error, Result};
use crate::feeder::{FeedSummary, JOB_QUEUE_CAPACITY, JobFeeder};
use crate::source::{PayloadSource, SourceResult};
use crate::stats::Stats;
use crate::worker::{WorkerPool, WorkerSummary};

/// Capacity of the result queue between the workers and the consumer.
pub const RESULT_QUEUE_CAPACITY: usize = 8;

/// Parameters of one round.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RoundConfig {
    /// The operation all workers perform.
    pub action: Action,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Maximum number of jobs, or `0` for no limit.
    pub max_jobs: u64,
}

impl RoundConfig {
    pub fn new(action: Action, concurrency: usize, max_jobs: u64) -> Self {
        Self {
            action,
            concurrency,
            max_jobs,
        }
    }

    /// A cleanup round that deletes every listed object.
    pub fn clean(concurrency: usize) -> Self {
        Self::new(Action::Clean, concurrency, 0)
    }

    /// The title of the round in reports, such as `PUT 16`.
    pub fn title(&self) -> String {
        format!("{} {}", self.action.verb(), self.concurrency)
    }
}

/// Everything a finished round produced.
#[derive(Debug)]
pub struct RoundReport {
    /// Aggregated measurements, refreshed.
    pub stats: Stats,
    /// What the feeder produced.
    pub feed: FeedSummary,
    /// One entry per worker.
    pub workers: Vec<WorkerSummary>,
}

impl RoundReport {
    /// Total number of failed operations across all workers.
    pub fn failures(&self) -> u64 {
        self.workers.iter().map(|w| w.failures).sum()
    }
}

type SourceFactory = Arc<dyn Fn() -> SourceResult<Box<dyn PayloadSource>> + Send + Sync>;

/// Runs benchmark rounds against a backend.
///
/// Rounds are strictly sequential. Each call to [`run`](Self::run) completes the round, or
/// aborts it on the first fatal error, before returning.
pub struct BenchmarkRunner {
    backend: SharedBackend,
    payloads: Option<SourceFactory>,
    progress: bool,
}

impl BenchmarkRunner {
    /// Creates a runner without a payload source and without a progress bar.
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            payloads: None,
            progress: false,
        }
    }

    /// Shows a progress bar on stderr while rounds run.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Sets where upload rounds take their payloads from.
    ///
    /// The factory is called once per upload round on a blocking thread, so every round replays
    /// the source from the start.
    pub fn with_payloads<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> SourceResult<Box<dyn PayloadSource>> + Send + Sync + 'static,
    {
        self.payloads = Some(Arc::new(factory));
        self
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Runs one round to completion.
    ///
    /// Returns an error if the feed cannot be opened, if the payload source fails before the
    /// first job, or if any worker exceeds its failure budget. In the latter case all remaining
    /// tasks of the round are aborted.
    pub async fn run(&self, round: RoundConfig) -> Result<RoundReport> {
        let title = round.title();
        tracing::info!(round = %title, max_jobs = round.max_jobs, "starting round");

        let feeder = match round.action {
            Action::Upload => {
                let factory = self.payloads.clone().ok_or(Error::NoPayloadSource)?;
                let source = tokio::task::spawn_blocking(move || factory()).await??;
                JobFeeder::Payloads {
                    source,
                    max_jobs: round.max_jobs,
                }
            }
            Action::Download | Action::Clean => {
                JobFeeder::listing(Arc::clone(&self.backend), round.max_jobs)
            }
        };
        let feed = feeder.open().await?;
        let bar = self.progress_bar(&title, feed.expected())?;

        let (jobs_tx, jobs_rx) = flume::bounded(JOB_QUEUE_CAPACITY);
        let (results_tx, results_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);

        let stats = Stats::new(title);
        let mut workers = WorkerPool::new(round.action, round.concurrency).spawn(
            Arc::clone(&self.backend),
            jobs_rx,
            results_tx,
        );
        let feeder = tokio::spawn(feed.run(jobs_tx));
        let consumer = tokio::spawn(consume(stats, results_rx, bar.clone()));

        let mut summaries = Vec::with_capacity(round.concurrency);
        while let Some(joined) = workers.join_next().await {
            match joined.map_err(Error::from).and_then(|outcome| outcome) {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    workers.abort_all();
                    feeder.abort();
                    consumer.abort();
                    bar.abandon();
                    tracing::error!(
                        error = &err as &dyn std::error::Error,
                        action = %round.action,
                        "aborting round"
                    );
                    return Err(err);
                }
            }
        }

        // All result senders are gone now, so the consumer drains and returns.
        let feed = feeder.await??;
        let mut stats = consumer.await?;
        stats.refresh();
        bar.finish_and_clear();

        let report = RoundReport {
            stats,
            feed,
            workers: summaries,
        };
        tracing::info!(
            round = %report.stats.title(),
            completed = report.stats.count(),
            failures = report.failures(),
            "finished round"
        );
        Ok(report)
    }

    fn progress_bar(&self, title: &str, expected: Option<u64>) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }

        let bar = match expected {
            Some(len) => ProgressBar::new(len).with_style(ProgressStyle::with_template(
                "{msg} {wide_bar} {pos}/{len} ({per_sec}, {eta})",
            )?),
            None => ProgressBar::new_spinner().with_style(ProgressStyle::with_template(
                "{spinner} {msg} {pos} ({per_sec}) {elapsed}",
            )?),
        };
        let bar = bar.with_message(title.to_owned());
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(bar)
    }
}

impl fmt::Debug for BenchmarkRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkRunner")
            .field("backend", &self.backend)
            .field("payloads", &self.payloads.is_some())
            .field("progress", &self.progress)
            .finish()
    }
}

async fn consume(
    mut stats: Stats,
    mut results: mpsc::Receiver<Measurement>,
    bar: ProgressBar,
) -> Stats {
    while let Some(measurement) = results.recv().await {
        stats.update(measurement);
        bar.inc(1);
    }
    stats
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::backend::{InMemoryBackend, Operation};
    use crate::source::MemorySource;
    use crate::worker::MAX_WORKER_FAILURES;

    fn runner(backend: &InMemoryBackend, payloads: usize) -> BenchmarkRunner {
        BenchmarkRunner::new(Arc::new(backend.clone())).with_payloads(move || {
            let source =
                MemorySource::from_payloads((0..payloads).map(|i| format!("message number {i}")));
            Ok(Box::new(source) as Box<dyn PayloadSource>)
        })
    }

    #[test]
    fn round_titles() {
        assert_eq!(RoundConfig::new(Action::Upload, 16, 0).title(), "PUT 16");
        assert_eq!(RoundConfig::new(Action::Download, 4, 10).title(), "GET 4");
        assert_eq!(RoundConfig::clean(8).title(), "DEL 8");
        assert_eq!(RoundConfig::clean(8).max_jobs, 0);
    }

    #[tokio::test]
    async fn upload_download_clean() {
        let backend = InMemoryBackend::new();
        let runner = runner(&backend, 50);

        let upload = runner
            .run(RoundConfig::new(Action::Upload, 4, 0))
            .await
            .unwrap();
        assert_eq!(upload.stats.title(), "PUT 4");
        assert_eq!(upload.stats.count(), 50);
        assert_eq!(upload.feed.produced, 50);
        assert_eq!(upload.workers.len(), 4);
        assert_eq!(upload.failures(), 0);
        assert_eq!(backend.len(), 50);

        let download = runner
            .run(RoundConfig::new(Action::Download, 8, 20))
            .await
            .unwrap();
        assert_eq!(download.stats.count(), 20);
        assert!(download.stats.sum_bytes() > 0);

        let clean = runner.run(RoundConfig::clean(16)).await.unwrap();
        assert_eq!(clean.stats.count(), 50);
        assert_eq!(clean.stats.sum_bytes(), 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn upload_respects_max_jobs() {
        let backend = InMemoryBackend::new();
        let report = runner(&backend, 1000)
            .run(RoundConfig::new(Action::Upload, 2, 5))
            .await
            .unwrap();

        assert_eq!(report.stats.count(), 5);
        assert_eq!(backend.len(), 5);
    }

    #[tokio::test]
    async fn download_from_empty_listing() {
        let backend = InMemoryBackend::new();
        let report = runner(&backend, 0)
            .run(RoundConfig::new(Action::Download, 4, 100))
            .await
            .unwrap();

        assert_eq!(report.stats.count(), 0);
        assert_eq!(report.feed.produced, 0);
        assert_eq!(report.stats.latency().max, 0.0);
    }

    #[tokio::test]
    async fn slow_backend_completes_all_jobs() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(2));
        let report = runner(&backend, 200)
            .run(RoundConfig::new(Action::Upload, 8, 0))
            .await
            .unwrap();

        assert_eq!(report.stats.count(), 200);
        let latency = report.stats.latency();
        assert!(latency.min >= 2.0, "{latency:?}");
        assert!(latency.p25 <= latency.p75);
    }

    #[tokio::test]
    async fn sustained_failures_abort_round() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Put, u64::MAX);

        let err = runner(&backend, 500)
            .run(RoundConfig::new(Action::Upload, 2, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TooManyFailures { .. }));
        assert!(err.to_string().contains("upload"));
        assert!(backend.attempts(Operation::Put) <= 2 * (MAX_WORKER_FAILURES + 1));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_skipped() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Put, 3);

        let report = runner(&backend, 30)
            .run(RoundConfig::new(Action::Upload, 1, 0))
            .await
            .unwrap();

        assert_eq!(report.failures(), 3);
        assert_eq!(report.stats.count(), 27);
    }

    #[tokio::test]
    async fn upload_requires_payload_source() {
        let backend: SharedBackend = Arc::new(InMemoryBackend::new());
        let err = BenchmarkRunner::new(backend)
            .run(RoundConfig::new(Action::Upload, 1, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoPayloadSource));
    }

    #[tokio::test]
    async fn unreadable_source_fails_round() {
        let backend = InMemoryBackend::new();
        let runner = BenchmarkRunner::new(Arc::new(backend.clone())).with_payloads(|| {
            let source = MemorySource::new(vec![Some(Bytes::from("a"))]).fail_at(0);
            Ok(Box::new(source) as Box<dyn PayloadSource>)
        });

        let err = runner
            .run(RoundConfig::new(Action::Upload, 2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert!(backend.is_empty());
    }
}
