//! Produces the jobs of a round.
//!
//! A feed is set up in two steps. [`JobFeeder::open`] performs everything that may fail before the
//! first job exists: counting the payload history, or fetching the first listed key. Errors at this
//! point abort the round before any worker does work. [`OpenFeed::run`] then pushes jobs into the
//! bounded job queue and closes it when done. Errors after the first job are logged and end the
//! feed early.

use std::fmt;

use futures_util::StreamExt;

use crate::backend::{KeyStream, SharedBackend};
use crate::datamodel::Job;
use crate::error::Result;
use crate::key::KEY_PREFIX;
use crate::source::PayloadSource;

/// Capacity of the job queue between the feeder and the workers.
pub const JOB_QUEUE_CAPACITY: usize = 64;

/// What a feed produced.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FeedSummary {
    /// Number of jobs pushed into the job queue.
    pub produced: u64,
}

/// Where jobs come from.
pub enum JobFeeder {
    /// Payloads from a payload source, for upload rounds.
    Payloads {
        source: Box<dyn PayloadSource>,
        max_jobs: u64,
    },
    /// Keys listed under [`KEY_PREFIX`], for download and clean rounds.
    Listing {
        backend: SharedBackend,
        max_jobs: u64,
    },
}

impl JobFeeder {
    /// Feeds up to `max_jobs` payloads from `source`. A `max_jobs` of `0` feeds all of them.
    pub fn payloads(source: impl PayloadSource, max_jobs: u64) -> Self {
        Self::Payloads {
            source: Box::new(source),
            max_jobs,
        }
    }

    /// Feeds up to `max_jobs` keys listed from `backend`. A `max_jobs` of `0` drains the listing.
    pub fn listing(backend: SharedBackend, max_jobs: u64) -> Self {
        Self::Listing { backend, max_jobs }
    }

    /// Prepares the feed.
    ///
    /// For payloads, this counts the entries the feed will look at. For listings, this fetches the
    /// first key, so a failing listing is reported before the round starts.
    pub async fn open(self) -> Result<OpenFeed> {
        match self {
            Self::Payloads { source, max_jobs } => {
                tracing::info!("counting payloads");
                let (source, entries) = tokio::task::spawn_blocking(move || {
                    let entries = source.count(max_jobs);
                    (source, entries)
                })
                .await?;
                let entries = entries?;
                tracing::info!(entries, "collected payloads");

                Ok(OpenFeed {
                    inner: Feed::Payloads { source, max_jobs },
                    expected: Some(entries),
                })
            }
            Self::Listing { backend, max_jobs } => {
                let mut keys = backend.list_objects(KEY_PREFIX);
                let first = keys.next().await.transpose()?;

                Ok(OpenFeed {
                    inner: Feed::Keys {
                        first,
                        keys,
                        max_jobs,
                    },
                    expected: (max_jobs != 0).then_some(max_jobs),
                })
            }
        }
    }
}

impl fmt::Debug for JobFeeder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payloads { max_jobs, .. } => f
                .debug_struct("Payloads")
                .field("max_jobs", max_jobs)
                .finish_non_exhaustive(),
            Self::Listing { backend, max_jobs } => f
                .debug_struct("Listing")
                .field("backend", backend)
                .field("max_jobs", max_jobs)
                .finish(),
        }
    }
}

enum Feed {
    Payloads {
        source: Box<dyn PayloadSource>,
        max_jobs: u64,
    },
    Keys {
        first: Option<String>,
        keys: KeyStream,
        max_jobs: u64,
    },
}

/// A feed that is ready to produce jobs.
pub struct OpenFeed {
    inner: Feed,
    expected: Option<u64>,
}

impl OpenFeed {
    /// Upper bound for the number of jobs, if known.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Pushes all jobs into `jobs`, blocking while the queue is full.
    ///
    /// The queue is closed when this returns, since `jobs` is the only sender. Feeding also stops
    /// early once all receivers are gone.
    pub async fn run(self, jobs: flume::Sender<Job>) -> Result<FeedSummary> {
        let summary = match self.inner {
            Feed::Payloads { source, max_jobs } => {
                tokio::task::spawn_blocking(move || feed_payloads(source.as_ref(), max_jobs, jobs))
                    .await??
            }
            Feed::Keys {
                first,
                keys,
                max_jobs,
            } => feed_keys(first, keys, max_jobs, jobs).await,
        };

        tracing::debug!(produced = summary.produced, "feed finished");
        Ok(summary)
    }
}

impl fmt::Debug for OpenFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFeed")
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

fn reached(produced: u64, max_jobs: u64) -> bool {
    max_jobs != 0 && produced >= max_jobs
}

fn feed_payloads(
    source: &dyn PayloadSource,
    max_jobs: u64,
    jobs: flume::Sender<Job>,
) -> Result<FeedSummary> {
    let mut summary = FeedSummary::default();
    for entry in source.entries()? {
        let payload = match entry {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(err) if summary.produced == 0 => return Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    produced = summary.produced,
                    "payload source failed, ending feed early"
                );
                break;
            }
        };

        if jobs.send(Job::Payload(payload)).is_err() {
            tracing::debug!("job queue closed, stopping feed");
            break;
        }

        summary.produced += 1;
        if reached(summary.produced, max_jobs) {
            break;
        }
    }

    Ok(summary)
}

async fn feed_keys(
    first: Option<String>,
    mut keys: KeyStream,
    max_jobs: u64,
    jobs: flume::Sender<Job>,
) -> FeedSummary {
    let mut summary = FeedSummary::default();
    let mut next = first;

    while let Some(key) = next {
        if jobs.send_async(Job::Key(key)).await.is_err() {
            tracing::debug!("job queue closed, stopping feed");
            break;
        }

        summary.produced += 1;
        if reached(summary.produced, max_jobs) {
            break;
        }

        next = match keys.next().await {
            Some(Ok(key)) => Some(key),
            Some(Err(err)) => {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    produced = summary.produced,
                    "listing failed, ending feed early"
                );
                None
            }
            None => None,
        };
    }

    summary
}
