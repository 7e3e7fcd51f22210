//! Payload sources for upload rounds.
//!
//! Upload payloads are real-world messages taken from a [public-inbox] archive. Such an archive is
//! a git repository in which every commit carries exactly one message in a file named `m`. The
//! [`CommitLog`] walks this history newest-first.
//!
//! [public-inbox]: https://public-inbox.org/README.html

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use git2::{Commit, Repository, Revwalk, Sort};
use thiserror::Error;

/// Name of the file holding the message in each commit.
pub const MESSAGE_FILE: &str = "m";

/// Errors reading from a [`PayloadSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The repository could not be opened or has no history.
    #[error("failed to open repository {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        cause: git2::Error,
    },

    /// Walking the history failed.
    #[error("failed to read history: {0}")]
    Git(#[from] git2::Error),

    /// A source that stopped producing entries unexpectedly.
    #[error("payload source failed: {0}")]
    Other(String),
}

/// Result type for payload sources.
pub type SourceResult<T> = Result<T, SourceError>;

/// Entries of a payload source.
///
/// Each entry yields its payload, or `None` if the entry does not carry one. Errors indicate that
/// the history itself could not be read.
pub type Entries<'a> = Box<dyn Iterator<Item = SourceResult<Option<Bytes>>> + 'a>;

/// An ordered, replayable sequence of payload entries.
///
/// Sources are read from a blocking thread. [`count`](Self::count) and
/// [`entries`](Self::entries) each start over from the first entry.
pub trait PayloadSource: Send + 'static {
    /// Counts entries up to `limit`. A `limit` of `0` counts all entries.
    fn count(&self, limit: u64) -> SourceResult<u64>;

    /// Iterates over all entries from the start.
    fn entries(&self) -> SourceResult<Entries<'_>>;
}

/// The history of a git repository, newest commit first.
pub struct CommitLog {
    repo: Repository,
    path: PathBuf,
}

impl CommitLog {
    /// Opens the repository at `path`.
    ///
    /// Fails if the repository does not exist or `HEAD` does not point to a commit.
    pub fn open(path: &Path) -> SourceResult<Self> {
        let open_error = |cause| SourceError::Open {
            path: path.to_owned(),
            cause,
        };

        let repo = Repository::open(path).map_err(open_error)?;
        repo.head()
            .and_then(|head| head.peel_to_commit())
            .map_err(open_error)?;

        Ok(Self {
            repo,
            path: path.to_owned(),
        })
    }

    fn walk(&self) -> SourceResult<Revwalk<'_>> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TIME)?;
        walk.push_head()?;
        Ok(walk)
    }

    fn message(&self, commit: &Commit<'_>) -> Option<Bytes> {
        let tree = commit.tree().ok()?;
        let entry = tree.get_path(Path::new(MESSAGE_FILE)).ok()?;
        let blob = self.repo.find_blob(entry.id()).ok()?;
        Some(Bytes::copy_from_slice(blob.content()))
    }
}

impl fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PayloadSource for CommitLog {
    fn count(&self, limit: u64) -> SourceResult<u64> {
        let mut count = 0;
        for oid in self.walk()? {
            oid?;
            count += 1;
            if limit != 0 && count >= limit {
                break;
            }
        }
        Ok(count)
    }

    fn entries(&self) -> SourceResult<Entries<'_>> {
        let walk = self.walk()?;
        Ok(Box::new(walk.map(move |oid| {
            let commit = self.repo.find_commit(oid?)?;
            let message = self.message(&commit);
            if message.is_none() {
                tracing::trace!(commit = %commit.id(), "skipping commit without message");
            }
            Ok(message)
        })))
    }
}

/// A payload source over a fixed list of entries.
///
/// Useful for tests and synthetic workloads. Entries set to `None` carry no payload.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    entries: Vec<Option<Bytes>>,
    fail_at: Option<usize>,
}

impl MemorySource {
    pub fn new(entries: Vec<Option<Bytes>>) -> Self {
        Self {
            entries,
            fail_at: None,
        }
    }

    /// Creates a source where every entry carries a payload.
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        Self::new(payloads.into_iter().map(|p| Some(p.into())).collect())
    }

    /// Fails with a read error once `index` entries have been produced.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl PayloadSource for MemorySource {
    fn count(&self, limit: u64) -> SourceResult<u64> {
        let len = self.entries.len() as u64;
        Ok(if limit == 0 { len } else { len.min(limit) })
    }

    fn entries(&self) -> SourceResult<Entries<'_>> {
        let fail_at = self.fail_at.unwrap_or(usize::MAX);
        Ok(Box::new(self.entries.iter().enumerate().map_while(
            move |(index, entry)| match index.cmp(&fail_at) {
                std::cmp::Ordering::Less => Some(Ok(entry.clone())),
                std::cmp::Ordering::Equal => Some(Err(SourceError::Other(format!(
                    "entry {index} is unreadable"
                )))),
                std::cmp::Ordering::Greater => None,
            },
        )))
    }
}
