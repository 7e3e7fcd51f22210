//! Throwaway archives in public-inbox layout.
//!
//! A public-inbox archive stores one message per commit, in a file named `m` at the root of the
//! tree. [`TestRepo`] builds such histories in a temporary directory, with strictly increasing
//! commit times so the newest-first order is deterministic.

use std::path::Path;

use git2::{Oid, Repository, Signature, Time};
use tempfile::TempDir;

/// Commit time of the first commit, in seconds since the epoch.
const BASE_TIME: i64 = 1_600_000_000;

/// A git repository in a temporary directory, deleted on drop.
///
/// # Example
///
/// ```
/// let mut repo = s3bench_test::repo::TestRepo::new();
/// repo.commit_message(b"Subject: hello\n\nworld\n");
/// assert!(repo.path().exists());
/// ```
pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
    commits: i64,
}

impl TestRepo {
    /// Creates an empty repository without any commits.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self {
            dir,
            repo,
            commits: 0,
        }
    }

    /// Creates a repository with one commit per message, committed in the given order.
    pub fn with_messages<I, M>(messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        let mut repo = Self::new();
        for message in messages {
            repo.commit_message(message.as_ref());
        }
        repo
    }

    /// Path to the working directory of the repository.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of commits created so far.
    pub fn len(&self) -> usize {
        self.commits as usize
    }

    pub fn is_empty(&self) -> bool {
        self.commits == 0
    }

    /// Commits a tree holding `message` as the message file.
    pub fn commit_message(&mut self, message: &[u8]) -> Oid {
        self.commit_file("m", message)
    }

    /// Commits a tree without a message file, like a deletion in a public-inbox archive.
    pub fn commit_without_message(&mut self) -> Oid {
        self.commit_file("d", b"deleted")
    }

    fn commit_file(&mut self, name: &str, contents: &[u8]) -> Oid {
        let blob = self.repo.blob(contents).unwrap();
        let mut builder = self.repo.treebuilder(None).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
        let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();

        self.commits += 1;
        let time = Time::new(BASE_TIME + self.commits * 60, 0);
        let signature = Signature::new("s3bench", "s3bench@example.com", &time).unwrap();

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit().unwrap()),
            Err(_) => None,
        };
        let parents: Vec<_> = parent.iter().collect();

        self.repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("commit {}", self.commits),
                &tree,
                &parents,
            )
            .unwrap()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRepo")
            .field("path", &self.path())
            .field("commits", &self.commits)
            .finish()
    }
}
