//! Values passed between the stages of a round.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

/// The operation performed by all workers of a round.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    /// Store payloads from the payload source under content-addressed keys.
    Upload,
    /// Read back every listed object.
    Download,
    /// Delete every listed object.
    Clean,
}

impl Action {
    /// The lowercase name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Clean => "clean",
        }
    }

    /// The HTTP-style verb used in report titles.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Upload => "PUT",
            Action::Download => "GET",
            Action::Clean => "DEL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work, consumed by exactly one worker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Job {
    /// A payload to upload.
    Payload(Bytes),
    /// The key of an existing object to download or delete.
    Key(String),
}

impl Job {
    /// A short description of the job kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Payload(_) => "payload",
            Job::Key(_) => "key",
        }
    }
}

/// The outcome of one successfully completed operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Measurement {
    /// Wall-clock duration of the storage call.
    pub latency: Duration,
    /// Bytes transferred by the operation.
    pub size: u64,
}
