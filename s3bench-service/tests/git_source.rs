use s3bench_service::{CommitLog, PayloadSource, SourceError};
use s3bench_test::repo::TestRepo;

fn payloads(log: &CommitLog) -> Vec<Option<String>> {
    log.entries()
        .unwrap()
        .map(|entry| entry.unwrap().map(|b| String::from_utf8(b.to_vec()).unwrap()))
        .collect()
}

#[test]
fn walks_newest_first() {
    s3bench_test::tracing::init();
    let repo = TestRepo::with_messages(["first", "second", "third"]);

    let log = CommitLog::open(repo.path()).unwrap();
    assert_eq!(
        payloads(&log),
        [
            Some("third".to_owned()),
            Some("second".to_owned()),
            Some("first".to_owned())
        ]
    );
}

#[test]
fn entries_without_message_have_no_payload() {
    let mut repo = TestRepo::new();
    repo.commit_message(b"kept");
    repo.commit_without_message();
    repo.commit_message(b"also kept");

    let log = CommitLog::open(repo.path()).unwrap();
    assert_eq!(log.count(0).unwrap(), 3);
    assert_eq!(
        payloads(&log),
        [Some("also kept".to_owned()), None, Some("kept".to_owned())]
    );
}

#[test]
fn count_respects_limit() {
    let repo = TestRepo::with_messages((0..10).map(|i| format!("message {i}")));

    let log = CommitLog::open(repo.path()).unwrap();
    assert_eq!(log.count(0).unwrap(), 10);
    assert_eq!(log.count(4).unwrap(), 4);
    assert_eq!(log.count(100).unwrap(), 10);
}

#[test]
fn entries_replay_from_start() {
    let repo = TestRepo::with_messages(["a", "b"]);

    let log = CommitLog::open(repo.path()).unwrap();
    assert_eq!(payloads(&log), payloads(&log));
}

#[test]
fn open_fails_without_repository() {
    let dir = tempfile::tempdir().unwrap();
    let result = CommitLog::open(&dir.path().join("missing"));
    assert!(matches!(result, Err(SourceError::Open { .. })));
}

#[test]
fn open_fails_without_history() {
    let repo = TestRepo::new();
    let result = CommitLog::open(repo.path());
    assert!(matches!(result, Err(SourceError::Open { .. })));
}
