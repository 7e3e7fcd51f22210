use std::sync::Arc;

use futures_util::TryStreamExt;
use s3bench_service::{
    Action, BenchmarkRunner, CommitLog, KEY_PREFIX, PayloadSource, RoundConfig, StorageConfig,
    content_key, create_backend,
};
use s3bench_test::repo::TestRepo;

#[tokio::test(flavor = "multi_thread")]
async fn filesystem_upload_download_clean() {
    s3bench_test::tracing::init();

    let mut repo = TestRepo::new();
    for i in 0..40 {
        repo.commit_message(format!("Subject: message {i}\n\nbody {i}\n").as_bytes());
        if i % 10 == 0 {
            repo.commit_without_message();
        }
    }

    let storage = tempfile::tempdir().unwrap();
    let backend = create_backend(StorageConfig::FileSystem {
        path: storage.path(),
    })
    .unwrap();
    backend.setup().await.unwrap();
    backend.health_check().await.unwrap();

    let repo_path = repo.path().to_owned();
    let runner = BenchmarkRunner::new(Arc::clone(&backend)).with_payloads(move || {
        Ok(Box::new(CommitLog::open(&repo_path)?) as Box<dyn PayloadSource>)
    });

    let upload = runner
        .run(RoundConfig::new(Action::Upload, 4, 25))
        .await
        .unwrap();
    assert_eq!(upload.stats.count(), 25);
    assert_eq!(upload.feed.produced, 25);

    // newest message first
    let newest = storage.path().join(content_key(b"Subject: message 39\n\nbody 39\n"));
    assert!(newest.exists());

    let keys: Vec<String> = backend.list_objects(KEY_PREFIX).try_collect().await.unwrap();
    assert_eq!(keys.len(), 25);

    let download = runner
        .run(RoundConfig::new(Action::Download, 2, 0))
        .await
        .unwrap();
    assert_eq!(download.stats.count(), 25);
    assert_eq!(download.stats.sum_bytes(), upload.stats.sum_bytes());

    let clean = runner.run(RoundConfig::clean(8)).await.unwrap();
    assert_eq!(clean.stats.count(), 25);

    let keys: Vec<String> = backend.list_objects(KEY_PREFIX).try_collect().await.unwrap();
    assert!(keys.is_empty());
}
