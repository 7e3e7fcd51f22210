use s3bench::bench::{self, Phases};
use s3bench::config::{Config, Storage};
use s3bench_test::repo::TestRepo;

fn config(storage: &std::path::Path, repo: &TestRepo) -> Config {
    let mut config = Config {
        storage: Storage::FileSystem {
            path: storage.to_owned(),
        },
        ..Default::default()
    };
    config.benchmark.repository = Some(repo.path().to_owned());
    config.benchmark.workers = vec![1, 4];
    config.benchmark.cleaning_workers = 2;
    config.benchmark.max_jobs = 20;
    config.benchmark.progress = false;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn full_sweep_on_filesystem() {
    s3bench_test::tracing::init();

    let repo = TestRepo::with_messages((0..30).map(|i| format!("Subject: {i}\n\nmessage {i}\n")));
    let storage = tempfile::tempdir().unwrap();
    let config = config(storage.path(), &repo);

    let phases = Phases {
        upload: true,
        download: true,
        clean: true,
    };
    config.validate(phases).unwrap();

    let report = bench::run(&config, phases).await.unwrap();

    let titles: Vec<_> = report.rounds().iter().map(|s| s.title()).collect();
    assert_eq!(titles, ["PUT 1", "GET 1", "PUT 4", "GET 4", "DEL 2"]);

    let counts: Vec<_> = report.rounds().iter().map(|s| s.count()).collect();
    // the second upload overwrites the same 20 objects
    assert_eq!(counts, [20, 20, 20, 20, 20]);

    let mut csv = Vec::new();
    report.write_csv(&mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 6);

    let leftovers = std::fs::read_dir(storage.path().join("s3bench")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_fails_for_missing_repository() {
    let repo = TestRepo::new();
    let storage = tempfile::tempdir().unwrap();
    let config = config(storage.path(), &repo);

    let phases = Phases {
        upload: true,
        ..Default::default()
    };
    let err = bench::run(&config, phases).await.unwrap_err();
    assert!(format!("{err:#}").contains("repository"), "{err:#}");
}
