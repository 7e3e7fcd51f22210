//! The benchmark sweep over all configured concurrency levels.

use std::path::PathBuf;

use anyhow::{Context, Result};
use s3bench_service::{
    Action, BenchmarkRunner, CommitLog, PayloadSource, RoundConfig, SharedBackend, create_backend,
};
use yansi::Paint;

use crate::config::Config;
use crate::report::Report;

/// The phases to run, in this order: upload, download, clean.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Phases {
    pub upload: bool,
    pub download: bool,
    pub clean: bool,
}

impl Phases {
    pub fn is_empty(&self) -> bool {
        !(self.upload || self.download || self.clean)
    }
}

/// Prints a phase announcement to stderr.
fn info(message: impl std::fmt::Display) {
    eprintln!("{}", message.to_string().blue().bold());
    tracing::debug!("{message}");
}

/// Sets up the storage and verifies it accepts writes.
pub async fn prepare(config: &Config) -> Result<SharedBackend> {
    let backend = create_backend(config.storage.backend_config())
        .context("failed to initialize storage")?;

    info(format_args!("{}: setup", backend.name()));
    backend
        .setup()
        .await
        .context("failed to set up storage")?;

    info(format_args!("{}: testing", backend.name()));
    backend
        .health_check()
        .await
        .context("storage health check failed")?;

    Ok(backend)
}

/// Runs the selected phases and returns the statistics of every round.
///
/// For every configured worker count, an upload round runs before a download round. Cleanup runs
/// once at the end with the cleaning concurrency. The table of all finished rounds is printed after
/// each step.
pub async fn run(config: &Config, phases: Phases) -> Result<Report> {
    let backend = prepare(config).await?;

    let benchmark = &config.benchmark;
    let mut runner = BenchmarkRunner::new(backend).with_progress(benchmark.progress);
    if let Some(repository) = &benchmark.repository {
        runner = runner.with_payloads(payload_source(repository.clone()));
    }

    let mut report = Report::new();
    for &workers in &benchmark.workers {
        if phases.upload {
            info(format_args!("upload test with {workers} workers"));
            let round = RoundConfig::new(Action::Upload, workers, benchmark.max_jobs);
            report.push(runner.run(round).await?.stats);
            report.print_table();
        }

        if phases.download {
            info(format_args!("download test with {workers} workers"));
            let round = RoundConfig::new(Action::Download, workers, benchmark.max_jobs);
            report.push(runner.run(round).await?.stats);
            report.print_table();
        }
    }

    if phases.clean {
        let workers = benchmark.cleaning_workers;
        info(format_args!("clean with {workers} workers"));
        report.push(runner.run(RoundConfig::clean(workers)).await?.stats);
        report.print_table();
    }

    Ok(report)
}

fn payload_source(
    repository: PathBuf,
) -> impl Fn() -> s3bench_service::SourceResult<Box<dyn PayloadSource>> + Send + Sync + 'static {
    move || {
        let log = CommitLog::open(&repository)?;
        Ok(Box::new(log) as Box<dyn PayloadSource>)
    }
}
