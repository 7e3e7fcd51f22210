use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::bench::{self, Phases};
use crate::config::{BenchmarkOverrides, Config, Overrides, StorageOverrides};
use crate::observability;

/// Benchmark an S3-compatible object store with real-world messages.
///
/// Uploads messages from a public-inbox archive, downloads them again and cleans up, once per
/// worker count, and reports throughput and latency percentiles for every round.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// public-inbox repository path
    #[argh(option, short = 'r')]
    public_inbox_repo: Option<PathBuf>,

    /// number of workers, separated by comma (default: 4,8,16,32)
    #[argh(option, short = 'w', from_str_fn(parse_workers))]
    workers: Option<Vec<usize>>,

    /// number of cleaning workers (default: 16)
    #[argh(option)]
    cleaning_workers: Option<usize>,

    /// maximum messages to upload and download per round, 0 for all (default: 100000)
    #[argh(option)]
    max_messages: Option<u64>,

    /// S3 endpoint
    #[argh(option)]
    endpoint: Option<String>,

    /// S3 bucket name
    #[argh(option)]
    bucket_name: Option<String>,

    /// S3 region (default: fr-par)
    #[argh(option)]
    region: Option<String>,

    /// creates the S3 bucket for you
    #[argh(switch)]
    createbucket: bool,

    /// write statistics to the given CSV file, - for stdout
    #[argh(option)]
    csv: Option<PathBuf>,

    /// upload test data (requires a public-inbox repository)
    #[argh(switch)]
    upload: bool,

    /// download test data (requires prior upload)
    #[argh(switch)]
    download: bool,

    /// remove test data (requires prior upload)
    #[argh(switch)]
    clean: bool,
}

impl Args {
    fn phases(&self) -> Phases {
        Phases {
            upload: self.upload,
            download: self.download,
            clean: self.clean,
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            storage: StorageOverrides {
                endpoint: self.endpoint.clone(),
                bucket: self.bucket_name.clone(),
                region: self.region.clone(),
                create_bucket: self.createbucket.then_some(true),
            },
            benchmark: BenchmarkOverrides {
                repository: self.public_inbox_repo.clone(),
                workers: self.workers.clone(),
                cleaning_workers: self.cleaning_workers,
                max_jobs: self.max_messages,
            },
        }
    }
}

fn parse_workers(value: &str) -> Result<Vec<usize>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|_| format!("invalid worker count `{part}`"))
        })
        .collect()
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let phases = args.phases();

    let config = Config::load(args.config.as_deref(), &args.overrides())?;
    config.validate(phases)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("s3bench-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let report = runtime.block_on(bench::run(&config, phases))?;
    if let Some(path) = &args.csv {
        report.save_csv(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["s3bench"], args).unwrap()
    }

    #[test]
    fn worker_lists() {
        assert_eq!(parse_workers("4,8,16").unwrap(), [4, 8, 16]);
        assert_eq!(parse_workers(" 1 , 2 ").unwrap(), [1, 2]);
        assert!(parse_workers("4,x").is_err());
    }

    #[test]
    fn flags_become_overrides() {
        let args = parse(&[
            "-r",
            "/srv/inbox.git",
            "-w",
            "2,4",
            "--endpoint",
            "http://localhost:9000",
            "--bucket-name",
            "bench",
            "--createbucket",
            "--max-messages",
            "10",
            "--upload",
            "--clean",
        ]);

        let phases = args.phases();
        assert!(phases.upload && phases.clean && !phases.download);

        let overrides = args.overrides();
        assert_eq!(overrides.storage.bucket.as_deref(), Some("bench"));
        assert_eq!(overrides.storage.create_bucket, Some(true));
        assert_eq!(overrides.storage.region, None);
        assert_eq!(overrides.benchmark.workers, Some(vec![2, 4]));
        assert_eq!(overrides.benchmark.max_jobs, Some(10));
    }

    #[test]
    fn unset_switches_do_not_override() {
        let args = parse(&["--download"]);
        assert_eq!(args.overrides().storage.create_bucket, None);
        assert_eq!(args.overrides().benchmark.workers, None);
    }
}
