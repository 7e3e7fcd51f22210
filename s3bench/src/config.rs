//! Configuration for the s3bench command.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `S3BENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `S3BENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `S3BENCH__STORAGE__ENDPOINT=https://s3.fr-par.scw.cloud` sets the S3 endpoint
//! - `S3BENCH__STORAGE__SECRET_KEY=...` sets the S3 secret key
//! - `S3BENCH__BENCHMARK__WORKERS=[1,4,16]` sets the concurrency levels
//!
//! # YAML Configuration File
//!
//! ```yaml
//! storage:
//!   type: s3compatible
//!   endpoint: https://s3.fr-par.scw.cloud
//!   bucket: bench
//!
//! benchmark:
//!   repository: /srv/public-inbox/git/0.git
//!   workers: [4, 8, 16]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use figment::providers::{Env, Format, Serialized, Yaml};
use s3bench_service::StorageConfig;
use s3bench_service::backend::S3CompatibleConfig;
use s3bench_service::backend::s3_compatible::DEFAULT_REQUEST_TIMEOUT;
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::bench::Phases;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "S3BENCH__";

/// Region used for signing when none is configured.
pub const DEFAULT_REGION: &str = "fr-par";

/// A secret configuration value, redacted in `Debug` output. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Storage under test.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage (type `"filesystem"`).
    ///
    /// Useful to measure the benchmark itself without network in the way.
    FileSystem {
        /// Directory path for storing objects. Created if missing.
        path: PathBuf,
    },

    /// S3-compatible storage (type `"s3compatible"`). This is the default.
    S3Compatible(S3Storage),

    /// Objects are kept in memory and discarded on exit (type `"memory"`).
    Memory,
}

impl Storage {
    /// The backend configuration for this storage.
    pub fn backend_config(&self) -> StorageConfig<'_> {
        match self {
            Storage::FileSystem { path } => StorageConfig::FileSystem { path: path.as_path() },
            Storage::S3Compatible(s3) => StorageConfig::S3Compatible(s3.backend_config()),
            Storage::Memory => StorageConfig::Memory,
        }
    }
}

/// Connection settings for S3-compatible storage.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Storage {
    /// S3 endpoint URL. Required.
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__STORAGE__ENDPOINT`
    pub endpoint: String,

    /// Bucket receiving all benchmark objects. Required.
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__STORAGE__BUCKET`
    pub bucket: String,

    /// Signing region, also the location constraint of a created bucket.
    ///
    /// # Default
    ///
    /// `fr-par`
    pub region: String,

    /// Create the bucket before benchmarking. An existing bucket owned by the same account is
    /// reused.
    pub create_bucket: bool,

    /// Use path-style addressing. Custom endpoints always use path style.
    pub path_style: bool,

    /// Timeout for every request, e.g. `30s` or `3m`.
    ///
    /// # Default
    ///
    /// `180s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Access key. Falls back to the AWS environment and profile if unset.
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__STORAGE__ACCESS_KEY`
    pub access_key: Option<String>,

    /// Secret key, redacted in logs.
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__STORAGE__SECRET_KEY`
    pub secret_key: Option<SecretBox<ConfigSecret>>,
}

impl S3Storage {
    fn backend_config(&self) -> S3CompatibleConfig {
        S3CompatibleConfig {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: Some(self.endpoint.clone()).filter(|e| !e.is_empty()),
            create_bucket: self.create_bucket,
            path_style: self.path_style,
            request_timeout: self.request_timeout,
            access_key: self.access_key.clone(),
            secret_key: self
                .secret_key
                .as_ref()
                .map(|secret| secret.expose_secret().as_str().to_owned()),
        }
    }
}

impl Default for S3Storage {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            region: DEFAULT_REGION.to_owned(),
            create_bucket: false,
            path_style: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_key: None,
            secret_key: None,
        }
    }
}

/// Parameters of the benchmark sweep.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Benchmark {
    /// Path to the public-inbox git repository providing upload payloads.
    ///
    /// Required for the upload phase.
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__BENCHMARK__REPOSITORY`
    pub repository: Option<PathBuf>,

    /// Concurrency levels, one upload and one download round each.
    ///
    /// # Default
    ///
    /// `[4, 8, 16, 32]`
    pub workers: Vec<usize>,

    /// Concurrency of the clean round.
    ///
    /// # Default
    ///
    /// `16`
    pub cleaning_workers: usize,

    /// Maximum number of objects per upload and download round. `0` means no limit.
    ///
    /// # Default
    ///
    /// `100000`
    pub max_jobs: u64,

    /// Show a progress bar on stderr.
    ///
    /// # Default
    ///
    /// `true`
    pub progress: bool,
}

impl Default for Benchmark {
    fn default() -> Self {
        Self {
            repository: None,
            workers: vec![4, 8, 16, 32],
            cleaning_workers: 16,
            max_jobs: 100_000,
            progress: true,
        }
    }
}

/// Log output format.
///
/// [`LogFormat::Auto`] picks [`LogFormat::Pretty`] when stderr is a terminal and
/// [`LogFormat::Simplified`] otherwise.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Auto,
    /// Multi-line output with colors.
    Pretty,
    /// One plain line per event.
    Simplified,
    /// JSON lines.
    Json,
}

/// (De)serializes a [`LevelFilter`] by its name, such as `info` or `off`.
mod level_filter {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(level)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence and allows per-module control.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__LOGGING__LEVEL`
    #[serde(with = "level_filter")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`].
    ///
    /// # Environment Variable
    ///
    /// `S3BENCH__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for s3bench.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The storage under test.
    ///
    /// # Default
    ///
    /// S3-compatible storage in region `fr-par` without endpoint or bucket.
    pub storage: Storage,

    /// Parameters of the benchmark sweep.
    pub benchmark: Benchmark,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Storage {
    fn default() -> Self {
        Storage::S3Compatible(S3Storage::default())
    }
}

/// Values given on the command line, which override all other sources.
///
/// Unset fields leave the configured value untouched.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    pub storage: StorageOverrides,
    pub benchmark: BenchmarkOverrides,
}

#[derive(Debug, Default, Serialize)]
pub struct StorageOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_bucket: Option<bool>,
}

#[derive(Debug, Default, Serialize)]
pub struct BenchmarkOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaning_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_jobs: Option<u64>,
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file at `path`, the environment and
    /// finally the command line `overrides`, each overriding the previous ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if any source contains
    /// invalid values.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Checks that the configuration can run the given phases.
    pub fn validate(&self, phases: Phases) -> Result<()> {
        if phases.is_empty() {
            bail!("nothing to do: pass at least one of --upload, --download or --clean");
        }

        if let Storage::S3Compatible(s3) = &self.storage {
            if s3.endpoint.is_empty() {
                bail!("missing S3 endpoint: set --endpoint or storage.endpoint");
            }
            if s3.bucket.is_empty() {
                bail!("missing bucket name: set --bucket-name or storage.bucket");
            }
        }

        let benchmark = &self.benchmark;
        if phases.upload && benchmark.repository.is_none() {
            bail!("missing repository for upload: set --public-inbox-repo or benchmark.repository");
        }
        if (phases.upload || phases.download) && benchmark.workers.is_empty() {
            bail!("no worker counts configured");
        }
        if benchmark.workers.contains(&0) {
            bail!("worker counts must be positive");
        }
        if phases.clean && benchmark.cleaning_workers == 0 {
            bail!("cleaning workers must be positive");
        }

        Ok(())
    }
}
