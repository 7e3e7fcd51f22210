use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};

use crate::backend::common::{Backend, BackendError, BackendResult, KeyStream};

/// Default timeout for every request, including reading the response body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Marker in the error body when creating a bucket that already exists.
const BUCKET_OWNED_MARKER: &str = "BucketAlreadyOwnedByYou";

/// Configuration for [`S3Compatible`].
#[derive(Clone, Debug)]
pub struct S3CompatibleConfig {
    /// The bucket holding all benchmark objects.
    pub bucket: String,
    /// The signing region, also used as location constraint when creating the bucket.
    pub region: String,
    /// Custom endpoint URL. Defaults to the AWS endpoint of `region`.
    pub endpoint: Option<String>,
    /// Creates the bucket during [`Backend::setup`].
    pub create_bucket: bool,
    /// Forces path-style addressing. Always enabled with a custom endpoint.
    pub path_style: bool,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Access key. Falls back to the default AWS credential chain if unset.
    pub access_key: Option<String>,
    /// Secret key. Falls back to the default AWS credential chain if unset.
    pub secret_key: Option<String>,
}

impl Default for S3CompatibleConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: String::new(),
            endpoint: None,
            create_bucket: false,
            path_style: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_key: None,
            secret_key: None,
        }
    }
}

/// A backend talking to Amazon S3 or any S3-compatible service.
pub struct S3Compatible {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    create_bucket: bool,
}

impl S3Compatible {
    /// Creates a new S3 compatible backend bound to the given bucket.
    ///
    /// This does not perform any requests. Call [`Backend::setup`] before use.
    pub fn new(config: S3CompatibleConfig) -> BackendResult<Self> {
        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(
                    Some(access_key.as_str()),
                    Some(secret_key.as_str()),
                    None,
                    None,
                    None,
                )
            }
            _ => Credentials::default(),
        }
        .map_err(|cause| BackendError::generic("failed to load S3 credentials", cause))?;

        let path_style = config.path_style || config.endpoint.is_some();
        let region = Region::Custom {
            endpoint: match config.endpoint {
                Some(endpoint) => endpoint,
                None => format!("https://s3.{}.amazonaws.com", config.region),
            },
            region: config.region,
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|cause| BackendError::s3("invalid bucket configuration", cause))?;

        // custom endpoints don't generally work with the bucket in the host prefix
        if path_style {
            bucket = bucket.with_path_style();
        }

        let bucket = bucket
            .with_request_timeout(config.request_timeout)
            .map_err(|cause| BackendError::s3("invalid request timeout", cause))?;

        Ok(Self {
            bucket,
            region,
            credentials,
            create_bucket: config.create_bucket,
        })
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        let name = self.bucket.name();
        tracing::info!(bucket = %name, "creating bucket");

        let result = Bucket::create_with_path_style(
            &name,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await;

        match result {
            Ok(response) if response.success() => Ok(()),
            Ok(response) if response.response_text.contains(BUCKET_OWNED_MARKER) => {
                tracing::debug!(bucket = %name, "bucket already exists");
                Ok(())
            }
            Ok(response) => Err(BackendError::Status {
                context: format!("failed to create bucket {name}"),
                status: response.response_code,
            }),
            Err(err) if err.to_string().contains(BUCKET_OWNED_MARKER) => {
                tracing::debug!(bucket = %name, "bucket already exists");
                Ok(())
            }
            Err(cause) => Err(BackendError::s3(
                format!("failed to create bucket {name}"),
                cause,
            )),
        }
    }
}

impl fmt::Debug for S3Compatible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

fn check_status(context: impl FnOnce() -> String, status: u16) -> BackendResult<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(BackendError::NotFound(context())),
        status => Err(BackendError::Status {
            context: context(),
            status,
        }),
    }
}

#[async_trait::async_trait]
impl Backend for S3Compatible {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    async fn setup(&self) -> BackendResult<()> {
        if self.create_bucket {
            self.create_bucket().await?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self, payload), fields(size = payload.len()))]
    async fn put_object(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let response = self
            .bucket
            .put_object(key, &payload)
            .await
            .map_err(|cause| BackendError::s3(format!("failed to put {key}"), cause))?;
        check_status(|| format!("put {key}"), response.status_code())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|cause| BackendError::s3(format!("failed to get {key}"), cause))?;
        check_status(|| key.to_owned(), response.status_code())?;
        Ok(response.bytes().clone())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|cause| BackendError::s3(format!("failed to delete {key}"), cause))?;
        check_status(|| format!("delete {key}"), response.status_code())
    }

    fn list_objects(&self, prefix: &str) -> KeyStream {
        let bucket = self.bucket.clone();
        let prefix = prefix.to_owned();

        async_stream::stream! {
            let mut continuation_token = None;
            loop {
                let page = bucket
                    .list_page(prefix.clone(), None, continuation_token.take(), None, None)
                    .await;
                let page = match page {
                    Ok((page, _status)) => page,
                    Err(cause) => {
                        yield Err(BackendError::s3(format!("failed to list {prefix}"), cause));
                        break;
                    }
                };

                for object in page.contents {
                    yield Ok(object.key);
                }

                match page.next_continuation_token {
                    Some(token) if page.is_truncated => continuation_token = Some(token),
                    _ => break,
                }
            }
        }
        .boxed()
    }
}
