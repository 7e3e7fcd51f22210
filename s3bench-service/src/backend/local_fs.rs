use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::backend::common::{Backend, BackendError, BackendResult, KeyStream};

/// A backend storing objects as files below a root directory.
///
/// Keys map directly to relative paths, so `s3bench/abc` is stored at `<root>/s3bench/abc`.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Backend for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn setup(&self) -> BackendResult<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let path = self.path.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        file.write_all(&payload).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        match tokio::fs::read(self.path.join(key)).await {
            Ok(contents) => Ok(contents.into()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BackendError::NotFound(key.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        match tokio::fs::remove_file(self.path.join(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BackendError::NotFound(key.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Lists files directly inside the directory named by `prefix`.
    ///
    /// Keys produced by the benchmark are flat below their namespace, so this does not descend into
    /// subdirectories.
    fn list_objects(&self, prefix: &str) -> KeyStream {
        let (dir, name_prefix) = match prefix.rfind('/') {
            Some(index) => prefix.split_at(index + 1),
            None => ("", prefix),
        };
        let dir = dir.to_owned();
        let name_prefix = name_prefix.to_owned();
        let path = self.path.join(&dir);

        async_stream::stream! {
            let mut entries = match tokio::fs::read_dir(&path).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(BackendError::from(err));
                    return;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(BackendError::from(err));
                        break;
                    }
                };

                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let is_file = entry.file_type().await.is_ok_and(|ty| ty.is_file());
                if is_file && name.starts_with(&name_prefix) {
                    yield Ok(format!("{dir}{name}"));
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn stores_and_overwrites_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path());

        backend
            .put_object("s3bench/a", Bytes::from_static(b"first"))
            .await
            .unwrap();
        backend
            .put_object("s3bench/a", Bytes::from_static(b"second"))
            .await
            .unwrap();

        let contents = backend.get_object("s3bench/a").await.unwrap();
        assert_eq!(contents.as_ref(), b"second");

        backend.delete_object("s3bench/a").await.unwrap();
        assert!(matches!(
            backend.get_object("s3bench/a").await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lists_by_prefix() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path());

        for key in ["s3bench/a", "s3bench/b", "other/c"] {
            backend.put_object(key, Bytes::new()).await.unwrap();
        }

        let mut keys: Vec<String> = backend.list_objects("s3bench/").try_collect().await.unwrap();
        keys.sort();
        assert_eq!(keys, ["s3bench/a", "s3bench/b"]);

        let missing: Vec<String> = backend.list_objects("nothing/").try_collect().await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn health_check_leaves_no_object() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(&tempdir.path().join("nested"));

        backend.setup().await.unwrap();
        backend.health_check().await.unwrap();

        let keys: Vec<String> = backend.list_objects("s3bench/").try_collect().await.unwrap();
        assert!(keys.is_empty());
    }
}
