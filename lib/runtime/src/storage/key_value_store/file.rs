// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Key, KeyValueBucket, KeyValueStore, StoreError, StoreOutcome};

/// Prefix of in-progress writes. Encoded keys never start with a dot.
const TMP_PREFIX: &str = ".tmp-";

/// A store rooted at a directory. Each bucket is a sub-directory and each key a file
/// named by the key's URL-safe encoding.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    /// Directories already opened, so we only check the filesystem once per bucket.
    active_dirs: Arc<Mutex<HashMap<PathBuf, Directory>>>,
}

impl FileStore {
    pub(super) fn new<P: Into<PathBuf>>(root_dir: P) -> Self {
        FileStore {
            root: root_dir.into(),
            active_dirs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn remember(&self, p: PathBuf) -> Directory {
        let dir = Directory { p: p.clone() };
        self.active_dirs.lock().insert(p, dir.clone());
        dir
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    /// A "bucket" is a directory
    async fn get_or_create_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Box<dyn KeyValueBucket>, StoreError> {
        let p = self.root.join(bucket_name);
        if let Some(dir) = self.active_dirs.lock().get(&p) {
            return Ok(Box::new(dir.clone()));
        };

        if tokio::fs::try_exists(&p).await.map_err(to_fs_err)? {
            if !p.is_dir() {
                return Err(StoreError::FilesystemError(
                    "Bucket name is not a directory".to_string(),
                ));
            }
        } else {
            tokio::fs::create_dir_all(&p)
                .await
                .with_context(|| p.display().to_string())
                .map_err(a_to_fs_err)?;
        }
        Ok(Box::new(self.remember(p)))
    }

    /// A "bucket" is a directory
    async fn get_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Option<Box<dyn KeyValueBucket>>, StoreError> {
        let p = self.root.join(bucket_name);
        if let Some(dir) = self.active_dirs.lock().get(&p) {
            return Ok(Some(Box::new(dir.clone())));
        };

        if !tokio::fs::try_exists(&p).await.map_err(to_fs_err)? {
            return Ok(None);
        }
        if !p.is_dir() {
            return Err(StoreError::FilesystemError(
                "Bucket name is not a directory".to_string(),
            ));
        }
        Ok(Some(Box::new(self.remember(p))))
    }
}

#[derive(Clone)]
pub struct Directory {
    p: PathBuf,
}

impl Directory {
    fn path_for(&self, key: &Key) -> PathBuf {
        self.p.join(key.url_safe().as_ref())
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.p.display())
    }
}

#[async_trait]
impl KeyValueBucket for Directory {
    /// Write a file to the directory. The filesystem keeps no revisions, so an
    /// identical value counts as already present.
    async fn insert(
        &self,
        key: &Key,
        value: bytes::Bytes,
        revision: u64,
    ) -> Result<StoreOutcome, StoreError> {
        let full_path = self.path_for(key);
        let str_path = full_path.display().to_string();

        match tokio::fs::read(&full_path).await {
            Ok(existing) if existing == value.as_ref() => {
                return Ok(StoreOutcome::Exists(revision));
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(to_fs_err(err)),
        }

        // Write then rename so readers never see a partial file
        let tmp_path = self
            .p
            .join(format!("{TMP_PREFIX}{}", key.url_safe().as_ref()));
        tokio::fs::write(&tmp_path, &value)
            .await
            .with_context(|| tmp_path.display().to_string())
            .map_err(a_to_fs_err)?;
        tokio::fs::rename(&tmp_path, &full_path)
            .await
            .context(str_path)
            .map_err(a_to_fs_err)?;
        Ok(StoreOutcome::Created(revision))
    }

    /// Read a file from the directory
    async fn get(&self, key: &Key) -> Result<Option<bytes::Bytes>, StoreError> {
        let full_path = self.path_for(key);
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(Some(data.into())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::FilesystemError(format!(
                "{}: {err}",
                full_path.display()
            ))),
        }
    }

    /// Delete a file from the directory
    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        let full_path = self.path_for(key);
        let str_path = full_path.display().to_string();
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MissingKey(str_path))
            }
            Err(err) => Err(StoreError::FilesystemError(format!("{str_path}: {err}"))),
        }
    }

    async fn entries(&self) -> Result<HashMap<Key, bytes::Bytes>, StoreError> {
        let mut contents = tokio::fs::read_dir(&self.p)
            .await
            .with_context(|| self.p.display().to_string())
            .map_err(a_to_fs_err)?;
        let mut out = HashMap::new();
        while let Some(entry) = contents.next_entry().await.map_err(to_fs_err)? {
            let path = entry.path();
            if !path.is_file() {
                tracing::warn!(
                    path = %path.display(),
                    "Unexpected entry, directory should only contain files."
                );
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with(TMP_PREFIX) {
                continue;
            }
            let data: bytes::Bytes = tokio::fs::read(&path)
                .await
                .with_context(|| path.display().to_string())
                .map_err(a_to_fs_err)?
                .into();
            out.insert(Key::from_url_safe(&file_name), data);
        }
        Ok(out)
    }
}

// For anyhow preserve the context
fn a_to_fs_err(err: anyhow::Error) -> StoreError {
    StoreError::FilesystemError(format!("{err:#}"))
}

fn to_fs_err<E: std::error::Error>(err: E) -> StoreError {
    StoreError::FilesystemError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = FileStore::new(tmp.path());

        assert!(store.get_bucket("v1/records").await?.is_none());
        let bucket = store.get_or_create_bucket("v1/records").await?;
        assert!(tmp.path().join("v1/records").is_dir());

        let key = Key::from("tenant/with slash");
        let res = bucket.insert(&key, "one".into(), 1).await?;
        assert_eq!(res, StoreOutcome::Created(1));
        let res = bucket.insert(&key, "one".into(), 1).await?;
        assert_eq!(res, StoreOutcome::Exists(1));
        let res = bucket.insert(&key, "two".into(), 2).await?;
        assert_eq!(res, StoreOutcome::Created(2));

        assert_eq!(bucket.get(&key).await?, Some(bytes::Bytes::from("two")));
        assert!(bucket.get(&"absent".into()).await?.is_none());

        let entries = bucket.entries().await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&key), Some(&bytes::Bytes::from("two")));

        bucket.delete(&key).await?;
        assert!(matches!(
            bucket.delete(&key).await,
            Err(StoreError::MissingKey(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_reopen() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        {
            let store = FileStore::new(tmp.path());
            let bucket = store.get_or_create_bucket("blobs").await?;
            bucket.insert(&"a".into(), "persisted".into(), 0).await?;
        }
        let store = FileStore::new(tmp.path());
        let bucket = store.get_bucket("blobs").await?.expect("bucket on disk");
        assert_eq!(
            bucket.get(&"a".into()).await?,
            Some(bytes::Bytes::from("persisted"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_bucket_must_be_directory() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        std::fs::write(tmp.path().join("plain"), b"x")?;
        let store = FileStore::new(tmp.path());
        assert!(matches!(
            store.get_bucket("plain").await,
            Err(StoreError::FilesystemError(_))
        ));
        Ok(())
    }
}
