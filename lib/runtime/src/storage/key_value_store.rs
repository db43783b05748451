// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interface to a simple bucketed key-value store.
//! "key_value_store" spelt out because in AI land "KV" means something else.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::{env, fmt};

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, percent_encode};
use serde::{Deserialize, Serialize};

mod mem;
pub use mem::MemoryStore;
mod file;
pub use file::FileStore;

/// Root directory used by `Selector::from_str("file")` when no path is configured
pub const FILE_STORE_ROOT_ENV: &str = "LORASWAP_FILE_KV";

/// String we use as the Key in a key-value storage operation. Simple String wrapper
/// that can encode / decode a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn new(s: String) -> Key {
        Key(s)
    }

    /// Takes a URL-safe percent-encoded string and creates a Key from it by decoding first.
    /// adapters%2Facme becomes adapters/acme
    pub fn from_url_safe(s: &str) -> Key {
        Key(percent_decode_str(s).decode_utf8_lossy().to_string())
    }

    /// A URL-safe percent-encoded representation of this key.
    /// e.g. adapters/acme becomes adapters%2Facme
    pub fn url_safe(&self) -> Cow<'_, str> {
        percent_encode(self.0.as_bytes(), NON_ALPHANUMERIC).into()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::new(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Key {
        Key::new(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&Key> for String {
    fn from(k: &Key) -> String {
        k.0.clone()
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_or_create_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Box<dyn KeyValueBucket>, StoreError>;

    async fn get_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Option<Box<dyn KeyValueBucket>>, StoreError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selector {
    File(PathBuf),
    #[default]
    Memory,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::File(path) => write!(f, "File({})", path.display()),
            Selector::Memory => write!(f, "Memory"),
        }
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Selector> {
        match s {
            "file" => {
                let root = env::var(FILE_STORE_ROOT_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| env::temp_dir().join("loraswap_store_kv"));
                Ok(Self::File(root))
            }
            "mem" => Ok(Self::Memory),
            x => anyhow::bail!("Unknown key-value store type '{x}'"),
        }
    }
}

impl TryFrom<String> for Selector {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Selector> {
        s.parse()
    }
}

enum KeyValueStoreEnum {
    Memory(MemoryStore),
    File(FileStore),
}

impl KeyValueStoreEnum {
    fn as_store(&self) -> &dyn KeyValueStore {
        match self {
            KeyValueStoreEnum::Memory(x) => x,
            KeyValueStoreEnum::File(x) => x,
        }
    }
}

/// Cloneable handle over the selected backend
#[derive(Clone)]
pub struct Manager(Arc<KeyValueStoreEnum>);

impl Default for Manager {
    fn default() -> Self {
        Manager::memory()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            KeyValueStoreEnum::Memory(_) => write!(f, "Manager(Memory)"),
            KeyValueStoreEnum::File(fs) => write!(f, "Manager(File({}))", fs.root().display()),
        }
    }
}

impl Manager {
    /// In-memory KeyValueStoreManager for testing
    pub fn memory() -> Self {
        Self::new(KeyValueStoreEnum::Memory(MemoryStore::new()))
    }

    pub fn file<P: Into<PathBuf>>(root: P) -> Self {
        Self::new(KeyValueStoreEnum::File(FileStore::new(root)))
    }

    pub fn from_selector(selector: Selector) -> Self {
        match selector {
            Selector::Memory => Self::memory(),
            Selector::File(root) => Self::file(root),
        }
    }

    fn new(s: KeyValueStoreEnum) -> Manager {
        Manager(Arc::new(s))
    }

    pub async fn get_or_create_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Box<dyn KeyValueBucket>, StoreError> {
        self.0.as_store().get_or_create_bucket(bucket_name).await
    }

    pub async fn get_bucket(
        &self,
        bucket_name: &str,
    ) -> Result<Option<Box<dyn KeyValueBucket>>, StoreError> {
        self.0.as_store().get_bucket(bucket_name).await
    }

    /// Deserialize the JSON value stored under `key`, if any
    pub async fn load<T: for<'a> Deserialize<'a>>(
        &self,
        bucket: &str,
        key: &Key,
    ) -> Result<Option<T>, StoreError> {
        let Some(bucket) = self.get_bucket(bucket).await? else {
            // No bucket means no values
            return Ok(None);
        };
        Ok(match bucket.get(key).await? {
            Some(bytes) => Some(serde_json::from_slice(bytes.as_ref())?),
            None => None,
        })
    }

    /// Deserialize every JSON value in the bucket, ordered by key
    pub async fn load_all<T: for<'a> Deserialize<'a>>(
        &self,
        bucket: &str,
    ) -> Result<Vec<(Key, T)>, StoreError> {
        let Some(bucket) = self.get_bucket(bucket).await? else {
            return Ok(vec![]);
        };
        let mut out = bucket
            .entries()
            .await?
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_slice(v.as_ref())?)))
            .collect::<Result<Vec<(Key, T)>, StoreError>>()?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Serialize `obj` as JSON and store it under `key` at the object's revision
    pub async fn publish<T: Serialize + Versioned + Send + Sync>(
        &self,
        bucket_name: &str,
        key: &Key,
        obj: &T,
    ) -> Result<StoreOutcome, StoreError> {
        let obj_json = serde_json::to_vec(obj)?;
        let bucket = self.get_or_create_bucket(bucket_name).await?;
        bucket.insert(key, obj_json.into(), obj.revision()).await
    }
}

/// An online storage for key-value config values.
#[async_trait]
pub trait KeyValueBucket: Send + Sync {
    /// A bucket is a collection of key/value pairs.
    /// Insert a value into a bucket, replacing any value stored at a different revision.
    /// The Key should be the name of the item, not including the bucket name.
    async fn insert(
        &self,
        key: &Key,
        value: bytes::Bytes,
        revision: u64,
    ) -> Result<StoreOutcome, StoreError>;

    /// Fetch an item from the key-value storage
    async fn get(&self, key: &Key) -> Result<Option<bytes::Bytes>, StoreError>;

    /// Delete an item from the bucket
    async fn delete(&self, key: &Key) -> Result<(), StoreError>;

    /// The entries in this bucket, keyed by item name.
    async fn entries(&self) -> Result<HashMap<Key, bytes::Bytes>, StoreError>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreOutcome {
    /// The operation succeeded and created a new entry with this revision.
    /// Note that "create" also means update, because each new revision is a "create".
    Created(u64),
    /// The operation did not do anything, the value was already present, with this revision.
    Exists(u64),
}

impl fmt::Display for StoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOutcome::Created(revision) => write!(f, "Created at {revision}"),
            StoreOutcome::Exists(revision) => write!(f, "Exists at {revision}"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Could not find bucket '{0}'")]
    MissingBucket(String),

    #[error("Could not find key '{0}'")]
    MissingKey(String),

    #[error("Internal filesystem error: {0}")]
    FilesystemError(String),

    #[error("Error decoding bytes: {0}")]
    JSONDecodeError(#[from] serde_json::error::Error),
}

/// A trait allowing to get/set a revision on an object.
pub trait Versioned {
    fn revision(&self) -> u64;
    fn set_revision(&mut self, r: u64);
}
