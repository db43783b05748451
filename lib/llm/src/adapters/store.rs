// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use loraswap_runtime::storage::key_value_store::{Key, Manager, StoreError};
use tokio::sync::Mutex;

use super::{AdapterError, AdapterRecord, BlobRef, TenantId};

/// Bucket holding one JSON [`AdapterRecord`] per tenant
pub const RECORDS_BUCKET: &str = "v1/adapters/records";

/// Bucket holding raw adapter weights, one entry per stored version
pub const BLOBS_BUCKET: &str = "v1/adapters/blobs";

/// Durable registry of each tenant's current adapter.
///
/// Reads go straight to the backend. Writes for all tenants are serialized so the
/// version check and the record update happen as one step.
#[derive(Clone)]
pub struct AdapterStore {
    kv: Manager,
    write_lock: Arc<Mutex<()>>,
}

impl Default for AdapterStore {
    fn default() -> Self {
        Self::new(Manager::memory())
    }
}

impl std::fmt::Debug for AdapterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterStore").field("kv", &self.kv).finish()
    }
}

fn record_key(tenant_id: &TenantId) -> Key {
    Key::from(tenant_id.as_str())
}

fn blob_key(tenant_id: &TenantId, version: u64) -> String {
    format!("{tenant_id}.v{version}")
}

fn checksum(blob: &[u8]) -> String {
    blake3::hash(blob).to_hex().to_string()
}

impl AdapterStore {
    pub fn new(kv: Manager) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store `blob` as `tenant_id`'s adapter at `version`.
    ///
    /// A higher version replaces the stored one and removes its blob. Re-sending the
    /// stored version with the same contents returns the stored record unchanged.
    pub async fn put(
        &self,
        tenant_id: &TenantId,
        blob: Bytes,
        version: u64,
    ) -> Result<AdapterRecord, AdapterError> {
        let digest = checksum(&blob);
        let _guard = self.write_lock.lock().await;

        let current: Option<AdapterRecord> =
            self.kv.load(RECORDS_BUCKET, &record_key(tenant_id)).await?;
        if let Some(current) = &current {
            if version < current.version {
                return Err(AdapterError::StaleVersion {
                    tenant: tenant_id.to_string(),
                    attempted: version,
                    current: current.version,
                });
            }
            if version == current.version {
                if current.blob.checksum == digest {
                    return Ok(current.clone());
                }
                return Err(AdapterError::VersionConflict {
                    tenant: tenant_id.to_string(),
                    version,
                });
            }
        }

        let blob_ref = BlobRef {
            key: blob_key(tenant_id, version),
            checksum: digest,
        };
        let size_bytes = blob.len() as u64;
        self.kv
            .get_or_create_bucket(BLOBS_BUCKET)
            .await?
            .insert(&Key::from(blob_ref.key.as_str()), blob, version)
            .await?;

        let record = AdapterRecord {
            tenant_id: tenant_id.clone(),
            blob: blob_ref,
            version,
            size_bytes,
            created_at: Utc::now(),
            last_used: None,
            revision: current.as_ref().map(|r| r.revision + 1).unwrap_or(0),
        };
        self.kv
            .publish(RECORDS_BUCKET, &record_key(tenant_id), &record)
            .await?;

        if let Some(previous) = current {
            // The record already points at the new blob, a leftover is only wasted space
            if let Err(err) = self.delete_blob(&previous.blob.key).await {
                tracing::warn!(
                    tenant = %tenant_id,
                    blob = %previous.blob.key,
                    %err,
                    "failed to remove superseded adapter blob"
                );
            }
            tracing::info!(
                tenant = %tenant_id,
                from = previous.version,
                to = version,
                "adapter version superseded"
            );
        } else {
            tracing::info!(tenant = %tenant_id, version, size_bytes, "adapter stored");
        }
        Ok(record)
    }

    pub async fn get(&self, tenant_id: &TenantId) -> Result<AdapterRecord, AdapterError> {
        self.kv
            .load(RECORDS_BUCKET, &record_key(tenant_id))
            .await?
            .ok_or_else(|| AdapterError::NotFound {
                tenant: tenant_id.to_string(),
            })
    }

    /// All stored records, ordered by tenant id
    pub async fn list(&self) -> Result<Vec<AdapterRecord>, AdapterError> {
        let mut records: Vec<AdapterRecord> = self
            .kv
            .load_all::<AdapterRecord>(RECORDS_BUCKET)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        records.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(records)
    }

    /// Fetch the weights `record` points at and verify them against its checksum.
    pub async fn read_blob(&self, record: &AdapterRecord) -> Result<Bytes, AdapterError> {
        let Some(bucket) = self.kv.get_bucket(BLOBS_BUCKET).await? else {
            return Err(StoreError::MissingBucket(BLOBS_BUCKET.to_string()).into());
        };
        let blob = bucket
            .get(&Key::from(record.blob.key.as_str()))
            .await?
            .ok_or_else(|| StoreError::MissingKey(record.blob.key.clone()))?;
        if checksum(&blob) != record.blob.checksum {
            return Err(AdapterError::CorruptBlob {
                tenant: record.tenant_id.to_string(),
            });
        }
        Ok(blob)
    }

    /// The tenant's current record together with its verified weights.
    pub async fn read_current(
        &self,
        tenant_id: &TenantId,
    ) -> Result<(AdapterRecord, Bytes), AdapterError> {
        let record = self.get(tenant_id).await?;
        self.read_or_follow(record).await
    }

    /// Read `record`'s weights. When a newer `put` removed them in the meantime, follow
    /// the record once to the replacement.
    async fn read_or_follow(
        &self,
        record: AdapterRecord,
    ) -> Result<(AdapterRecord, Bytes), AdapterError> {
        let err = match self.read_blob(&record).await {
            Ok(blob) => return Ok((record, blob)),
            Err(AdapterError::Storage(err)) if matches!(*err, StoreError::MissingKey(_)) => err,
            Err(err) => return Err(err),
        };
        let latest = self.get(&record.tenant_id).await?;
        if latest.blob.key == record.blob.key {
            return Err(AdapterError::Storage(err));
        }
        tracing::debug!(
            tenant = %record.tenant_id,
            from = record.version,
            to = latest.version,
            "adapter blob superseded during read"
        );
        let blob = self.read_blob(&latest).await?;
        Ok((latest, blob))
    }

    /// Refresh `last_used` on the stored record. Version and blob are left untouched.
    pub async fn touch(&self, tenant_id: &TenantId) -> Result<AdapterRecord, AdapterError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.get(tenant_id).await?;
        record.last_used = Some(Utc::now());
        record.revision += 1;
        self.kv
            .publish(RECORDS_BUCKET, &record_key(tenant_id), &record)
            .await?;
        Ok(record)
    }

    /// Remove the tenant's record and its blob.
    pub async fn delete(&self, tenant_id: &TenantId) -> Result<AdapterRecord, AdapterError> {
        let _guard = self.write_lock.lock().await;
        let record = self.get(tenant_id).await?;
        let Some(records) = self.kv.get_bucket(RECORDS_BUCKET).await? else {
            return Err(StoreError::MissingBucket(RECORDS_BUCKET.to_string()).into());
        };
        records.delete(&record_key(tenant_id)).await?;
        self.delete_blob(&record.blob.key).await?;
        tracing::info!(tenant = %tenant_id, version = record.version, "adapter deleted");
        Ok(record)
    }

    async fn delete_blob(&self, key: &str) -> Result<(), StoreError> {
        match self.kv.get_bucket(BLOBS_BUCKET).await? {
            Some(bucket) => bucket.delete(&Key::from(key)).await,
            None => Err(StoreError::MissingBucket(BLOBS_BUCKET.to_string())),
        }
    }
}
