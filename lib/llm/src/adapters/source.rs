// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use super::{AdapterError, AdapterStore, LoadedAdapter, TenantId};

/// Where [`super::AdapterCache`] materializes adapters from on a miss.
/// Implement this for custom backends or to instrument loads in tests.
#[async_trait]
pub trait AdapterSource: Send + Sync {
    /// Fetch and verify the tenant's current adapter
    async fn load(&self, tenant_id: &TenantId) -> Result<LoadedAdapter, AdapterError>;
}

#[async_trait]
impl AdapterSource for AdapterStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<LoadedAdapter, AdapterError> {
        let (record, weights) = self.read_current(tenant_id).await?;
        if let Err(err) = self.touch(tenant_id).await {
            tracing::debug!(tenant = %tenant_id, %err, "could not refresh last_used");
        }
        Ok(LoadedAdapter::new(record, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_store_as_source() {
        let store = AdapterStore::default();
        let acme: TenantId = "acme".parse().unwrap();
        store.put(&acme, Bytes::from_static(b"weights"), 7).await.unwrap();

        let loaded = store.load(&acme).await.unwrap();
        assert_eq!(loaded.version(), 7);
        assert_eq!(loaded.weights().as_ref(), b"weights");
        assert!(store.get(&acme).await.unwrap().last_used.is_some());

        let missing: TenantId = "nobody".parse().unwrap();
        assert!(matches!(
            store.load(&missing).await,
            Err(AdapterError::NotFound { .. })
        ));
    }
}
