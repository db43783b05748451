// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dashmap::DashMap;

use super::{AdapterError, TenantId};

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the tenant directly, honoured only when trusted
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The parts of a request the router looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub api_key: Option<String>,
    pub tenant_header: Option<String>,
}

impl RequestMeta {
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            tenant_header: None,
        }
    }

    pub fn with_tenant_header(tenant: impl Into<String>) -> Self {
        Self {
            api_key: None,
            tenant_header: Some(tenant.into()),
        }
    }
}

/// Maps request metadata to a tenant.
///
/// The API key table is checked first. The tenant header is only consulted when
/// `trust_tenant_header` is set, e.g. behind a gateway that already authenticated the caller.
#[derive(Clone, Debug, Default)]
pub struct Router {
    keys: Arc<DashMap<String, TenantId>>,
    trust_tenant_header: bool,
}

impl Router {
    pub fn new(trust_tenant_header: bool) -> Self {
        Self {
            keys: Arc::new(DashMap::new()),
            trust_tenant_header,
        }
    }

    pub fn with_keys(
        trust_tenant_header: bool,
        keys: impl IntoIterator<Item = (String, TenantId)>,
    ) -> Self {
        let router = Self::new(trust_tenant_header);
        for (key, tenant_id) in keys {
            router.register_key(key, tenant_id);
        }
        router
    }

    pub fn route(&self, meta: &RequestMeta) -> Result<TenantId, AdapterError> {
        if let Some(key) = &meta.api_key {
            if let Some(tenant_id) = self.keys.get(key) {
                return Ok(tenant_id.clone());
            }
        }
        if self.trust_tenant_header {
            if let Some(header) = &meta.tenant_header {
                return header.parse().map_err(|_| AdapterError::UnknownTenant);
            }
        }
        Err(AdapterError::UnknownTenant)
    }

    /// Map `key` to `tenant_id`, returning the tenant it previously mapped to
    pub fn register_key(&self, key: impl Into<String>, tenant_id: TenantId) -> Option<TenantId> {
        self.keys.insert(key.into(), tenant_id)
    }

    pub fn revoke_key(&self, key: &str) -> Option<TenantId> {
        self.keys.remove(key).map(|(_, tenant_id)| tenant_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn trust_tenant_header(&self) -> bool {
        self.trust_tenant_header
    }
}
