// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use loraswap_runtime::storage::key_value_store::Versioned;
use serde::{Deserialize, Serialize};

use super::TenantId;

/// Where an adapter's weights live in the blob bucket, and their blake3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub key: String,
    pub checksum: String,
}

/// Metadata for one tenant's current adapter.
///
/// `blob`, `version` and `size_bytes` never change once stored; a new version replaces
/// the whole record. `last_used` is advisory and refreshed when the adapter is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRecord {
    pub tenant_id: TenantId,
    pub blob: BlobRef,
    pub version: u64,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,

    /// Write counter for the storage backend. Bumped by every put and touch.
    #[serde(default)]
    pub revision: u64,
}

impl Versioned for AdapterRecord {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn set_revision(&mut self, r: u64) {
        self.revision = r;
    }
}

/// An adapter materialized in memory, with weights already checked against the record.
#[derive(Debug, Clone, Getters)]
pub struct LoadedAdapter {
    record: AdapterRecord,
    weights: Bytes,
}

impl LoadedAdapter {
    pub fn new(record: AdapterRecord, weights: Bytes) -> Self {
        Self { record, weights }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.record.tenant_id
    }

    pub fn version(&self) -> u64 {
        self.record.version
    }
}
