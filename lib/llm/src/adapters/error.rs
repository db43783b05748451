// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use loraswap_runtime::storage::key_value_store::StoreError;

/// Errors surfaced by the adapter store, cache and dispatcher.
///
/// Clone so a single failed load can be handed to every caller waiting on it.
#[derive(thiserror::Error, Debug, Clone)]
pub enum AdapterError {
    #[error("no adapter stored for tenant '{tenant}'")]
    NotFound { tenant: String },

    #[error("request does not map to a known tenant")]
    UnknownTenant,

    #[error("all {capacity} adapter slots are pinned, retry in {}", human(.retry_after))]
    CapacityExhausted {
        capacity: usize,
        retry_after: Duration,
    },

    #[error("inference runtime failed: {message}")]
    RuntimeFailure {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("request timed out after {}", human(.after))]
    Timeout {
        after: Duration,
        retry_after: Duration,
    },

    #[error("tenant '{tenant}' already has version {current}, refusing version {attempted}")]
    StaleVersion {
        tenant: String,
        attempted: u64,
        current: u64,
    },

    #[error("tenant '{tenant}' version {version} was already stored with different contents")]
    VersionConflict { tenant: String, version: u64 },

    #[error("invalid tenant id '{0}': {1}")]
    InvalidTenant(String, &'static str),

    #[error("adapter blob for tenant '{tenant}' does not match its checksum")]
    CorruptBlob { tenant: String },

    #[error("storage: {0}")]
    Storage(Arc<StoreError>),
}

impl AdapterError {
    /// Errors that a configured fallback may absorb by serving the base model.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdapterError::NotFound { .. } | AdapterError::UnknownTenant
        )
    }

    /// How long a caller should wait before retrying, for transient errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdapterError::CapacityExhausted { retry_after, .. } => Some(*retry_after),
            AdapterError::Timeout { retry_after, .. } => Some(*retry_after),
            AdapterError::RuntimeFailure { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// A transient runtime-side failure the caller may retry after `retry_after`
    pub(crate) fn runtime(err: impl std::fmt::Display, retry_after: Duration) -> Self {
        AdapterError::RuntimeFailure {
            message: err.to_string(),
            retry_after: Some(retry_after),
        }
    }
}

fn human(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        AdapterError::Storage(Arc::new(err))
    }
}
