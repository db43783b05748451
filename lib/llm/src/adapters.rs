// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Adapter registry and serving path
//!
//! [`AdapterStore`] is the source of truth for each tenant's adapter, [`AdapterCache`]
//! keeps a bounded set of them materialized, [`Router`] maps request metadata to a
//! tenant and [`RequestDispatcher`] ties these together around one inference call.

mod cache;
pub mod devices;
mod dispatcher;
mod error;
mod evictor;
mod record;
mod router;
mod source;
mod store;
mod tenant;

pub use cache::{AdapterCache, AdapterHandle, CacheStats};
pub use devices::{DeviceId, DevicePool, RendezvousHasher};
pub use dispatcher::{
    Fallback, InferenceRequest, InferenceResponse, RequestDispatcher, RequestDispatcherBuilder,
};
pub use error::AdapterError;
pub use evictor::{LRUEvictor, Recency};
pub use record::{AdapterRecord, BlobRef, LoadedAdapter};
pub use router::{API_KEY_HEADER, RequestMeta, Router, TENANT_HEADER};
pub use source::AdapterSource;
pub use store::AdapterStore;
pub use tenant::TenantId;
