// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # loraswap LLM
//!
//! Per-tenant LoRA adapter registry, bounded adapter cache and request dispatch
//! over a single shared base model.

pub mod adapters;
pub mod chat_template;
pub mod config;
pub mod engine;
pub mod http;
pub mod metrics;

pub use adapters::{
    AdapterCache, AdapterError, AdapterHandle, AdapterRecord, AdapterSource, AdapterStore,
    LoadedAdapter, RequestDispatcher, Router, TenantId,
};
pub use config::ServingConfig;
