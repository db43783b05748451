// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use loraswap_runtime::config::environment_names::serving;
use loraswap_runtime::storage::key_value_store::{Manager, Selector};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::adapters::{
    AdapterCache, AdapterStore, DevicePool, Fallback, RequestDispatcher, Router, TenantId,
};
use crate::chat_template::{ChatTemplate, DEFAULT_MAX_INPUT_CHARS};
use crate::engine::InferenceRuntime;
use crate::metrics::{CacheMetrics, DispatchMetrics, Registry};

/// Default location of the serving TOML file
const DEFAULT_SERVING_CONFIG_PATH: &str = "/etc/loraswap/serving.toml";

/// Which key-value backend holds adapter records and blobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mem,
    File,
}

/// Serving configuration
/// Everything needed to wire the store, cache, router and dispatcher, plus the HTTP listener.
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone, PartialEq)]
#[builder(build_fn(private, name = "build_internal"), derive(Debug, Serialize))]
pub struct ServingConfig {
    /// Maximum number of materialized adapters, resident and loading.
    /// Set this at runtime with environment variable LORASWAP_SERVING_CACHE_CAPACITY.
    #[validate(range(min = 1))]
    #[builder(default = "4")]
    pub cache_capacity: usize,

    /// Hold a per-device lock around each inference call, for runtimes that can only
    /// apply one adapter at a time.
    #[builder(default = "true")]
    pub serialize_activation: bool,

    #[validate(range(min = 1))]
    #[builder(default = "1")]
    pub num_devices: u32,

    /// Deadline for a whole request, adapter load included
    #[validate(range(min = 1))]
    #[builder(default = "30_000")]
    pub request_timeout_ms: u64,

    /// Hint returned with capacity and timeout errors
    #[builder(default = "1")]
    pub retry_after_secs: u64,

    #[builder(default)]
    pub fallback: Fallback,

    /// Accept the `x-tenant-id` header when no API key matches
    #[builder(default = "false")]
    pub trust_tenant_header: bool,

    #[builder(default)]
    pub store: StoreKind,

    /// Root of the file store. Defaults to `LORASWAP_FILE_KV` or a temp directory.
    #[builder(default = "None")]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub store_path: Option<PathBuf>,

    #[builder(setter(into), default = "String::from(\"0.0.0.0\")")]
    pub http_host: String,

    #[builder(default = "8080")]
    pub http_port: u16,

    /// User input beyond this many characters is dropped before templating
    #[validate(range(min = 1))]
    #[builder(default = "DEFAULT_MAX_INPUT_CHARS")]
    pub max_input_chars: usize,

    /// API key to tenant
    #[builder(default)]
    pub api_keys: BTreeMap<String, TenantId>,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4,
            serialize_activation: true,
            num_devices: 1,
            request_timeout_ms: 30_000,
            retry_after_secs: 1,
            fallback: Fallback::Reject,
            trust_tenant_header: false,
            store: StoreKind::Mem,
            store_path: None,
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            api_keys: BTreeMap::new(),
        }
    }
}

impl ServingConfig {
    pub fn builder() -> ServingConfigBuilder {
        ServingConfigBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(ServingConfig::default()))
            .merge(Toml::file(DEFAULT_SERVING_CONFIG_PATH));
        if let Ok(path) = std::env::var(serving::LORASWAP_CONFIG_PATH) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(serving::PREFIX).filter_map(|k| {
            let full_key = format!("{}{}", serving::PREFIX, k.as_str());
            // filters out empty environment variables
            match std::env::var(&full_key) {
                Ok(v) if !v.is_empty() => Some(k.into()),
                _ => None,
            }
        }))
    }

    /// Load the serving configuration from the environment and configuration files
    /// Configuration is prioritized in the following order, where the last has the lowest priority:
    /// 1. Environment variables prefixed with `LORASWAP_SERVING_` (top priority)
    /// 2. The TOML file named by `LORASWAP_CONFIG_PATH`
    /// 3. /etc/loraswap/serving.toml
    /// 4. Defaults
    pub fn from_settings() -> Result<ServingConfig> {
        let config: ServingConfig = Self::figment()
            .extract()
            .context("invalid serving configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    pub fn store_selector(&self) -> Result<Selector> {
        Ok(match (self.store, &self.store_path) {
            (StoreKind::Mem, _) => Selector::Memory,
            (StoreKind::File, Some(path)) => Selector::File(path.clone()),
            (StoreKind::File, None) => "file".parse()?,
        })
    }

    pub fn open_store(&self) -> Result<AdapterStore> {
        let selector = self.store_selector()?;
        tracing::debug!(store = %selector, "opening adapter store");
        Ok(AdapterStore::new(Manager::from_selector(selector)))
    }

    pub fn router(&self) -> Router {
        Router::with_keys(
            self.trust_tenant_header,
            self.api_keys
                .iter()
                .map(|(key, tenant)| (key.clone(), tenant.clone())),
        )
    }

    /// Wire a dispatcher over `store`. Cache and dispatch metrics are registered on
    /// `registry` when one is given.
    pub fn build_dispatcher(
        &self,
        store: AdapterStore,
        runtime: Arc<dyn InferenceRuntime>,
        registry: Option<&Registry>,
    ) -> Result<RequestDispatcher> {
        let capacity =
            NonZeroUsize::new(self.cache_capacity).context("cache_capacity must be at least 1")?;

        let (cache_metrics, dispatch_metrics) = match registry {
            Some(registry) => {
                let cache_metrics = CacheMetrics::new()?;
                cache_metrics.register(registry)?;
                let dispatch_metrics = Arc::new(DispatchMetrics::new()?);
                dispatch_metrics.register(registry)?;
                (Some(cache_metrics), Some(dispatch_metrics))
            }
            None => (None, None),
        };

        let cache = AdapterCache::with_options(
            Arc::new(store),
            capacity,
            self.retry_after(),
            cache_metrics,
        );
        let mut builder = RequestDispatcher::builder()
            .router(self.router())
            .cache(cache)
            .runtime(runtime)
            .devices(DevicePool::new(self.num_devices, self.serialize_activation))
            .template(ChatTemplate::new(self.max_input_chars))
            .fallback(self.fallback)
            .request_timeout(self.request_timeout())
            .retry_after(self.retry_after());
        if let Some(metrics) = dispatch_metrics {
            builder = builder.metrics(metrics);
        }
        builder.build()
    }
}

impl ServingConfigBuilder {
    /// Build and validate the serving configuration
    pub fn build(&self) -> Result<ServingConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}
