// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::cache::DEFAULT_RETRY_AFTER;
use super::{
    AdapterCache, AdapterError, AdapterHandle, DeviceId, DevicePool, RequestMeta, Router, TenantId,
};
use crate::chat_template::ChatTemplate;
use crate::engine::{Activation, GenerationParams, InferenceRuntime};
use crate::metrics::{DispatchMetrics, Status};

/// Default bound on a whole dispatch, adapter load included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when a request has no usable adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Return the routing or lookup error to the caller
    #[default]
    Reject,
    /// Serve the request from the base model with no adapter active
    Base,
}

impl FromStr for Fallback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Fallback::Reject),
            "base" => Ok(Fallback::Base),
            other => anyhow::bail!("Unknown fallback '{other}', expected 'reject' or 'base'"),
        }
    }
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Reject => write!(f, "reject"),
            Fallback::Base => write!(f, "base"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub meta: RequestMeta,
    /// The user's input, before templating
    pub prompt: String,
    pub params: GenerationParams,
}

impl InferenceRequest {
    pub fn new(meta: RequestMeta, prompt: impl Into<String>) -> Self {
        Self {
            meta,
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub request_id: String,
    /// Tenant whose adapter was active, None when the base model answered
    pub tenant_id: Option<TenantId>,
    pub adapter_version: Option<u64>,
    pub device: DeviceId,
    /// The assistant's reply, extracted from the raw completion
    pub text: String,
}

/// Runs one request end to end: route, pin the adapter, generate on a device, release.
#[derive(Builder)]
#[builder(pattern = "owned", build_fn(private, name = "build_internal"))]
pub struct RequestDispatcher {
    router: Router,

    cache: AdapterCache,

    runtime: Arc<dyn InferenceRuntime>,

    #[builder(default = "DevicePool::new(1, false)")]
    devices: DevicePool,

    #[builder(default)]
    template: ChatTemplate,

    #[builder(default)]
    fallback: Fallback,

    #[builder(default = "DEFAULT_REQUEST_TIMEOUT")]
    request_timeout: Duration,

    #[builder(default = "DEFAULT_RETRY_AFTER")]
    retry_after: Duration,

    #[builder(default, setter(strip_option))]
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RequestDispatcherBuilder {
    pub fn build(self) -> anyhow::Result<RequestDispatcher> {
        let dispatcher = self.build_internal()?;
        if dispatcher.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than zero");
        }
        Ok(dispatcher)
    }
}

impl RequestDispatcher {
    pub fn builder() -> RequestDispatcherBuilder {
        RequestDispatcherBuilder::default()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cache(&self) -> &AdapterCache {
        &self.cache
    }

    pub fn devices(&self) -> &DevicePool {
        &self.devices
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    /// Serve one request. The whole call is bounded by the request timeout; when it
    /// fires the in-flight work is dropped, which also releases any pinned adapter.
    pub async fn dispatch(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, AdapterError> {
        let mut inflight = self.metrics.as_ref().map(|m| m.create_inflight_guard());
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("dispatch", request_id = %request_id);

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.dispatch_inner(request, request_id).instrument(span),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout = %humantime::format_duration(self.request_timeout),
                    "request timed out"
                );
                Err(AdapterError::Timeout {
                    after: self.request_timeout,
                    retry_after: self.retry_after,
                })
            }
        };

        if let Some(guard) = inflight.as_mut() {
            guard.mark(match &result {
                Ok(response) if response.tenant_id.is_none() => Status::Fallback,
                Ok(_) => Status::Success,
                Err(_) => Status::Error,
            });
        }
        result
    }

    async fn dispatch_inner(
        &self,
        request: InferenceRequest,
        request_id: String,
    ) -> Result<InferenceResponse, AdapterError> {
        let handle = match self.resolve(&request.meta).await {
            Ok(handle) => Some(handle),
            Err(err) if err.is_recoverable() && self.fallback == Fallback::Base => {
                tracing::info!(%err, "no adapter for request, serving base model");
                None
            }
            Err(err) => return Err(err),
        };

        let activation = match &handle {
            Some(handle) => Activation::Adapter(handle.adapter()),
            None => Activation::BaseOnly,
        };
        let device = self.devices.select(activation.tenant_id());
        let prompt = self.template.format_prompt(&request.prompt);

        let output = {
            let _active = self.devices.enter(device).await;
            tracing::debug!(device = device.id(), activation = %activation.label(), "generating");
            self.runtime
                .generate(device.id(), &prompt, &request.params, activation)
                .await
        };

        let tenant_id = handle.as_ref().map(|h| h.tenant_id().clone());
        let adapter_version = handle.as_ref().map(AdapterHandle::version);
        drop(handle);

        let output = output.map_err(|err| self.runtime_failure(format!("{err:#}")))?;
        let text = ChatTemplate::extract_reply(&output)
            .ok_or_else(|| self.runtime_failure("completion has no assistant turn"))?
            .to_string();

        Ok(InferenceResponse {
            request_id,
            tenant_id,
            adapter_version,
            device: device.id(),
            text,
        })
    }

    fn runtime_failure(&self, message: impl std::fmt::Display) -> AdapterError {
        AdapterError::runtime(message, self.retry_after)
    }

    async fn resolve(&self, meta: &RequestMeta) -> Result<AdapterHandle, AdapterError> {
        let tenant_id = self.router.route(meta)?;
        self.cache.acquire(&tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterStore;
    use crate::engine::EchoRuntime;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::num::NonZeroUsize;

    struct NoTemplateRuntime;

    #[async_trait]
    impl InferenceRuntime for NoTemplateRuntime {
        async fn generate(
            &self,
            _device: DeviceId,
            _prompt: &str,
            _params: &GenerationParams,
            _activation: Activation<'_>,
        ) -> anyhow::Result<String> {
            Ok("just text".to_string())
        }
    }

    async fn dispatcher(
        runtime: Arc<dyn InferenceRuntime>,
        fallback: Fallback,
    ) -> RequestDispatcher {
        let store = AdapterStore::default();
        let acme: TenantId = "acme".parse().unwrap();
        store.put(&acme, Bytes::from_static(b"w"), 2).await.unwrap();
        let cache = AdapterCache::new(Arc::new(store), NonZeroUsize::new(1).unwrap());
        let router = Router::with_keys(false, [("key-acme".to_string(), acme)]);
        RequestDispatcher::builder()
            .router(router)
            .cache(cache)
            .runtime(runtime)
            .fallback(fallback)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_with_adapter() {
        let dispatcher = dispatcher(Arc::new(EchoRuntime::new()), Fallback::Reject).await;
        let response = dispatcher
            .dispatch(InferenceRequest::new(
                RequestMeta::with_api_key("key-acme"),
                "is water wet",
            ))
            .await
            .unwrap();
        assert_eq!(response.text, "[acme@v2] is water wet");
        assert_eq!(response.adapter_version, Some(2));
        assert_eq!(response.device, 0);
        assert_eq!(dispatcher.cache().stats().pinned, 0);
    }

    #[tokio::test]
    async fn test_reject_unknown_tenant() {
        let dispatcher = dispatcher(Arc::new(EchoRuntime::new()), Fallback::Reject).await;
        let err = dispatcher
            .dispatch(InferenceRequest::new(RequestMeta::default(), "hi"))
            .await
            .unwrap_err();
        assert_matches!(err, AdapterError::UnknownTenant);
    }

    #[tokio::test]
    async fn test_base_fallback() {
        let dispatcher = dispatcher(Arc::new(EchoRuntime::new()), Fallback::Base).await;
        let response = dispatcher
            .dispatch(InferenceRequest::new(RequestMeta::with_api_key("nope"), "hi"))
            .await
            .unwrap();
        assert_eq!(response.tenant_id, None);
        assert_eq!(response.text, "[base] hi");
    }

    #[tokio::test]
    async fn test_missing_assistant_turn_is_runtime_failure() {
        let dispatcher = dispatcher(Arc::new(NoTemplateRuntime), Fallback::Reject).await;
        let err = dispatcher
            .dispatch(InferenceRequest::new(
                RequestMeta::with_api_key("key-acme"),
                "hi",
            ))
            .await
            .unwrap_err();
        assert_matches!(err, AdapterError::RuntimeFailure { .. });
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER));
        assert_eq!(dispatcher.cache().stats().pinned, 0);
    }

    #[test]
    fn test_fallback_parse() {
        assert_eq!("base".parse::<Fallback>().unwrap(), Fallback::Base);
        assert_eq!("Reject".parse::<Fallback>().unwrap(), Fallback::Reject);
        assert!("maybe".parse::<Fallback>().is_err());
        assert_eq!(Fallback::Base.to_string(), "base");
    }

    #[test]
    fn test_builder_requires_parts() {
        assert!(RequestDispatcher::builder().build().is_err());
    }
}
