// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # HTTP Service
//!
//! | route | handler |
//! |---|---|
//! | `GET /health`, `GET /live` | [`health`] |
//! | `GET /metrics` | [`metrics`] |
//! | `GET /v1/adapters`, `GET/PUT/DELETE /v1/adapters/{tenant}` | [`adapters`] |
//! | `POST /v1/generate` | [`generate`] |

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use derive_builder::Builder;
use loraswap_runtime::CancellationToken;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::adapters::{AdapterError, AdapterStore, RequestDispatcher};
use crate::metrics::Registry;

pub mod adapters;
pub mod generate;
pub mod health;
pub mod metrics;

/// Documentation for a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDoc {
    method: Method,
    path: String,
}

impl RouteDoc {
    pub fn new<T: Into<String>>(method: Method, path: T) -> Self {
        RouteDoc {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Error body returned by every route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors a handler can return
#[derive(Debug)]
pub enum ApiError {
    Adapter(AdapterError),
    BadRequest(String),
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        ApiError::Adapter(err)
    }
}

/// Status code for each adapter error kind
pub fn status_code(err: &AdapterError) -> StatusCode {
    match err {
        AdapterError::NotFound { .. } => StatusCode::NOT_FOUND,
        AdapterError::UnknownTenant => StatusCode::UNAUTHORIZED,
        AdapterError::CapacityExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AdapterError::RuntimeFailure { .. } => StatusCode::BAD_GATEWAY,
        AdapterError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AdapterError::StaleVersion { .. } | AdapterError::VersionConflict { .. } => {
            StatusCode::CONFLICT
        }
        AdapterError::InvalidTenant(..) => StatusCode::BAD_REQUEST,
        AdapterError::CorruptBlob { .. } | AdapterError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            ApiError::Adapter(err) => (status_code(&err), err.to_string(), err.retry_after()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
        };
        if status.is_server_error() {
            tracing::warn!(%status, error = %message, "request failed");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();
        if let Some(retry_after) = retry_after {
            // Retry-After is whole seconds, round up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

/// Shared by every handler
pub struct State {
    store: AdapterStore,
    dispatcher: Arc<RequestDispatcher>,
}

impl State {
    pub fn new(store: AdapterStore, dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &AdapterStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }
}

#[derive(Clone)]
pub struct HttpService {
    state: Arc<State>,
    router: axum::Router,
    port: u16,
    host: String,
    route_docs: Vec<RouteDoc>,
}

#[derive(Clone, Builder)]
#[builder(pattern = "owned", build_fn(private, name = "build_internal"))]
pub struct HttpServiceConfig {
    #[builder(default = "8080")]
    port: u16,

    #[builder(setter(into), default = "String::from(\"0.0.0.0\")")]
    host: String,

    store: AdapterStore,

    dispatcher: Arc<RequestDispatcher>,

    /// Registry rendered on `/metrics`, normally the one the dispatcher's metrics live on
    #[builder(default)]
    registry: Registry,
}

impl HttpService {
    pub fn builder() -> HttpServiceConfigBuilder {
        HttpServiceConfigBuilder::default()
    }

    pub fn state_clone(&self) -> Arc<State> {
        self.state.clone()
    }

    pub fn state(&self) -> &State {
        Arc::as_ref(&self.state)
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    pub fn route_docs(&self) -> &[RouteDoc] {
        &self.route_docs
    }

    pub async fn spawn(&self, cancel_token: CancellationToken) -> JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(cancel_token).await })
    }

    pub async fn run(&self, cancel_token: CancellationToken) -> Result<()> {
        let address = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address {address}: {e}"))?;
        self.run_on(listener, cancel_token).await
    }

    /// Serve on an already bound listener until `cancel_token` is cancelled
    pub async fn run_on(
        &self,
        listener: TcpListener,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let address = listener.local_addr()?;
        tracing::info!(%address, "Starting HTTP service");
        for doc in &self.route_docs {
            tracing::debug!(route = %doc, "serving");
        }

        let observer = cancel_token.child_token();
        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(observer.cancelled_owned())
            .await
            .inspect_err(|_| cancel_token.cancel())?;
        Ok(())
    }
}

impl HttpServiceConfigBuilder {
    pub fn build(self) -> Result<HttpService> {
        let config: HttpServiceConfig = self.build_internal()?;
        let state = Arc::new(State::new(config.store, config.dispatcher));

        let mut router = axum::Router::new();
        let mut all_docs = Vec::new();
        let routes = vec![
            health::health_check_router(state.clone(), None),
            health::live_check_router(state.clone(), None),
            metrics::router(config.registry, None),
            adapters::router(state.clone(), None),
            generate::router(state.clone(), None),
        ];
        for (route_docs, route) in routes {
            router = router.merge(route);
            all_docs.extend(route_docs);
        }

        Ok(HttpService {
            state,
            router,
            port: config.port,
            host: config.host,
            route_docs: all_docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AdapterError::NotFound { tenant: "a".into() }, 404),
            (AdapterError::UnknownTenant, 401),
            (
                AdapterError::CapacityExhausted {
                    capacity: 1,
                    retry_after: Duration::from_secs(1),
                },
                503,
            ),
            (AdapterError::runtime("x", Duration::from_secs(1)), 502),
            (
                AdapterError::Timeout {
                    after: Duration::from_secs(1),
                    retry_after: Duration::from_secs(1),
                },
                504,
            ),
            (
                AdapterError::VersionConflict {
                    tenant: "a".into(),
                    version: 1,
                },
                409,
            ),
            (AdapterError::InvalidTenant("a/b".into(), "tenant id contains '/'"), 400),
        ];
        for (err, code) in cases {
            assert_eq!(status_code(&err).as_u16(), code, "{err}");
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let response = ApiError::from(AdapterError::Timeout {
            after: Duration::from_secs(2),
            retry_after: Duration::from_millis(1500),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_route_doc_display() {
        assert_eq!(
            RouteDoc::new(Method::PUT, "/v1/adapters/{tenant}").to_string(),
            "PUT /v1/adapters/{tenant}"
        );
    }
}
