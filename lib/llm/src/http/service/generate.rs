// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! `POST /v1/generate`
//!
//! The tenant is taken from the `x-api-key` header, or from `x-tenant-id` when the
//! service trusts it.
//!
//! ```json
//! // Request
//! {"prompt": "Is the moon made of cheese?", "max_new_tokens": 64}
//! // Response
//! {"request_id": "...", "tenant_id": "acme", "adapter_version": 3, "device": 0, "text": "..."}
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State as AxumState,
    http::{HeaderMap, Method},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, RouteDoc, State};
use crate::adapters::{API_KEY_HEADER, InferenceRequest, RequestMeta, TENANT_HEADER};
use crate::engine::GenerationParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GenerateRequest {
    fn params(&self) -> GenerationParams {
        let defaults = GenerationParams::default();
        GenerationParams {
            max_new_tokens: self.max_new_tokens.unwrap_or(defaults.max_new_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        }
    }
}

pub fn router(state: Arc<State>, path: Option<String>) -> (Vec<RouteDoc>, Router) {
    let path = path.unwrap_or_else(|| "/v1/generate".to_string());
    let docs = vec![RouteDoc::new(Method::POST, &path)];
    let router = Router::new()
        .route(&path, post(generate))
        .with_state(state);
    (docs, router)
}

/// Pull the routing headers out of a request
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    RequestMeta {
        api_key: header(API_KEY_HEADER),
        tenant_header: header(TENANT_HEADER),
    }
}

async fn generate(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    Json(body): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let params = body.params();
    params
        .validate()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt is empty".to_string()));
    }

    let request = InferenceRequest {
        meta: request_meta(&headers),
        prompt: body.prompt,
        params,
    };
    let response = state.dispatcher().dispatch(request).await?;
    Ok(Json(response))
}
