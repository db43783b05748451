// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{RouteDoc, State};
use axum::{Json, Router, http::Method, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use std::sync::Arc;

pub fn health_check_router(state: Arc<State>, path: Option<String>) -> (Vec<RouteDoc>, Router) {
    let health_path = path.unwrap_or_else(|| "/health".to_string());

    let docs: Vec<RouteDoc> = vec![RouteDoc::new(Method::GET, &health_path)];

    let router = Router::new()
        .route(&health_path, get(health_handler))
        .with_state(state);

    (docs, router)
}

pub fn live_check_router(state: Arc<State>, path: Option<String>) -> (Vec<RouteDoc>, Router) {
    let live_path = path.unwrap_or_else(|| "/live".to_string());

    let docs: Vec<RouteDoc> = vec![RouteDoc::new(Method::GET, &live_path)];

    let router = Router::new()
        .route(&live_path, get(live_handler))
        .with_state(state);

    (docs, router)
}

async fn live_handler(
    axum::extract::State(_state): axum::extract::State<Arc<State>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "live",
            "message": "Service is live"
        })),
    )
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<State>>,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher();
    let stored = match state.store().list().await {
        Ok(records) => records.len(),
        Err(err) => {
            tracing::warn!(%err, "Failed to list adapters from store");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "message": err.to_string(),
                })),
            );
        }
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "adapters_stored": stored,
            "cache": dispatcher.cache().stats(),
            "devices": dispatcher.devices().len(),
            "fallback": dispatcher.fallback(),
        })),
    )
}
