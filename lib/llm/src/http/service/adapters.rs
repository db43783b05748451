// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Adapter registry endpoints.
//!
//! ## Endpoints
//!
//! ### PUT /v1/adapters/{tenant}?version=N
//! Store the request body as the tenant's adapter weights at version `N`. A newer version
//! replaces the stored one and retires the cached copy. Returns the stored record.
//!
//! ### GET /v1/adapters/{tenant}
//! The tenant's current record, 404 if none.
//!
//! ### GET /v1/adapters
//! `{"adapters": [record, ...]}` ordered by tenant.
//!
//! ### DELETE /v1/adapters/{tenant}
//! Remove the record and its weights.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State as AxumState},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, RouteDoc, State};
use crate::adapters::{AdapterRecord, TenantId};

#[derive(Debug, Deserialize)]
pub struct PutParams {
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAdaptersResponse {
    pub adapters: Vec<AdapterRecord>,
}

pub fn router(state: Arc<State>, path: Option<String>) -> (Vec<RouteDoc>, Router) {
    let base_path = path.unwrap_or_else(|| "/v1/adapters".to_string());
    let tenant_path = format!("{base_path}/{{tenant}}");

    let docs: Vec<RouteDoc> = vec![
        RouteDoc::new(Method::GET, &base_path),
        RouteDoc::new(Method::GET, &tenant_path),
        RouteDoc::new(Method::PUT, &tenant_path),
        RouteDoc::new(Method::DELETE, &tenant_path),
    ];

    let router = Router::new()
        .route(&base_path, get(list_adapters))
        .route(
            &tenant_path,
            get(get_adapter).put(put_adapter).delete(delete_adapter),
        )
        .with_state(state);

    (docs, router)
}

async fn list_adapters(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, ApiError> {
    let adapters = state.store().list().await?;
    Ok(Json(ListAdaptersResponse { adapters }))
}

async fn get_adapter(
    AxumState(state): AxumState<Arc<State>>,
    Path(tenant): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id: TenantId = tenant.parse()?;
    Ok(Json(state.store().get(&tenant_id).await?))
}

async fn put_adapter(
    AxumState(state): AxumState<Arc<State>>,
    Path(tenant): Path<String>,
    Query(params): Query<PutParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id: TenantId = tenant.parse()?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("adapter body is empty".to_string()));
    }
    let record = state.store().put(&tenant_id, body, params.version).await?;
    state
        .dispatcher()
        .cache()
        .invalidate_older_than(&tenant_id, record.version);
    Ok((StatusCode::OK, Json(record)))
}

async fn delete_adapter(
    AxumState(state): AxumState<Arc<State>>,
    Path(tenant): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id: TenantId = tenant.parse()?;
    let record = state.store().delete(&tenant_id).await?;
    state.dispatcher().cache().remove(&tenant_id);
    Ok(Json(record))
}
