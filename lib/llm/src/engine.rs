// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the base-model inference runtime

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::adapters::{DeviceId, LoadedAdapter, TenantId};
use crate::chat_template::{ChatTemplate, END_TAG};

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 100;
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Sampling parameters for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationParams {
    #[validate(range(min = 1))]
    pub max_new_tokens: u32,
    #[validate(range(min = 0.0))]
    pub temperature: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Which adapter, if any, is applied on top of the base model for a single call.
/// It borrows the adapter, so it cannot outlive the pin that keeps it resident.
#[derive(Debug, Clone, Copy)]
pub enum Activation<'a> {
    BaseOnly,
    Adapter(&'a LoadedAdapter),
}

impl Activation<'_> {
    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            Activation::BaseOnly => None,
            Activation::Adapter(adapter) => Some(adapter.tenant_id()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Activation::BaseOnly => "base".to_string(),
            Activation::Adapter(adapter) => {
                format!("{}@v{}", adapter.tenant_id(), adapter.version())
            }
        }
    }
}

/// The shared base model. Implementations receive the adapter to apply on every
/// call and must not keep it active afterwards.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Run one completion of `prompt` on `device` and return the raw decoded output,
    /// prompt included, special tokens kept.
    async fn generate(
        &self,
        device: DeviceId,
        prompt: &str,
        params: &GenerationParams,
        activation: Activation<'_>,
    ) -> anyhow::Result<String>;
}

/// Runtime that answers by echoing the user's turn, tagged with the active adapter.
/// Used by the CLI demo and tests.
#[derive(Debug, Clone, Default)]
pub struct EchoRuntime {
    delay: Option<Duration>,
}

impl EchoRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

#[async_trait]
impl InferenceRuntime for EchoRuntime {
    async fn generate(
        &self,
        device: DeviceId,
        prompt: &str,
        params: &GenerationParams,
        activation: Activation<'_>,
    ) -> anyhow::Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let words: Vec<&str> = ChatTemplate::user_text(prompt)
            .split_whitespace()
            .take(params.max_new_tokens as usize)
            .collect();
        tracing::trace!(device, activation = %activation.label(), "echo generate");
        Ok(format!(
            "{prompt} [{}] {} {END_TAG}",
            activation.label(),
            words.join(" ")
        ))
    }
}
