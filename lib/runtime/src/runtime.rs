// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The [Runtime] gives the service and the CLI access to the tokio thread pool and to the
//! primary [`CancellationToken`], which is used to terminate every task attached to it.

use std::sync::Arc;

use crate::config::RuntimeConfig;

pub use tokio_util::sync::CancellationToken;

/// Types of Tokio runtimes that can be used to construct a [Runtime].
#[derive(Clone, Debug)]
enum RuntimeType {
    Shared(Arc<tokio::runtime::Runtime>),
    External(tokio::runtime::Handle),
}

impl RuntimeType {
    /// Get [`tokio::runtime::Handle`] to runtime
    fn handle(&self) -> tokio::runtime::Handle {
        match self {
            RuntimeType::External(rt) => rt.clone(),
            RuntimeType::Shared(rt) => rt.handle().clone(),
        }
    }
}

/// Local [Runtime] which provides access to shared resources local to the process.
#[derive(Debug, Clone)]
pub struct Runtime {
    id: Arc<String>,
    primary: RuntimeType,
    cancellation_token: CancellationToken,
}

impl Runtime {
    fn new(runtime: RuntimeType) -> Runtime {
        Runtime {
            id: Arc::new(uuid::Uuid::new_v4().to_string()),
            primary: runtime,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn from_current() -> anyhow::Result<Runtime> {
        Ok(Runtime::from_handle(tokio::runtime::Handle::try_current()?))
    }

    pub fn from_handle(handle: tokio::runtime::Handle) -> Runtime {
        Runtime::new(RuntimeType::External(handle))
    }

    /// Create a [`Runtime`] owning a tokio runtime built from `config`
    pub fn from_config(config: &RuntimeConfig) -> anyhow::Result<Runtime> {
        let runtime = Arc::new(config.create_runtime()?);
        Ok(Runtime::new(RuntimeType::Shared(runtime)))
    }

    /// Create a [`Runtime`] instance from the settings
    /// See [`RuntimeConfig::from_settings`]
    pub fn from_settings() -> anyhow::Result<Runtime> {
        let config = RuntimeConfig::from_settings()?;
        tracing::debug!(%config, "runtime config");
        Runtime::from_config(&config)
    }

    pub fn single_threaded() -> anyhow::Result<Runtime> {
        Runtime::from_config(&RuntimeConfig::single_threaded())
    }

    /// Returns the unique identifier for the [`Runtime`]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a [`tokio::runtime::Handle`] for the primary/application thread pool
    pub fn primary(&self) -> tokio::runtime::Handle {
        self.primary.handle()
    }

    /// Access the primary [`CancellationToken`] for the [`Runtime`]
    pub fn primary_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Creates a child [`CancellationToken`] tied to the life-cycle of the [`Runtime`]
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Shuts down the [`Runtime`] instance
    pub fn shutdown(&self) {
        tracing::info!(id = %self.id, "Runtime shutdown initiated");
        self.cancellation_token.cancel();
    }
}
