// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! A [Worker] owns the process [Runtime] and drives an application future to completion,
//! translating SIGINT/ctrl-c into cancellation of the runtime's primary token.

use std::future::Future;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::runtime::Runtime;

/// How long the application gets to finish after cancellation before we give up on it
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Worker {
    runtime: Runtime,
    graceful_shutdown_timeout: Duration,
}

impl Worker {
    /// Create a [Worker] with a runtime built from [`RuntimeConfig::from_settings`]
    pub fn from_settings() -> anyhow::Result<Worker> {
        Ok(Worker::from_runtime(Runtime::from_settings()?))
    }

    pub fn from_config(config: &RuntimeConfig) -> anyhow::Result<Worker> {
        Ok(Worker::from_runtime(Runtime::from_config(config)?))
    }

    pub fn from_runtime(runtime: Runtime) -> Worker {
        Worker {
            runtime,
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run `f` on the worker's runtime, blocking the current thread until it completes.
    pub fn execute<F, Fut>(self, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(Runtime) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let runtime = self.runtime.clone();
        let timeout = self.graceful_shutdown_timeout;
        self.runtime.primary().block_on(async move {
            let token = runtime.primary_token();
            let mut app = tokio::spawn(f(runtime.clone()));

            tokio::select! {
                result = &mut app => return result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received ctrl-c, shutting down");
                    runtime.shutdown();
                }
                _ = token.cancelled() => {}
            }

            match tokio::time::timeout(timeout, &mut app).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        timeout = %humantime::format_duration(timeout),
                        "Application did not stop in time, aborting"
                    );
                    app.abort();
                    Ok(())
                }
            }
        })
    }
}
