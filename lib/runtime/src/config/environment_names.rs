// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable name constants for centralized management across the codebase
//!
//! Environment variables are organized by functional area:
//! - **Logging**: Log level, configuration file, output format
//! - **Runtime**: Tokio runtime configuration
//! - **Serving**: Adapter cache, routing and HTTP service configuration

/// Logging and tracing environment variables
pub mod logging {
    /// Log level and per-target filters in `EnvFilter` syntax,
    /// e.g. "debug" or "info,loraswap_llm=trace"
    pub const LORASWAP_LOG: &str = "LORASWAP_LOG";

    /// Path to logging configuration file
    pub const LORASWAP_LOGGING_CONFIG_PATH: &str = "LORASWAP_LOGGING_CONFIG_PATH";

    /// Enable JSONL logging format
    pub const LORASWAP_LOGGING_JSONL: &str = "LORASWAP_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const LORASWAP_DISABLE_ANSI_LOGGING: &str = "LORASWAP_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const LORASWAP_LOG_USE_LOCAL_TZ: &str = "LORASWAP_LOG_USE_LOCAL_TZ";
}

/// Runtime configuration environment variables
pub mod runtime {
    /// Prefix consumed by the runtime figment
    pub const PREFIX: &str = "LORASWAP_RUNTIME_";

    /// Number of async worker threads for Tokio runtime
    pub const LORASWAP_RUNTIME_NUM_WORKER_THREADS: &str = "LORASWAP_RUNTIME_NUM_WORKER_THREADS";

    /// Maximum number of blocking threads for Tokio runtime
    pub const LORASWAP_RUNTIME_MAX_BLOCKING_THREADS: &str = "LORASWAP_RUNTIME_MAX_BLOCKING_THREADS";
}

/// Serving configuration environment variables
///
/// Every field of the serving config can be set with the `LORASWAP_SERVING_` prefix,
/// the constants below are the ones referenced from code and docs.
pub mod serving {
    /// Prefix consumed by the serving figment
    pub const PREFIX: &str = "LORASWAP_SERVING_";

    /// Optional TOML file merged on top of `/etc/loraswap/serving.toml`
    pub const LORASWAP_CONFIG_PATH: &str = "LORASWAP_CONFIG_PATH";

    /// Maximum number of resident adapters
    pub const LORASWAP_SERVING_CACHE_CAPACITY: &str = "LORASWAP_SERVING_CACHE_CAPACITY";

    /// Hold a per-device lock for the duration of an inference call
    pub const LORASWAP_SERVING_SERIALIZE_ACTIVATION: &str =
        "LORASWAP_SERVING_SERIALIZE_ACTIVATION";

    /// Number of device workers requests are spread over
    pub const LORASWAP_SERVING_NUM_DEVICES: &str = "LORASWAP_SERVING_NUM_DEVICES";

    /// Whole-request deadline in milliseconds
    pub const LORASWAP_SERVING_REQUEST_TIMEOUT_MS: &str = "LORASWAP_SERVING_REQUEST_TIMEOUT_MS";

    /// `reject` or `base`
    pub const LORASWAP_SERVING_FALLBACK: &str = "LORASWAP_SERVING_FALLBACK";

    /// Accept the `x-tenant-id` header when no API key matches
    pub const LORASWAP_SERVING_TRUST_TENANT_HEADER: &str = "LORASWAP_SERVING_TRUST_TENANT_HEADER";

    /// `mem` or `file`
    pub const LORASWAP_SERVING_STORE: &str = "LORASWAP_SERVING_STORE";

    /// Root directory of the file store
    pub const LORASWAP_SERVING_STORE_PATH: &str = "LORASWAP_SERVING_STORE_PATH";

    /// HTTP listen host
    pub const LORASWAP_SERVING_HTTP_HOST: &str = "LORASWAP_SERVING_HTTP_HOST";

    /// HTTP listen port
    pub const LORASWAP_SERVING_HTTP_PORT: &str = "LORASWAP_SERVING_HTTP_PORT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicate_env_var_names() {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        let vars = [
            // Logging
            logging::LORASWAP_LOG,
            logging::LORASWAP_LOGGING_CONFIG_PATH,
            logging::LORASWAP_LOGGING_JSONL,
            logging::LORASWAP_DISABLE_ANSI_LOGGING,
            logging::LORASWAP_LOG_USE_LOCAL_TZ,
            // Runtime
            runtime::LORASWAP_RUNTIME_NUM_WORKER_THREADS,
            runtime::LORASWAP_RUNTIME_MAX_BLOCKING_THREADS,
            // Serving
            serving::LORASWAP_CONFIG_PATH,
            serving::LORASWAP_SERVING_CACHE_CAPACITY,
            serving::LORASWAP_SERVING_SERIALIZE_ACTIVATION,
            serving::LORASWAP_SERVING_NUM_DEVICES,
            serving::LORASWAP_SERVING_REQUEST_TIMEOUT_MS,
            serving::LORASWAP_SERVING_FALLBACK,
            serving::LORASWAP_SERVING_TRUST_TENANT_HEADER,
            serving::LORASWAP_SERVING_STORE,
            serving::LORASWAP_SERVING_STORE_PATH,
            serving::LORASWAP_SERVING_HTTP_HOST,
            serving::LORASWAP_SERVING_HTTP_PORT,
        ];

        for var in &vars {
            if !seen.insert(var) {
                panic!("Duplicate environment variable name: {}", var);
            }
        }
    }

    #[test]
    fn test_naming_conventions() {
        assert!(runtime::LORASWAP_RUNTIME_NUM_WORKER_THREADS.starts_with(runtime::PREFIX));
        assert!(runtime::LORASWAP_RUNTIME_MAX_BLOCKING_THREADS.starts_with(runtime::PREFIX));
        assert!(serving::LORASWAP_SERVING_CACHE_CAPACITY.starts_with(serving::PREFIX));
        assert!(serving::LORASWAP_SERVING_HTTP_PORT.starts_with(serving::PREFIX));
        assert!(logging::LORASWAP_LOGGING_JSONL.starts_with("LORASWAP_"));
    }
}
