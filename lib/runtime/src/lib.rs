// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! loraswap runtime: process-level plumbing shared by the serving library and the CLI.

pub use anyhow::{
    Context as ErrorContext, Error, Ok as OK, Result, anyhow as error, bail as raise,
};

pub mod config;
pub use config::RuntimeConfig;

pub mod logging;
pub mod runtime;
pub mod storage;
pub mod worker;

pub use runtime::{CancellationToken, Runtime};
pub use worker::Worker;
