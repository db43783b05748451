// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use loraswap_llm::adapters::TenantId;

/// Multi-tenant LoRA adapter serving.
///
/// Settings not given as flags come from `LORASWAP_SERVING_*` environment variables and
/// the file named by `LORASWAP_CONFIG_PATH`.
#[derive(Parser, Debug)]
#[command(name = "loraswap-run", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Talk to one tenant's adapter from the terminal
    Chat(ChatArgs),

    /// Manage stored adapters
    #[command(subcommand)]
    Adapters(AdaptersCommand),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP port, overrides the configured one
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind, overrides the configured one
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Tenant whose adapter answers
    #[arg(long)]
    pub tenant: TenantId,

    /// Answer this single prompt and exit
    #[arg(long)]
    pub prompt: Option<String>,

    /// Upper bound on generated words per answer
    #[arg(long)]
    pub max_new_tokens: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum AdaptersCommand {
    /// Store a weights file as the tenant's adapter
    Put {
        tenant: TenantId,
        path: PathBuf,
        #[arg(long)]
        version: u64,
    },
    /// Show the tenant's adapter record
    Get { tenant: TenantId },
    /// List all stored adapters
    List,
    /// Remove the tenant's adapter
    Delete { tenant: TenantId },
}
