// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser as _;

use loraswap_run::Cli;
use loraswap_runtime::{Worker, logging};

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let worker = Worker::from_settings()?;
    worker.execute(move |runtime| loraswap_run::run(runtime, cli))
}
