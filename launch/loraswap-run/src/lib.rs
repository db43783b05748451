// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::Context as _;
use loraswap_llm::ServingConfig;
use loraswap_llm::adapters::{AdapterStore, InferenceRequest, RequestDispatcher, RequestMeta};
use loraswap_llm::config::StoreKind;
use loraswap_llm::engine::{EchoRuntime, GenerationParams};
use loraswap_llm::http::service::HttpService;
use loraswap_llm::metrics::Registry;
use loraswap_runtime::Runtime;

mod opt;
pub use opt::{AdaptersCommand, ChatArgs, Cli, Command, ServeArgs};

/// Words that end an interactive chat
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

pub async fn run(runtime: Runtime, cli: Cli) -> anyhow::Result<()> {
    let config = ServingConfig::from_settings()?;
    let store = config.open_store()?;
    match cli.command {
        Command::Serve(args) => serve(runtime, config, store, args).await,
        Command::Chat(args) => chat(runtime, config, store, args).await,
        Command::Adapters(cmd) => {
            if config.store == StoreKind::Mem {
                tracing::warn!(
                    hint = "set LORASWAP_SERVING_STORE=file",
                    "The memory store does not outlive this command"
                );
            }
            adapters(store, cmd).await
        }
    }
}

async fn serve(
    runtime: Runtime,
    mut config: ServingConfig,
    store: AdapterStore,
    args: ServeArgs,
) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(host) = args.host {
        config.http_host = host;
    }

    let registry = Registry::new();
    let dispatcher = config.build_dispatcher(
        store.clone(),
        Arc::new(EchoRuntime::new()),
        Some(&registry),
    )?;
    tracing::info!(
        capacity = config.cache_capacity,
        devices = config.num_devices,
        fallback = %config.fallback,
        "adapter dispatcher ready"
    );

    let service = HttpService::builder()
        .host(config.http_host.clone())
        .port(config.http_port)
        .store(store)
        .dispatcher(Arc::new(dispatcher))
        .registry(registry)
        .build()?;
    service.run(runtime.primary_token()).await
}

async fn chat(
    runtime: Runtime,
    config: ServingConfig,
    store: AdapterStore,
    args: ChatArgs,
) -> anyhow::Result<()> {
    let dispatcher =
        config.build_dispatcher(store.clone(), Arc::new(EchoRuntime::new()), None)?;
    match store.get(&args.tenant).await {
        Ok(record) => tracing::info!(
            tenant = %args.tenant,
            version = record.version,
            "Chatting with adapter"
        ),
        Err(err) => tracing::warn!(%err, fallback = %config.fallback, "No adapter for tenant"),
    }

    // The terminal is trusted, so map a local key straight to the tenant
    let api_key = format!("cli-{}", args.tenant);
    dispatcher.router().register_key(&api_key, args.tenant.clone());

    let mut params = GenerationParams::default();
    if let Some(max_new_tokens) = args.max_new_tokens {
        params.max_new_tokens = max_new_tokens;
    }

    if let Some(prompt) = args.prompt {
        return ask(&dispatcher, &api_key, prompt, &params).await;
    }

    let cancel_token = runtime.primary_token();
    tracing::info!("Type 'quit' or Ctrl-c to exit");
    let theme = dialoguer::theme::ColorfulTheme::default();
    let mut history = dialoguer::BasicHistory::default();
    while !cancel_token.is_cancelled() {
        let input = dialoguer::Input::<String>::with_theme(&theme)
            .history_with(&mut history)
            .with_prompt(args.tenant.as_str())
            .allow_empty(true)
            .interact_text();
        let prompt = match input {
            Ok(prompt) => prompt,
            Err(dialoguer::Error::IO(err)) => {
                // Ctrl-c arrives as Interrupted
                if err.kind() != ErrorKind::Interrupted {
                    tracing::info!("IO error: {}", err.kind());
                }
                break;
            }
        };
        let prompt = prompt.trim();
        if prompt.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&prompt.to_lowercase().as_str()) {
            break;
        }
        if let Err(err) = ask(&dispatcher, &api_key, prompt.to_string(), &params).await {
            tracing::error!(%err, "Request failed");
        }
    }
    Ok(())
}

async fn ask(
    dispatcher: &RequestDispatcher,
    api_key: &str,
    prompt: String,
    params: &GenerationParams,
) -> anyhow::Result<()> {
    let request = InferenceRequest {
        meta: RequestMeta::with_api_key(api_key),
        prompt,
        params: params.clone(),
    };
    let response = dispatcher.dispatch(request).await?;
    let label = match (&response.tenant_id, response.adapter_version) {
        (Some(tenant), Some(version)) => format!("{tenant}@v{version}"),
        _ => "base".to_string(),
    };
    println!("[{label}] {}", response.text);
    Ok(())
}

async fn adapters(store: AdapterStore, cmd: AdaptersCommand) -> anyhow::Result<()> {
    match cmd {
        AdaptersCommand::Put {
            tenant,
            path,
            version,
        } => {
            let weights = tokio::fs::read(&path)
                .await
                .with_context(|| path.display().to_string())?;
            let record = store.put(&tenant, bytes::Bytes::from(weights), version).await?;
            print_json(&record)
        }
        AdaptersCommand::Get { tenant } => print_json(&store.get(&tenant).await?),
        AdaptersCommand::List => {
            let records = store.list().await?;
            if records.is_empty() {
                tracing::info!("No adapters stored");
            }
            for record in records {
                println!(
                    "{}\tv{}\t{} bytes\t{}",
                    record.tenant_id, record.version, record.size_bytes, record.created_at
                );
            }
            Ok(())
        }
        AdaptersCommand::Delete { tenant } => {
            let record = store.delete(&tenant).await?;
            tracing::info!(tenant = %record.tenant_id, version = record.version, "Adapter deleted");
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
