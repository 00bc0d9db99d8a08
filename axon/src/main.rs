#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;
use std::sync::Arc;

use args::Args;
use axon_agent::{AgentLoop, RunContext};
use axon_config::Config;
use axon_core::{
    EnvSecretResolver, JsonlSessionStore, ModelEndpoint, StaticFunctionRegistry, StaticModelRegistry,
};
use axon_llm::HttpProviderClient;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the SSE frames
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::load(&args.config)?;

    tracing::info!(
        config_path = %args.config.display(),
        model = %args.model,
        "starting axon"
    );

    // Build the model registry from configuration
    let mut endpoints = indexmap::IndexMap::new();
    for (name, model) in &config.models {
        endpoints.insert(
            name.clone(),
            ModelEndpoint {
                endpoint: model.endpoint.clone(),
                dialect: model.dialect,
                credential_key: model.credential.clone(),
                default_headers: model.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
        );
    }

    let client = Arc::new(HttpProviderClient::new(
        Arc::new(StaticModelRegistry::new(endpoints)),
        Arc::new(EnvSecretResolver::new()),
    ));
    let functions = Arc::new(StaticFunctionRegistry::new());
    let store = Arc::new(JsonlSessionStore::new(config.audit.path.clone()));

    let agent = AgentLoop::new(client, functions, store, config.agent.clone());

    // Set up graceful shutdown
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    let context = RunContext {
        model: args.model,
        session_id: args.session,
        user_id: args.user,
    };

    // Print frames as they arrive
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(frame) = rx.recv().await {
            let _ = stdout.write_all(frame.as_bytes());
            let _ = stdout.flush();
        }
    });

    // Let the printer drain before surfacing any run error
    let result = agent.run(&args.question, &context, tx, cancel).await;
    printer.await?;
    result?;

    tracing::info!("axon stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
