// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{process, sync::Arc};

use anyhow::{Context, Result};
use devlease_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    registry::credentials::CredentialStore,
    sched::expiry,
    server::{acceptor, state::AppState, tls},
};
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let port = match args.get(1).map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        _ => {
            eprintln!(
                "usage: {} <port>",
                args.first().map(String::as_str).unwrap_or("devlease-rs")
            );
            process::exit(1);
        },
    };

    let _logger_guard = resolve_config_path("DEVLEASE_LOGGER_CONFIG", "config_logger.yaml")
        .and_then(|p| init_logger(&p))
        .context("failed to initialize logger")?;

    tls::install_crypto_provider();

    let config = resolve_config_path("DEVLEASE_CONFIG", "config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let credentials = CredentialStore::load_from_file(&config.server.users_file)?;
    info!("loaded {} users, {} devices", credentials.len(), config.devices.len());

    let acceptor_tls = tls::load_acceptor(
        config.server.tls.cert_pem.as_ref(),
        config.server.tls.key_pem.as_ref(),
    )?;

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::build(config, credentials)?;

    let listener = TcpListener::bind((bind_addr.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {bind_addr}:{port}"))?;

    let cancel = CancellationToken::new();

    // SIGINT / SIGTERM stop the accept loop; handlers and the scheduler
    // observe the same token.
    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = term.recv() => {},
            }
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    let scheduler = tokio::spawn(expiry::run(Arc::clone(&state), cancel.clone()));

    acceptor::run(listener, acceptor_tls, state, cancel).await?;
    let _ = scheduler.await;

    info!("final counters: {}", devlease_rs::metrics::PERF.snapshot().to_json());
    info!("shutdown complete");
    Ok(())
}
