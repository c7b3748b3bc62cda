// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use relational_split_server::{
    api::router,
    config,
    payment_poller::PaymentPoller,
    providers::{paystack::PaystackClient, PaymentGateway},
    state::{AppState, AuthConfig},
    storage::{FileStorage, StoragePaths},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let data_dir = config::data_dir();
    let mut storage = FileStorage::new(StoragePaths::new(&data_dir));
    storage.initialize()?;
    info!(data_dir = %data_dir, "Storage initialized");

    let auth_config = AuthConfig::from_env();
    if auth_config.is_production() {
        info!("Google ID token verification enabled");
    } else {
        warn!("No GOOGLE_CLIENT_ID or GOOGLE_JWKS_URL set; tokens are NOT signature-checked (dev mode)");
    }

    let gateway = PaystackClient::from_env()?;
    if !gateway.is_configured() {
        warn!("PAYSTACK_SECRET_KEY not set; payment endpoints will return 503");
    }

    let state = AppState::new(storage)
        .with_auth_config(auth_config)
        .with_gateway(Arc::new(gateway));

    let shutdown = CancellationToken::new();
    let poller = tokio::spawn(PaymentPoller::new(state.clone()).run(shutdown.clone()));

    let addr = config::bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Relational Split server listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = poller.await {
        warn!(error = %e, "Payment poller task failed");
    }
    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    if config::log_format_is_json() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Resolves on Ctrl-C or SIGTERM and cancels background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
