// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use relational_pgp_relay::api;
use relational_pgp_relay::config::{ConfigError, Settings};
use relational_pgp_relay::pgp::PgpTransform;
use relational_pgp_relay::relay::Relay;
use relational_pgp_relay::state::AppState;
use relational_pgp_relay::store::SftpConnector;

#[tokio::main]
async fn main() {
    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => Arc::new(settings),
        Err(err) => fatal(err),
    };

    let connector = Arc::new(SftpConnector::new(settings.sftp.clone()));
    let transform = Arc::new(PgpTransform::new());
    let relay = match Relay::new(settings.clone(), connector, transform) {
        Ok(relay) => relay,
        Err(err) => fatal(err),
    };

    let state = AppState::new(relay);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr())
        .await
        .expect("Failed to bind server address");

    tracing::info!(addr = %settings.bind_addr(), "PGP relay listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

/// `LOG_FORMAT=json` switches to structured output; anything else keeps
/// the human-readable formatter. `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn fatal(err: ConfigError) -> ! {
    tracing::error!(error = %err, "configuration error");
    std::process::exit(1);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
