mod config;
mod feedback;
mod http;
mod media;
mod push;
mod seed;
mod state;

use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::http::router::build_router;
use crate::state::AppState;
use storage::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new().context("Failed to load configuration")?;

    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(
        settings.store.latency_ms,
    )));
    if settings.store.seed_demo {
        seed::seed_demo(&*store)
            .await
            .context("Failed to seed demo data")?;
    }

    let mut changes = store.changes();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => debug!(
                    collection = event.collection(),
                    doc_id = event.doc_id(),
                    "Store change"
                ),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Change log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = AppState::new(store, &settings)?;
    match &state.default_actor {
        Some(actor) => info!(%actor, "Default session signed in"),
        None => info!("No default session, requests without x-actor-id are signed out"),
    }

    let app = build_router(state, &settings.server.cors_origins);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
