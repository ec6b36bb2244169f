//! `lectern serve`: run the REST API until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use console::style;

use crate::http::extractors::auth::{generate_api_key, hash_api_key};
use crate::http::router::build_router;
use crate::state::AppState;

pub async fn serve(mut state: AppState, host: &str, port: u16) -> Result<()> {
    // Without a configured key, mint one for this run and show it once.
    if state.api_key_hash.is_none() {
        let api_key = generate_api_key();
        state.api_key_hash = Some(hash_api_key(&api_key));
        println!();
        println!(
            "  {} No API key configured. Generated one for this run:",
            style("🔑").bold()
        );
        println!();
        println!("  {}", style(&api_key).yellow().bold());
        println!();
        println!(
            "  {}",
            style("Set LECTERN_API_KEY or [server].api_key to keep a stable key.").dim()
        );
        println!();
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!(
        "  {} Lectern API listening on {} (completions: {})",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan(),
        state.coordinator.completion_provider()
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, data_dir = %state.data_dir.display(), "server started");

    let db = state.db.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    db.close().await;

    println!("\n  Server stopped.");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM. A signal that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(%e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(%e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
