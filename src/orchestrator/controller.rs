//! Server lifecycle controller.
//!
//! Owns the HTTP listener and the background host sampler, and tears both down on
//! Ctrl-C or SIGTERM.

use super::Console;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub(crate) async fn run_server(
    console: Console,
    listen: SocketAddr,
    sample_interval: Duration,
) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let local = listener.local_addr().context("listener has no local address")?;

    let sampler = console.metrics.clone().spawn_sampler(sample_interval);
    let listing = console.registry.list_organs();
    info!(
        addr = %local,
        organs = listing.total,
        running = listing.running,
        "veil console listening"
    );

    let app = crate::api::router(console);
    let res = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    // Dropping a JoinHandle does NOT cancel the task; abort the sampler explicitly or it
    // keeps ticking after the server is gone.
    sampler.abort();
    info!("veil console stopped");
    res
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => futures::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown requested");
}
