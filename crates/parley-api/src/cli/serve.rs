//! `parley serve`: run the HTTP API until Ctrl+C or SIGTERM.

use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use parley_infra::config::Secrets;
use parley_types::config::ServiceConfig;

use crate::http::router::build_router;
use crate::state::AppState;

/// Serve until a shutdown signal arrives, then drain in-flight requests,
/// flush queued notifications and stop the sweeper.
pub async fn serve(config: ServiceConfig, secrets: Secrets, quiet: bool) -> Result<()> {
    let shutdown = CancellationToken::new();
    let (state, tasks) = AppState::init(&config, secrets, shutdown.clone())?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Parley API listening");

    if !quiet {
        println!(
            "  {} Parley API listening on {}",
            style("⚡").bold(),
            style(format!("http://{addr}")).cyan()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    let router = build_router(state, &config.server);
    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    // Covers the case where the server stopped without a signal.
    shutdown.cancel();
    tasks.join().await;

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
