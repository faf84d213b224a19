//! Access-controlled gRPC gateway.
//!
//! Exposes a business service and an administrative service behind a
//! per-consumer ACL. Every authorized call is audited to the `Logging`
//! stream and counted into the `Statistics` windows.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Read and validate the ACL document
//! 3. Bind the listen socket (fail fast on bind errors)
//! 4. Serve until Ctrl+C or SIGTERM, then drain

#![warn(clippy::pedantic)]

use gateway_service::config::Config;
use gateway_service::server;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gateway");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        listen_address = %config.listen_address,
        acl_path = %config.acl_path,
        "Configuration loaded successfully"
    );

    let acl_document = std::fs::read_to_string(&config.acl_path).map_err(|e| {
        error!(error = %e, path = %config.acl_path, "Failed to read ACL document");
        format!("Failed to read ACL document {}: {e}", config.acl_path)
    })?;

    let shutdown_token = CancellationToken::new();
    {
        let shutdown_token = shutdown_token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, initiating graceful shutdown...");
            shutdown_token.cancel();
        });
    }

    server::start(shutdown_token, &config.listen_address, &acl_document).await?;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
