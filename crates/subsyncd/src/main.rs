// # subsyncd - Subscription Sync Handler
//
// Serves one endpoint that reconciles every site record in the configured
// collection against the Sierra CRM and reports what happened.
//
// ## Configuration
//
// ### Required
// - `FIRESTORE_COLLECTION`: Collection holding site records
// - `CF_HANDLER_URL`: Callback base URL registered with new webhooks
//
// ### CRM
// - `SIERRA_WEBHOOK_URL`, `SIERRA_USERS_URL`: Endpoint overrides
// - `SIERRA_HTTP_TIMEOUT_SECS`: Per-request timeout (default 30)
//
// ### Store
// - `SUBSYNC_STORE_TYPE`: firestore (default), file, memory
// - `SUBSYNC_STORE_PATH`: JSON file (for file)
// - `GOOGLE_CLOUD_PROJECT`, `FIRESTORE_DATABASE`: Firestore target
// - `FIRESTORE_EMULATOR_HOST`: Use a local emulator without auth
// - `FIRESTORE_ACCESS_TOKEN`: Static token instead of the metadata server
//
// ### Process
// - `PORT`: Listen port (default 8080)
// - `SUBSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export FIRESTORE_COLLECTION=sites
// export CF_HANDLER_URL=https://us-central1-acme.cloudfunctions.net/lead-handler
// export GOOGLE_CLOUD_PROJECT=acme
//
// subsyncd
// ```

use anyhow::Result;
use std::net::SocketAddr;
use std::process::ExitCode;
use subsyncd::{Config, build_state, router};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SubsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SubsyncExitCode> for ExitCode {
    fn from(code: SubsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SubsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SubsyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level().unwrap_or(Level::INFO))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SubsyncExitCode::ConfigError.into();
    }

    info!("Starting subsyncd");
    info!(
        "Collection '{}', store type {}",
        config.collection, config.store_type
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SubsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let state = match build_state(&config).await {
            Ok(state) => state,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return SubsyncExitCode::ConfigError;
            }
        };

        match serve(config.port, router(state)).await {
            Ok(()) => SubsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Server error: {:#}", e);
                SubsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Serve until a shutdown signal arrives
async fn serve(port: u16, app: axum::Router) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server failed: {}", e))?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT
///
/// In-flight requests finish before the server stops.
#[cfg(unix)]
async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to set up signal handlers: {}", e);
            // Fall back to CTRL-C only
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received shutdown signal: {}", received);
}

/// Resolve on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for CTRL-C: {}", e);
        return;
    }
    info!("Received shutdown signal: SIGINT");
}
