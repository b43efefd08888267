//! registry-v1 - A file-backed server for the legacy container image registry protocol.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registry_v1::{config::Config, create_router, PidFile};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    let addr = config.bind_address();
    info!("Configuration:");
    info!("  Listen address: {}", addr);
    info!("  Data directory: {}", config.data_dir.display());
    match config.pid_file {
        Some(ref pid_file) => info!("  Pid file: {}", pid_file.display()),
        None => info!("  Pid file: none"),
    }
    match config.namespace {
        Some(ref namespace) => info!("  Namespace: {}", namespace),
        None => info!("  Namespace: any"),
    }

    if config.logins_enabled() {
        info!("  Auth: Basic logins upgraded to session tokens");
    } else {
        warn!("  Auth: logins DISABLED - only anonymous requests are served");
        warn!("        Enable with --secret=<secret> --password=<password>");
    }

    // Held until the server stops; dropping it removes the file
    let _pid_file = match config.pid_file {
        Some(ref path) => match PidFile::create(path) {
            Ok(pid_file) => Some(pid_file),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let router = create_router(config.router_config());

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/v1/_ping", addr);
    info!("    curl http://{}/v1/repositories/<namespace>/<name>/tags", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("  registry-v1 v{}", version);
    info!("  legacy container image registry");
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "registry_v1=debug,tower_http=debug"
    } else {
        "registry_v1=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    }
}
