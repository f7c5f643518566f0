//! FlareProx - Entry Point
//!
//! Parses the command line, initializes logging and dispatches the command.

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flareprox::cli::{self, Cli, Command};
use flareprox::config::{Config, LogConfig};
use flareprox::FlareProxError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log);

    // Only the emulator runs until interrupted; other commands keep default signal handling.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if matches!(cli.command, Command::Serve { .. }) {
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    if let Err(e) = cli::run(cli, config, shutdown_rx).await {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        if let Some(hint) = e.downcast_ref::<FlareProxError>().and_then(hint_for) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}

fn hint_for(err: &FlareProxError) -> Option<&'static str> {
    if err.is_configuration_error() {
        Some("Set CLOUDFLARE_API_TOKEN and CLOUDFLARE_ACCOUNT_ID (token needs the 'Edit Cloudflare Workers' scope)")
    } else if err.is_remote_error() {
        Some("Cloudflare rejected or did not answer the request; re-run with LOG_LEVEL=debug for response details")
    } else {
        None
    }
}

/// Logs go to stderr so command output on stdout stays clean
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("flareprox={}", log.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
