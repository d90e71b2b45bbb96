//! broadcastd - broadcast gossip node
//!
//! Speaks newline-delimited JSON envelopes on stdin/stdout, floods every
//! new value to its topology neighbors, and answers reads with the set of
//! values it has seen.

use broadcastd::config::Config;
use broadcastd::server::Server;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to stderr; stdout carries protocol frames
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("broadcastd={level}").parse()?)
        .add_directive(format!("broadcast_net={level}").parse()?);

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging
    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "broadcastd v{} - broadcast gossip node",
        env!("CARGO_PKG_VERSION")
    );

    // Create and run server
    match Server::new(config) {
        Ok(server) => {
            let server = Arc::new(server);

            // Install signal handler
            let shutdown_server = server.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received shutdown signal");
                shutdown_server.shutdown();
            });

            if let Err(e) = server.run().await {
                error!("Server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
