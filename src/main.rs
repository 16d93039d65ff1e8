//! randtext-server: a random text streaming server
//!
//! Each client sends one fixed-size header (count, origin, bound) and
//! receives a status byte followed by `count` randomly generated ASCII
//! text items.
//!
//! Features:
//! - One task per connection, no shared mutable state
//! - Little-endian wire format with length-prefixed items
//! - Header read and per-write timeouts
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod generator;
mod protocol;
mod server;

use config::{Config, ConfigError};
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Args(e)) if !e.use_stderr() => e.exit(),
        Err(e) => exit_failure(&e.to_string()),
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        workers = ?config.workers,
        read_timeout = ?config.read_timeout,
        write_timeout = ?config.write_timeout,
        max_text_len = config.max_text_len,
        length_mode = ?config.length_mode,
        framing = ?config.framing,
        "Starting randtext-server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers.max(1));
    }

    let runtime = match builder.enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => exit_failure(&format!("Failed to start runtime: {}", e)),
    };

    let code = runtime.block_on(async {
        let server = Server::new(config.clone());

        let listener = match server.bind() {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("Failed to bind {}: {}", config.listen_addr(), e);
                return 1;
            }
        };

        match listener.local_addr() {
            Ok(addr) => info!(address = %addr, "Waiting for clients"),
            Err(e) => error!(error = %e, "Failed to read local address"),
        }

        server.run(listener, shutdown_signal()).await;
        info!("Server stopped");
        0
    });

    std::process::exit(code);
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn exit_failure(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}
