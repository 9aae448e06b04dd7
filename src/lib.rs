//! herder library
//!
//! A process supervisor daemon: clients connect over TCP, define processes to
//! spawn and watch their captured output.

pub mod commands;
pub mod config;
pub mod server;

use std::path::PathBuf;

use tokio::net::TcpListener;

use herder_core::prelude::*;

pub use server::{serve, ServerState};

/// Start the daemon and serve until interrupted
///
/// `config_path` overrides the default settings file location; `listen`
/// overrides the configured listen address. Logging must already be set up.
pub async fn run(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    let mut settings = match config_path.or_else(config::default_config_path) {
        Some(path) => config::load_settings(&path),
        None => config::Settings::default(),
    };
    if let Some(listen) = listen {
        settings.server.listen = listen;
    }
    info!(
        "herder {} starting on {} (pid {})",
        env!("CARGO_PKG_VERSION"),
        settings.server.listen,
        std::process::id()
    );

    let listener = TcpListener::bind(&settings.server.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", settings.server.listen))?;
    let state = ServerState::new(settings);

    let result = tokio::select! {
        result = serve(listener, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!("Server error: {:?}", e);
    }

    info!("herder exiting");
    result
}
