//! AutoSniper application shell.
//!
//! Loads configuration, wires the services and keeps the scheduler running
//! until the process is asked to stop. Core logic lives in `crates/`.

pub mod state;

pub use state::AppState;

use autosniper_core::AppConfig;
use tracing::info;

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,autosniper=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Run until Ctrl-C.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting AutoSniper v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config).await?;
    state.start_background()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    state.shutdown().await;
    info!("AutoSniper stopped");
    Ok(())
}
