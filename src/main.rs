// =============================================================================
// Grid Hedge Engine — Main Entry Point
// =============================================================================
//
// A pure request/response control plane: no background loops poll an
// exchange, because the terminal agent is the one polling us. Startup
// loads the last persisted snapshot (or starts fresh), serves the API,
// and saves once more on shutdown.
// =============================================================================

mod api;
mod app_state;
mod close_monitor;
mod dispatcher;
mod hedge;
mod ids;
mod persistence;
mod planner;
mod reconcile;
mod take_profit;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::persistence::EngineSnapshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║             Grid Hedge Engine — Starting Up               ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let state_path = PathBuf::from(
        std::env::var("GRID_STATE_PATH").unwrap_or_else(|_| "grid_state.json".to_string()),
    );

    let snapshot = EngineSnapshot::load_or_default(&state_path);
    info!(
        path = %state_path.display(),
        buy_enabled = snapshot.runtime.buy.enabled,
        sell_enabled = snapshot.runtime.sell.enabled,
        "engine state ready"
    );

    let state = Arc::new(AppState::new(snapshot, state_path));

    let bind_addr =
        std::env::var("GRID_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());

    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind API server");
    info!(addr = %bind_addr, "API server listening");

    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "API server failed");
        }
        let _ = server_state;
    });

    info!("Engine running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, persisting state");
    state.persist();

    info!("Grid hedge engine shut down complete.");
    Ok(())
}
