//! The on-demand simulator process: hosts one [`OndemandSimulator`] behind
//! `mobility-sim-host`'s generic `/spec /setup /start /peek /step /triggered
//! /finish` surface (§6).

use std::sync::Arc;

use mobility_ondemand::OndemandSimulator;
use mobility_sim_host::router;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = Arc::new(Mutex::new(OndemandSimulator::new()));
    let app = router(runtime);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8081);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "mobility-ondemand listening");
    axum::serve(listener, app).await?;
    Ok(())
}
