//! The broker process: binds the HTTP control surface of §6 to a fresh
//! [`Broker`](mobility_broker::Broker).

use std::sync::Arc;

use mobility_broker::{router, Broker};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = reqwest::Client::new();
    let broker = Arc::new(Mutex::new(Broker::new(client)));
    let app = router(broker);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "mobility-broker listening");
    axum::serve(listener, app).await?;
    Ok(())
}
