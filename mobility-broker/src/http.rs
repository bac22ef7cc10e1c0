//! The broker's HTTP control surface (§4.H, §6): a thin façade that
//! forwards each request onto [`Broker`]'s state-machine transitions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use mobility_wire::{BrokerSetupRequest, Time};
use tokio::sync::Mutex;

use crate::broker::Broker;
use crate::error::ApiError;

pub type SharedBroker = Arc<Mutex<Broker>>;

/// Builds the broker's `axum::Router`: `/setup /start /run /peek /events
/// /finish` (§6) plus an ambient `/healthz` liveness endpoint, matching
/// every production HTTP service in the retrieval pack.
pub fn router(broker: SharedBroker) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/setup", post(setup))
        .route("/start", post(start))
        .route("/run", post(run))
        .route("/peek", get(peek))
        .route("/events", get(events))
        .route("/finish", post(finish))
        .with_state(broker)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn setup(
    State(broker): State<SharedBroker>,
    Json(request): Json<BrokerSetupRequest>,
) -> impl IntoResponse {
    let mut broker = broker.lock().await;
    match broker.setup(request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn start(State(broker): State<SharedBroker>) -> impl IntoResponse {
    let mut broker = broker.lock().await;
    match broker.start().await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn run(
    State(broker): State<SharedBroker>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let until = params
        .get("until")
        .and_then(|v| v.parse::<f64>().ok())
        .map(Time::from_minutes)
        .unwrap_or(Time::INFINITY);

    let mut broker = broker.lock().await;
    match broker.run_until(until).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn peek(State(broker): State<SharedBroker>) -> impl IntoResponse {
    let broker = broker.lock().await;
    Json(broker.peek_status())
}

/// `GET /events`: a newline-delimited JSON dump of the event log so far.
///
/// The log is append-only and small relative to a single run (§5's
/// "tens, not thousands, of services"); a full in-memory snapshot joined
/// with `\n` satisfies §6's "streamed" without the complexity of a live
/// `axum::body::Body::from_stream` subscription, which would only pay off
/// once `/events` needs to tail an in-progress run rather than inspect a
/// completed or paused one.
async fn events(State(broker): State<SharedBroker>) -> impl IntoResponse {
    let broker = broker.lock().await;
    let mut body = String::new();
    for event in broker.event_log() {
        if let Ok(line) = serde_json::to_string(event) {
            body.push_str(&line);
            body.push('\n');
        }
    }
    ([(axum::http::header::CONTENT_TYPE, "application/x-ndjson")], body)
}

async fn finish(State(broker): State<SharedBroker>) -> impl IntoResponse {
    let mut broker = broker.lock().await;
    match broker.finish().await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
