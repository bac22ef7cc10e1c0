//! A generic HTTP host for any [`SimulatorRuntime`]: exposes `/spec /setup
//! /start /peek /step /triggered /finish` (§4.B.1, §6's simulator-side
//! endpoints).
//!
//! Mirrors the teacher's `GenericServer<F>` shape: the host is parameterized
//! over the runtime type rather than hard-coding a particular simulator, and
//! single-threads it behind a `tokio::sync::Mutex` at the handler layer
//! (§4.A.1 — the kernel underneath is not internally synchronized).

mod error;

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use mobility_kernel::SimulatorRuntime;
use mobility_wire::{Event, MessageReply, PeekReply, StepReply};
use tokio::sync::Mutex;

use error::HostError;

/// A simulator runtime shared with the `axum` handlers that drive it.
pub type SharedRuntime<R> = Arc<Mutex<R>>;

/// Builds the HTTP host for `runtime`, implementing every endpoint a
/// simulator service MUST expose (§6's table).
pub fn router<R>(runtime: SharedRuntime<R>) -> Router
where
    R: SimulatorRuntime + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/spec", get(spec::<R>))
        .route("/setup", post(setup::<R>))
        .route("/start", post(start::<R>))
        .route("/peek", get(peek::<R>))
        .route("/step", post(step::<R>))
        .route("/triggered", post(triggered::<R>))
        .route("/finish", post(finish::<R>))
        .with_state(runtime)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn spec<R: SimulatorRuntime>(State(runtime): State<SharedRuntime<R>>) -> impl IntoResponse {
    let runtime = runtime.lock().await;
    Json(runtime.spec())
}

async fn setup<R: SimulatorRuntime>(
    State(runtime): State<SharedRuntime<R>>,
    Json(config): Json<serde_json::Value>,
) -> impl IntoResponse {
    let mut runtime = runtime.lock().await;
    match runtime.setup(config) {
        Ok(()) => Json(MessageReply::ok("configured")).into_response(),
        Err(err) => HostError::from(err).into_response(),
    }
}

async fn start<R: SimulatorRuntime>(State(runtime): State<SharedRuntime<R>>) -> impl IntoResponse {
    let mut runtime = runtime.lock().await;
    match runtime.start() {
        Ok(()) => Json(MessageReply::ok("started")).into_response(),
        Err(err) => HostError::from(err).into_response(),
    }
}

async fn peek<R: SimulatorRuntime>(State(runtime): State<SharedRuntime<R>>) -> impl IntoResponse {
    let runtime = runtime.lock().await;
    Json(PeekReply::from_time(runtime.peek()))
}

async fn step<R: SimulatorRuntime>(State(runtime): State<SharedRuntime<R>>) -> impl IntoResponse {
    let mut runtime = runtime.lock().await;
    match runtime.step() {
        Ok(outcome) => Json(StepReply {
            now: outcome.now.as_minutes(),
            events: outcome.events,
        })
        .into_response(),
        Err(err) => HostError::from(err).into_response(),
    }
}

async fn triggered<R: SimulatorRuntime>(
    State(runtime): State<SharedRuntime<R>>,
    Json(event): Json<Event>,
) -> impl IntoResponse {
    let mut runtime = runtime.lock().await;
    match runtime.triggered(event) {
        Ok(()) => Json(MessageReply::ok("accepted")).into_response(),
        Err(err) => HostError::from(err).into_response(),
    }
}

async fn finish<R: SimulatorRuntime>(State(runtime): State<SharedRuntime<R>>) -> impl IntoResponse {
    let mut runtime = runtime.lock().await;
    match runtime.finish() {
        Ok(()) => Json(MessageReply::ok("stopped")).into_response(),
        Err(err) => HostError::from(err).into_response(),
    }
}
