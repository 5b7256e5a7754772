//! Push endpoint
//!
//! Pub/Sub push subscriptions and Eventarc triggers POST the message
//! envelope to `/{kind}/{action}`, e.g. `/gke/stop`.

use crate::config::Config;
use crate::error::Error;
use crate::gcp::client::GcpClient;
use crate::orchestrator::handle_trigger;
use crate::payload::Payload;
use crate::resource::{Action, Kind};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub client: GcpClient,
    pub config: Arc<Config>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: &Error) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Build the router with the trigger and health routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/{kind}/{action}", post(trigger))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn trigger(
    State(state): State<AppState>,
    Path((kind, action)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let (kind, action) = match (kind.parse::<Kind>(), action.parse::<Action>()) {
        (Ok(kind), Ok(action)) => (kind, action),
        (Err(e), _) | (_, Err(e)) => return error_response(StatusCode::NOT_FOUND, &e),
    };

    let payload = match Payload::from_envelope(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Rejected {} {} trigger: {}", kind, action, e);
            return error_response(StatusCode::BAD_REQUEST, &e);
        },
    };

    match handle_trigger(&state.client, &state.config, kind, action, payload).await {
        Ok(report) if report.is_success() => (StatusCode::OK, Json(report)).into_response(),
        Ok(report) => (StatusCode::INTERNAL_SERVER_ERROR, Json(report)).into_response(),
        Err(e) => {
            tracing::error!("{} {} invocation failed: {}", kind, action, e);
            let status = match e {
                Error::MalformedPayload(_) => StatusCode::BAD_REQUEST,
                Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_response(status, &e)
        },
    }
}

/// Serve on an already-bound listener until ctrl-c or SIGTERM
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
