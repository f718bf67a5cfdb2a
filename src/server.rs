//! HTTP surface: `/ping`, `/invocations`, `/metrics`

use crate::error::ServeError;
use crate::metrics::{ServiceMetrics, CONTENT_TYPE};
use crate::models::{InferenceEngine, Prediction};
use crate::types::{InvocationRequest, InvocationResponse, PingResponse};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::error::Category;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub metrics: ServiceMetrics,
}

impl AppState {
    pub fn new(engine: Arc<InferenceEngine>, metrics: ServiceMetrics) -> Self {
        Self { engine, metrics }
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM, then log a metrics summary.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let metrics = state.metrics.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shutting down...");
    metrics.log_summary();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received termination signal"),
    }
}

/// Health check
async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse::ok(state.engine.is_loaded()))
}

/// SageMaker-style inference: `{"instances": [{feature: value, ...}, ...]}`
async fn invocations(State(state): State<AppState>, body: Bytes) -> Response {
    match invoke(&state, body).await {
        Ok(prediction) => {
            state.metrics.record_invocation(prediction.latency);
            Json(InvocationResponse::from(prediction)).into_response()
        }
        Err(e) => {
            state.metrics.record_error(e.kind());
            debug!(error = %e, kind = e.kind(), "Invocation rejected");
            e.into_response()
        }
    }
}

async fn invoke(state: &AppState, body: Bytes) -> Result<Prediction, ServeError> {
    // Parsing, preprocessing and prediction are CPU bound
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || {
        let request = parse_request(&body)?;
        engine.predict(&request.instances)
    })
    .await
    .map_err(|e| ServeError::Task(e.to_string()))?
}

/// Syntax errors are 400, well-formed JSON of the wrong shape is 422.
fn parse_request(body: &[u8]) -> Result<InvocationRequest, ServeError> {
    serde_json::from_slice(body).map_err(|e| {
        let status = match e.classify() {
            Category::Data => StatusCode::UNPROCESSABLE_ENTITY,
            Category::Syntax | Category::Eof | Category::Io => StatusCode::BAD_REQUEST,
        };
        ServeError::MalformedRequest {
            status,
            message: e.to_string(),
        }
    })
}

/// Prometheus exposition
async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_status() {
        let err = parse_request(b"{not json").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = parse_request(br#"{"instances": "abc"}"#).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = parse_request(b"").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = parse_request(b"[]").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert!(parse_request(br#"{"instances": []}"#).unwrap().instances.is_empty());
    }
}
