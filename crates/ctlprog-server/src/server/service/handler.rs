//! HTTP surface for batch control program creation.
//!
//! This module defines [`ControlProgramService`], the shared state behind the
//! router built by [`router`]:
//!
//! - `POST /create-control-program` takes a [`BatchRequest`] and answers with
//!   a [`BatchResponse`] holding one entry per sub-request, in request order.
//! - `GET /health` reports liveness.
//!
//! ## Responsibilities
//!
//! - Validate the envelope and enforce the configured batch size limit.
//! - Derive the batch's root trace from `x-request-id` when it is a UUID.
//! - Hand the sub-requests to the [`Dispatcher`] and record batch metrics.
//!
//! A batch that passes validation is always answered with `200 OK`, however
//! many of its items failed. Only envelope problems produce an error status.

use crate::server::{
    config::ServerConfig,
    telemetry::{
        increment_item_failures, increment_rejected_batches, record_batch, record_batch_duration,
    },
};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ctlprog_core::{
    BatchRequest, BatchResponse, Dispatcher, Error, MemoryAccounts, TraceContext, TraceId,
    WireError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Header whose UUID value, if any, becomes the batch's root trace id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state of the HTTP service.
///
/// Cheap to clone; axum clones it for every request.
#[derive(Clone)]
pub struct ControlProgramService {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher<MemoryAccounts>,
}

impl ControlProgramService {
    /// Creates the service with an in-memory registry seeded from
    /// `config.accounts`.
    pub fn new(config: ServerConfig) -> Self {
        let accounts = MemoryAccounts::from_pairs(config.accounts.iter().cloned());
        tracing::debug!(accounts = accounts.len(), "seeded account registry");
        Self {
            config: Arc::new(config),
            dispatcher: Dispatcher::new(Arc::new(accounts)),
        }
    }
}

pub fn router(service: ControlProgramService) -> Router {
    Router::new()
        .route("/create-control-program", post(create_control_programs))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Body of every non-200 response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: WireError,
}

/// Envelope-level failure, rendered with the status from its classification.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidRequest {
            reason: rejection.body_text(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let info = self.0.classify();
        let status =
            StatusCode::from_u16(info.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorBody {
                error: WireError::from(info),
            }),
        )
            .into_response()
    }
}

async fn create_control_programs(
    State(service): State<ControlProgramService>,
    headers: HeaderMap,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(batch) = body.inspect_err(|e| {
        increment_rejected_batches();
        tracing::debug!("rejected batch envelope: {e}");
    })?;

    let items = batch.requests.len();
    let max = service.config.max_batch_size;
    if items > max {
        increment_rejected_batches();
        tracing::debug!(items, max, "rejected oversized batch");
        return Err(Error::InvalidRequest {
            reason: format!("batch of {items} requests exceeds the maximum of {max}"),
        }
        .into());
    }

    let root = root_trace(&headers);
    let start = Instant::now();
    record_batch(items);

    let responses = service.dispatcher.dispatch(&root, batch.requests).await;

    let failed = responses.iter().filter(|r| !r.is_success()).count();
    increment_item_failures(failed as u64);
    record_batch_duration(start.elapsed().as_secs_f64() * 1000.0);
    tracing::info!(trace_id = %root.id, items, failed, "batch served");

    Ok(Json(BatchResponse { responses }))
}

async fn health() -> &'static str {
    "ok"
}

/// Uses a UUID `x-request-id` as the root trace id, otherwise starts a fresh
/// root.
fn root_trace(headers: &HeaderMap) -> TraceContext {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<TraceId>().ok())
        .map_or_else(TraceContext::new_root, TraceContext::from_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use core::time::Duration;
    use ctlprog_core::ErrorKind;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn config(max_batch_size: usize) -> ServerConfig {
        ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            max_batch_size,
            accounts: vec![("treasury".to_string(), "acc-1".to_string())],
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    fn app(max_batch_size: usize) -> Router {
        router(ControlProgramService::new(config(max_batch_size)))
    }

    fn post_json(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create-control-program")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn mixed_batch_is_answered_in_order() {
        let body = json!({
            "requests": [
                { "type": "account", "account_alias": "treasury" },
                { "type": "account", "account_alias": "nobody" },
                { "type": "transfer", "amount": 5 },
            ]
        });

        let (status, value) = send(app(10), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let batch: BatchResponse = serde_json::from_value(value).unwrap();
        assert_eq!(batch.responses.len(), 3);
        assert_eq!(
            batch.responses[0]
                .control_program()
                .map(|p| p.account_id.as_str()),
            Some("acc-1")
        );
        assert_eq!(
            batch.responses[1].error().map(|e| e.kind),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(
            batch.responses[2].error().map(|e| e.kind),
            Some(ErrorKind::Unsupported)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_batch_is_ok() {
        let (status, value) = send(app(10), post_json(r#"{"requests":[]}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "responses": [] }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn oversized_batch_is_rejected() {
        let body = json!({
            "requests": [
                { "type": "account", "account_id": "acc-1" },
                { "type": "account", "account_id": "acc-1" },
                { "type": "account", "account_id": "acc-1" },
            ]
        });

        let (status, value) = send(app(2), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"]["kind"], "invalid_request");
        assert_eq!(
            value["error"]["message"],
            "batch of 3 requests exceeds the maximum of 2"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_envelope_is_rejected() {
        let (status, value) = send(app(10), post_json("{ not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"]["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(1).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[test]
    fn request_id_becomes_root_trace() {
        let id = TraceId::new();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, id.to_string().parse().unwrap());
        assert_eq!(root_trace(&headers).id, id);

        headers.insert(REQUEST_ID_HEADER, "not-a-uuid".parse().unwrap());
        assert_ne!(root_trace(&headers).id, id);
    }
}
