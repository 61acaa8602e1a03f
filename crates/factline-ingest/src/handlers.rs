use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use factline_core::{validate, RequestFact, ServiceEvent, Topic};
use serde_json::json;

use crate::{auth, AppError, AppState};

/// Steps 1-5 of the request pipeline, shared by every ingestion endpoint:
/// method, content-type, rate limit, auth, body size. Parsing and
/// validation (steps 6-8) are handler-specific.
fn enforce_preamble(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), AppError> {
    if method != Method::POST {
        return Err(AppError::with_status(
            StatusCode::METHOD_NOT_ALLOWED,
            anyhow::anyhow!("method {method} not allowed, expected POST"),
        ));
    }

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        return Err(AppError::with_status(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            anyhow::anyhow!("Content-Type must be application/json, got {content_type}"),
        ));
    }

    if !state.rate_limiter.allow() {
        metrics::counter!("factline_rate_limit_rejections_total").increment(1);
        return Err(AppError::with_status(
            StatusCode::TOO_MANY_REQUESTS,
            anyhow::anyhow!("rate limit exceeded"),
        ));
    }

    let provided_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    if !auth::verify(&state.api_key, provided_key) {
        return Err(AppError::with_status(
            StatusCode::UNAUTHORIZED,
            anyhow::anyhow!("missing or invalid X-API-Key"),
        ));
    }

    if body.len() > state.max_payload_bytes {
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow::anyhow!(
                "body of {} bytes exceeds limit of {} bytes",
                body.len(),
                state.max_payload_bytes
            ),
        ));
    }

    Ok(())
}

fn record_request(endpoint: &'static str, status: StatusCode) {
    metrics::counter!(
        "factline_requests_total",
        "endpoint" => endpoint,
        "status" => status.as_u16().to_string(),
    )
    .increment(1);
}

pub async fn handle_fact(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let result = handle_single(&state, &method, &headers, &body, Topic::RequestFacts).await;
    let status = result
        .as_ref()
        .map(|r| r.status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    record_request("facts", status);
    result
}

pub async fn handle_event(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let result = handle_single(&state, &method, &headers, &body, Topic::ServiceEvents).await;
    let status = result
        .as_ref()
        .map(|r| r.status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    record_request("events", status);
    result
}

async fn handle_single(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: &Bytes,
    topic: Topic,
) -> Result<Response, AppError> {
    enforce_preamble(state, method, headers, body)?;

    let canonical = match topic {
        Topic::RequestFacts => parse_and_canonicalize_fact(body)?,
        Topic::ServiceEvents => parse_and_canonicalize_event(body)?,
    };

    state
        .sink
        .write(topic, &canonical)
        .await
        .map_err(|e| AppError::with_status(StatusCode::INTERNAL_SERVER_ERROR, e.into()))?;

    Ok(StatusCode::CREATED.into_response())
}

fn parse_and_canonicalize_fact(body: &[u8]) -> Result<Vec<u8>, AppError> {
    let fact: RequestFact = serde_json::from_slice(body)
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(e)))?;
    validate::validate_request_fact(&fact)
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(e)))?;
    serde_json::to_vec(&fact).map_err(Into::into)
}

fn parse_and_canonicalize_event(body: &[u8]) -> Result<Vec<u8>, AppError> {
    let event: ServiceEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(e)))?;
    validate::validate_service_event(&event)
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(e)))?;
    serde_json::to_vec(&event).map_err(Into::into)
}

pub async fn handle_facts_batch(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    enforce_preamble(&state, &method, &headers, &body)?;

    if body.is_empty() {
        record_request("facts_batch", StatusCode::BAD_REQUEST);
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("batch body must not be empty"),
        ));
    }

    let mut accepted = 0u32;
    let mut rejected = 0u32;
    let mut errors = Vec::new();

    for (idx, line) in body.split(|&b| b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        match parse_and_canonicalize_fact(line) {
            Ok(canonical) => match state.sink.write(Topic::RequestFacts, &canonical).await {
                Ok(()) => accepted += 1,
                Err(e) => {
                    rejected += 1;
                    errors.push(format!("line {}: sink write failed: {e}", idx + 1));
                }
            },
            Err(e) => {
                rejected += 1;
                errors.push(format!("line {}: {}", idx + 1, e.error));
            }
        }
    }

    record_request("facts_batch", StatusCode::OK);
    Ok((
        StatusCode::OK,
        Json(json!({
            "accepted": accepted,
            "rejected": rejected,
            "errors": errors,
        })),
    )
        .into_response())
}

pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "up")
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.sink.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    use metrics_exporter_prometheus::PrometheusHandle;
    let body: String = PrometheusHandle::render(&state.metrics_handle);
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
