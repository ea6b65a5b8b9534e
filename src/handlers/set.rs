use crate::codec::ValueFormat;
use crate::config::Limits;
use crate::error::ApiError;
use crate::handlers::query_params;
use crate::log_info::LogInfo;
use crate::metrics::Endpoint;
use crate::models::{FormatQuery, KeyValueBody, Reply, ServerResult};
use crate::routes;
use crate::state::AppState;
use crate::store::KvPair;
use axum::{
    body::Bytes,
    extract::{
        Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{HeaderMap, Method, header::CONTENT_TYPE},
};

/// POST /set handler - Batch write
///
/// One `format` applies to every value in the body.
#[utoipa::path(
    post,
    path = routes::SET,
    params(FormatQuery),
    request_body(content = Vec<KeyValueBody>, content_type = "application/json"),
    responses(
        (status = 200, description = "All pairs written", body = ServerResult),
        (status = 400, description = "Malformed body, invalid pair, bad value encoding or too many keys", body = ServerResult),
        (status = 405, description = "Method is not POST or body is not JSON", body = ServerResult),
        (status = 500, description = "Store error", body = ServerResult)
    ),
    tag = "kv"
)]
pub async fn set_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<FormatQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Reply {
    let mut log = LogInfo::new();
    let outcome = set_values(&state, &method, &headers, query, body, &mut log).await;
    Reply::from_outcome(outcome, log)
}

async fn set_values(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    query: Result<Query<FormatQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
    log: &mut LogInfo,
) -> Result<ServerResult, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed("POST"));
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim();
    if !content_type.starts_with("application/json") {
        return Err(ApiError::UnsupportedContentType);
    }

    let query = query_params(query)?;
    let format_name = query.format.unwrap_or_default();
    log.set("format", format_name.as_str());

    let body = body.map_err(|e| ApiError::UnreadableBody(e.body_text()))?;
    let (pairs, decode_error) = match serde_json::from_slice::<Vec<KeyValueBody>>(&body) {
        Ok(pairs) => (pairs, None),
        Err(e) => (Vec::new(), Some(e)),
    };

    // The limit is checked before a decode error is reported, so a malformed
    // but oversized body is rejected for its size.
    let count = match decode_error {
        Some(_) => recovered_len(&body),
        None => pairs.len(),
    };
    log.set("keys", count);
    let metrics = state.metrics.endpoint(Endpoint::Set);
    metrics.mark_keys(count);

    if Limits::exceeded(state.config.limits.max_set_keys, count) {
        return Err(ApiError::KeyLimitExceeded);
    }
    if let Some(e) = decode_error {
        return Err(ApiError::InvalidBody(e));
    }
    if pairs.is_empty() {
        return Err(ApiError::NoKeys);
    }

    let format = ValueFormat::parse(Some(&format_name))?;

    let mut batch = Vec::with_capacity(pairs.len());
    let mut size = 0usize;
    for pair in pairs {
        if pair.key.is_empty() || pair.value.is_empty() {
            return Err(ApiError::InvalidPair);
        }
        let value = format.encode(&pair.value)?;
        size += pair.key.len() + value.len();
        batch.push(KvPair {
            key: pair.key,
            value,
        });
    }
    log.set("size", size);
    metrics.mark_bytes(size);

    state
        .store
        .batch_put(batch)
        .await
        .inspect_err(|e| tracing::warn!("BatchPut failed: {:#}", e))?;

    Ok(ServerResult::ok())
}

/// Item count of a body that is a JSON array but not of well-formed pairs.
fn recovered_len(body: &[u8]) -> usize {
    serde_json::from_slice::<Vec<serde_json::Value>>(body)
        .map(|items| items.len())
        .unwrap_or(0)
}
