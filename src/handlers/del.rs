use crate::error::ApiError;
use crate::handlers::{query_params, split_keys};
use crate::log_info::LogInfo;
use crate::metrics::Endpoint;
use crate::models::{KeysQuery, Reply, ServerResult};
use crate::routes;
use crate::state::AppState;
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::Method,
};

/// DELETE /del handler - Batch delete
#[utoipa::path(
    delete,
    path = routes::DEL,
    params(KeysQuery),
    responses(
        (status = 200, description = "Keys deleted", body = ServerResult),
        (status = 400, description = "No keys or too many keys", body = ServerResult),
        (status = 405, description = "Method is not DELETE", body = ServerResult),
        (status = 500, description = "Store error", body = ServerResult)
    ),
    tag = "kv"
)]
pub async fn del_handler(
    State(state): State<AppState>,
    method: Method,
    query: Result<Query<KeysQuery>, QueryRejection>,
) -> Reply {
    let mut log = LogInfo::new();
    let outcome = delete_keys(&state, &method, query, &mut log).await;
    Reply::from_outcome(outcome, log)
}

async fn delete_keys(
    state: &AppState,
    method: &Method,
    query: Result<Query<KeysQuery>, QueryRejection>,
    log: &mut LogInfo,
) -> Result<ServerResult, ApiError> {
    if method != Method::DELETE {
        return Err(ApiError::MethodNotAllowed("DELETE"));
    }
    let query = query_params(query)?;

    let keys = split_keys(
        query.keys.as_deref(),
        state.config.limits.max_del_keys,
        state.metrics.endpoint(Endpoint::Del),
        log,
    )?;

    if !keys.is_empty() {
        state
            .store
            .batch_delete(keys)
            .await
            .inspect_err(|e| tracing::warn!("BatchDelete failed: {:#}", e))?;
    }

    Ok(ServerResult::ok())
}
