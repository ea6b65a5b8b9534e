use crate::log_info::LogInfo;
use crate::models::{Reply, ServerResult};
use crate::routes;
use axum::http::StatusCode;

/// /ping handler - Liveness probe
///
/// Answers every method with `pong` and never touches the store.
#[utoipa::path(
    get,
    path = routes::PING,
    responses(
        (status = 200, description = "Proxy is up", body = ServerResult)
    ),
    tag = "health"
)]
pub async fn ping_handler() -> Reply {
    Reply::new(StatusCode::OK, ServerResult::message("pong"), LogInfo::new())
}
