use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::log_info::LogInfo;

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAILED: i32 = -1;

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ServerResult {
    /// 0 on success, -1 on failure
    pub status: i32,
    #[serde(rename = "msg", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl ServerResult {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn ok() -> Self {
        Self::message("OK")
    }

    pub fn data(data: BTreeMap<String, String>) -> Self {
        Self {
            status: STATUS_OK,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILED,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// One entry of the `set` request body
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct KeyValueBody {
    pub key: String,
    pub value: String,
}

/// Query parameters accepted by `get` and `del`
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeysQuery {
    /// Comma separated list of keys
    pub keys: Option<String>,
    /// Value format: string, base64 or float_arr (`get` only)
    pub format: Option<String>,
}

/// Query parameters accepted by `set`
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FormatQuery {
    /// Value format: string or base64
    pub format: Option<String>,
}

/// Finished handler output: status, envelope and the request's log fields.
///
/// The log fields travel to the instrumentation layer in the response
/// extensions; they never reach the body.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub result: ServerResult,
    pub log: LogInfo,
}

impl Reply {
    pub fn new(status: StatusCode, result: ServerResult, log: LogInfo) -> Self {
        Self { status, result, log }
    }

    /// Build the error envelope and keep its message in the log fields
    pub fn error(status: StatusCode, message: String, mut log: LogInfo) -> Self {
        log.set("message", message.as_str());
        Self::new(status, ServerResult::error(message), log)
    }

    pub fn from_outcome(outcome: Result<ServerResult, ApiError>, log: LogInfo) -> Self {
        match outcome {
            Ok(result) => Self::new(StatusCode::OK, result, log),
            Err(err) => Self::error(err.status_code(), err.to_string(), log),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.result)).into_response();
        response.extensions_mut().insert(self.log);
        response
    }
}
