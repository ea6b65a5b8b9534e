use std::collections::{BTreeMap, HashSet};

use crate::codec::ValueFormat;
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

/// GET /get handler - Batch read of raw values
///
/// Keys missing from the store are left out of `data`.
#[utoipa::path(
    get,
    path = routes::GET,
    params(KeysQuery),
    responses(
        (status = 200, description = "Values found for the requested keys", body = ServerResult),
        (status = 400, description = "No keys, too many keys or unsupported format", body = ServerResult),
        (status = 405, description = "Method is not GET", body = ServerResult),
        (status = 500, description = "Store error", body = ServerResult)
    ),
    tag = "kv"
)]
pub async fn get_handler(
    State(state): State<AppState>,
    method: Method,
    query: Result<Query<KeysQuery>, QueryRejection>,
) -> Reply {
    let mut log = LogInfo::new();
    let outcome = get_values(&state, &method, query, &mut log).await;
    Reply::from_outcome(outcome, log)
}

async fn get_values(
    state: &AppState,
    method: &Method,
    query: Result<Query<KeysQuery>, QueryRejection>,
    log: &mut LogInfo,
) -> Result<ServerResult, ApiError> {
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed("GET"));
    }
    let query = query_params(query)?;

    let metrics = state.metrics.endpoint(Endpoint::Get);
    let keys = split_keys(
        query.keys.as_deref(),
        state.config.limits.max_get_keys,
        metrics,
        log,
    )?;

    let format_name = query.format.unwrap_or_default();
    log.set("format", format_name.as_str());
    let format = ValueFormat::parse(Some(&format_name))?;

    if keys.is_empty() {
        return Ok(ServerResult::data(BTreeMap::new()));
    }

    let requested: HashSet<String> = keys.iter().cloned().collect();
    let key_bytes: usize = keys.iter().map(String::len).sum();

    let pairs = state
        .store
        .batch_get(keys)
        .await
        .inspect_err(|e| tracing::warn!("BatchGet failed: {:#}", e))?;

    let size = key_bytes + pairs.iter().map(|p| p.value.len()).sum::<usize>();
    log.set("size", size);
    metrics.mark_bytes(size);

    let data = pairs
        .into_iter()
        .filter(|pair| requested.contains(&pair.key))
        .map(|pair| {
            let value = format.decode(&pair.value);
            (pair.key, value)
        })
        .collect();

    Ok(ServerResult::data(data))
}

#[cfg(test)]
mod tests {
    use crate::config::Limits;
    use crate::metrics::Endpoint;
    use crate::testutil::{RecordingStore, send, test_app, test_state};
    use axum::http::StatusCode;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn data(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_get_trims_keys() {
        let store = Arc::new(RecordingStore::new());
        store.seed("a", "1").await;
        store.seed("b", "2").await;
        let app = test_app(store.clone(), Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=a,%20,b&format=string", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.status, 0);
        assert_eq!(result.message, None);
        assert_eq!(result.data, data(&[("a", "1"), ("b", "2")]));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_keys_are_absent() {
        let store = Arc::new(RecordingStore::new());
        store.seed("present", "yes").await;
        let app = test_app(store, Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=present,absent", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.data, data(&[("present", "yes")]));
    }

    #[tokio::test]
    async fn test_get_base64_encodes_raw_bytes() {
        let store = Arc::new(RecordingStore::new());
        store.seed("bin", vec![0x00u8, 0xff, 0x10]).await;
        let app = test_app(store, Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=bin&format=base64", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.data, data(&[("bin", "AP8Q")]));
    }

    #[tokio::test]
    async fn test_get_float_arr_passes_through() {
        let store = Arc::new(RecordingStore::new());
        store.seed("vec", "[0.5,1.25]").await;
        let app = test_app(store, Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=vec&format=float_arr", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.data, data(&[("vec", "[0.5,1.25]")]));
    }

    #[tokio::test]
    async fn test_get_wrong_method() {
        let store = Arc::new(RecordingStore::new());
        let app = test_app(store.clone(), Limits::default());

        let (status, result) = send(&app, "POST", "/get?keys=a", None, "").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(result.status, -1);
        assert_eq!(result.message.as_deref(), Some("Only GET is allowed"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_without_keys() {
        let store = Arc::new(RecordingStore::new());
        let app = test_app(store.clone(), Limits::default());

        for uri in ["/get", "/get?keys=", "/get?format=base64"] {
            let (status, result) = send(&app, "GET", uri, None, "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(result.message.as_deref(), Some("no keys"));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_only_blank_keys_skips_store() {
        let store = Arc::new(RecordingStore::new());
        let app = test_app(store.clone(), Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=%20,%20", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.data, Some(BTreeMap::new()));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_over_limit_never_calls_store() {
        let store = Arc::new(RecordingStore::new());
        let limits = Limits {
            max_get_keys: 2,
            ..Limits::default()
        };
        let app = test_app(store.clone(), limits);

        for keys in ["a,b,c", "a,b,c,d,e", ",,"] {
            let (status, result) = send(&app, "GET", &format!("/get?keys={}", keys), None, "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(result.message.as_deref(), Some("key count exceed limit"));
        }

        let (status, _) = send(&app, "GET", "/get?keys=a,b", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_unsupported_format() {
        let store = Arc::new(RecordingStore::new());
        let app = test_app(store.clone(), Limits::default());

        for format in ["hex", "json", "float"] {
            let uri = format!("/get?keys=a&format={}", format);
            let (status, result) = send(&app, "GET", &uri, None, "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                result.message,
                Some(format!("unsupported format: {}", format))
            );
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_repeated_keys_parameter_is_rejected() {
        let store = Arc::new(RecordingStore::new());
        let app = test_app(store.clone(), Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=a&keys=b", None, "").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            result.message.as_deref().unwrap().starts_with("invalid query string"),
            "{:?}",
            result.message
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_store_failure_passes_message() {
        let store = Arc::new(RecordingStore::failing("region 7 unavailable"));
        let app = test_app(store.clone(), Limits::default());

        let (status, result) = send(&app, "GET", "/get?keys=a", None, "").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(result.status, -1);
        assert_eq!(result.message.as_deref(), Some("region 7 unavailable"));
    }

    #[tokio::test]
    async fn test_get_records_key_and_byte_volume() {
        let store = Arc::new(RecordingStore::new());
        store.seed("ab", "1234").await;
        let state = test_state(store, Limits::default());
        let app = crate::app::router(state.clone());

        let (status, _) = send(&app, "GET", "/get?keys=ab,zz", None, "").await;
        assert_eq!(status, StatusCode::OK);

        let snapshot = state.metrics.endpoint(Endpoint::Get).snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.keys, 2);
        // Both request keys plus the one value returned.
        assert_eq!(snapshot.bytes, 2 + 2 + 4);
    }
}
