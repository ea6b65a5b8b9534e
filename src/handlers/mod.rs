pub mod ping;
pub mod get;
pub mod del;
pub mod set;

pub use ping::ping_handler;
pub use get::get_handler;
pub use del::del_handler;
pub use set::set_handler;

use axum::extract::{Query, rejection::QueryRejection};

use crate::config::Limits;
use crate::error::ApiError;
use crate::log_info::LogInfo;
use crate::metrics::EndpointMetrics;

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ApiError::InvalidQuery(e.body_text()))
}

/// Turn the comma separated `keys` parameter into the batch sent to the store.
///
/// The recorded count and the limit check use the raw comma split; blank
/// tokens are dropped only afterwards, so the batch can be smaller than the
/// count that was logged.
fn split_keys(
    raw: Option<&str>,
    limit: i32,
    metrics: &EndpointMetrics,
    log: &mut LogInfo,
) -> Result<Vec<String>, ApiError> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            log.set("keys", 0usize);
            return Err(ApiError::NoKeys);
        }
    };

    let tokens: Vec<&str> = raw.split(',').collect();
    log.set("keys", tokens.len());
    metrics.mark_keys(tokens.len());

    if Limits::exceeded(limit, tokens.len()) {
        return Err(ApiError::KeyLimitExceeded);
    }

    Ok(tokens
        .into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_info::LogValue;
    use crate::metrics::{Endpoint, ProxyMetrics};

    #[test]
    fn test_split_trims_and_drops_blank_tokens() {
        let metrics = ProxyMetrics::new();
        let mut log = LogInfo::new();
        let keys = split_keys(
            Some(" a, ,b ,,"),
            0,
            metrics.endpoint(Endpoint::Get),
            &mut log,
        )
        .unwrap();

        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(log.get("keys"), Some(&LogValue::Int(5)));
        assert_eq!(metrics.endpoint(Endpoint::Get).snapshot().keys, 5);
    }

    #[test]
    fn test_split_rejects_missing_or_empty_parameter() {
        let metrics = ProxyMetrics::new();
        for raw in [None, Some("")] {
            let mut log = LogInfo::new();
            let err = split_keys(raw, 0, metrics.endpoint(Endpoint::Del), &mut log).unwrap_err();
            assert!(matches!(err, ApiError::NoKeys));
        }
    }

    #[test]
    fn test_split_counts_raw_tokens_against_limit() {
        let metrics = ProxyMetrics::new();
        let mut log = LogInfo::new();
        // Three raw tokens even though only two survive trimming.
        let err = split_keys(Some("a,,b"), 2, metrics.endpoint(Endpoint::Get), &mut log)
            .unwrap_err();
        assert!(matches!(err, ApiError::KeyLimitExceeded));
    }

    #[test]
    fn test_split_only_blank_tokens_is_empty_batch() {
        let metrics = ProxyMetrics::new();
        let mut log = LogInfo::new();
        let keys = split_keys(Some(" , "), 0, metrics.endpoint(Endpoint::Get), &mut log).unwrap();
        assert!(keys.is_empty());
    }
}
