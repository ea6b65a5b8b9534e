//! Instrumentation layer wrapped around every endpoint.
//!
//! Counts requests, times the handler, classifies the returned status and
//! emits a sampled access log line. It never touches the response body.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use rand::Rng;

use crate::log_info::LogInfo;
use crate::metrics::{Endpoint, ProxyMetrics};

/// Per-request log sampling at a fixed percentage.
///
/// Every request draws independently, so a burst can log more or fewer
/// lines than the nominal rate; only the long-run fraction is `rate / 100`.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    rate: u32,
}

impl Sampler {
    pub fn new(rate: u32) -> Self {
        Self { rate: rate.min(100) }
    }

    pub fn should_log(&self) -> bool {
        self.should_log_with(&mut rand::thread_rng())
    }

    /// Strict `<` so rate 0 never logs and the long-run fraction is exactly `rate / 100`.
    pub fn should_log_with<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen_range(0..100) < self.rate
    }
}

/// State handed to the middleware of one route
#[derive(Clone)]
pub struct Instrumented {
    pub endpoint: Endpoint,
    pub metrics: Arc<ProxyMetrics>,
    pub sampler: Sampler,
}

impl Instrumented {
    pub fn new(endpoint: Endpoint, metrics: Arc<ProxyMetrics>, sampler: Sampler) -> Self {
        Self {
            endpoint,
            metrics,
            sampler,
        }
    }
}

pub async fn instrument(
    State(inst): State<Instrumented>,
    request: Request,
    next: Next,
) -> Response {
    let metrics = inst.metrics.endpoint(inst.endpoint);
    metrics.mark_request();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote = caller_address(request.headers(), peer);
    let accept_encoding = header_str(request.headers(), "accept-encoding").to_string();

    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed();

    let status = response.status();
    metrics.record_latency(elapsed);
    metrics.record_status(status);

    let mut log = response
        .extensions_mut()
        .remove::<LogInfo>()
        .unwrap_or_default();

    if inst.sampler.should_log() {
        log.set("accept_encoding", accept_encoding);
        tracing::info!(
            target: "access",
            method = %method,
            uri = %uri,
            remote = %remote,
            status = status.as_u16(),
            cost_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "{}",
            log
        );
    }

    response
}

/// Caller address for the access log: first `X-Forwarded-For` hop, else the socket peer.
pub fn caller_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or_default();

    if !forwarded.is_empty() {
        return forwarded.to_string();
    }
    peer.map(|addr| addr.to_string()).unwrap_or_else(|| "-".to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
