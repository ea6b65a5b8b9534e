//! In-process request metrics.
//!
//! Each endpoint owns a fixed set of monotonic counters plus a latency timer.
//! Counters use `Ordering::Relaxed`: every counter is independent and only
//! read for periodic reporting. Shipping the numbers to a time-series backend
//! is left to whatever scrapes the periodic report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;

/// Number of latency samples kept per endpoint for percentiles.
const LATENCY_WINDOW: usize = 1024;

/// The instrumented endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Ping,
    Get,
    Del,
    Set,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [Endpoint::Ping, Endpoint::Get, Endpoint::Del, Endpoint::Set];

    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Ping => "ping",
            Endpoint::Get => "get",
            Endpoint::Del => "del",
            Endpoint::Set => "set",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// How a response status counts toward error rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Success,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

/// Sliding window of recent latencies in microseconds
struct LatencyWindow {
    inner: Mutex<WindowInner>,
}

struct WindowInner {
    buf: Vec<u64>,
    pos: usize,
}

impl LatencyWindow {
    fn new() -> Self {
        Self {
            inner: Mutex::new(WindowInner {
                buf: Vec::with_capacity(LATENCY_WINDOW),
                pos: 0,
            }),
        }
    }

    fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < LATENCY_WINDOW {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % LATENCY_WINDOW;
    }

    fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted = self.inner.lock().buf.clone();
        if sorted.is_empty() {
            return LatencyPercentiles::default();
        }
        sorted.sort_unstable();
        let at = |p: usize| sorted[((sorted.len() * p).div_ceil(100)).saturating_sub(1)];
        LatencyPercentiles {
            p50: at(50),
            p95: at(95),
            p99: at(99),
        }
    }
}

/// Counters for a single endpoint
pub struct EndpointMetrics {
    requests: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    keys: AtomicU64,
    bytes: AtomicU64,
    latency_count: AtomicU64,
    latency_total_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_window: LatencyWindow,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            keys: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_window: LatencyWindow::new(),
        }
    }

    pub fn mark_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us.fetch_add(us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(us, Ordering::Relaxed);
        self.latency_window.record(us);
    }

    /// Count error responses; successes only show up in `requests`.
    pub fn record_status(&self, status: StatusCode) {
        match StatusClass::of(status) {
            StatusClass::ClientError => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            StatusClass::ServerError => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            StatusClass::Success => {}
        }
    }

    /// Keys named by a request
    pub fn mark_keys(&self, count: usize) {
        self.keys.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Key plus value bytes moved by a request
    pub fn mark_bytes(&self, count: usize) {
        self.bytes.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let latency_total_us = self.latency_total_us.load(Ordering::Relaxed);
        EndpointSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            keys: self.keys.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            latency_count,
            avg_latency_us: if latency_count == 0 {
                0
            } else {
                latency_total_us / latency_count
            },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            percentiles: self.latency_window.percentiles(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointSnapshot {
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub keys: u64,
    pub bytes: u64,
    pub latency_count: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub percentiles: LatencyPercentiles,
}

/// Metrics for every endpoint, shared through the application state
pub struct ProxyMetrics {
    endpoints: [EndpointMetrics; 4],
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self {
            endpoints: std::array::from_fn(|_| EndpointMetrics::new()),
        }
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> &EndpointMetrics {
        &self.endpoints[endpoint.index()]
    }

    /// Log a snapshot of every endpoint that has seen traffic
    pub fn log_snapshot(&self) {
        for endpoint in Endpoint::ALL {
            let s = self.endpoint(endpoint).snapshot();
            if s.requests == 0 {
                continue;
            }
            tracing::info!(
                target: "metrics",
                endpoint = endpoint.as_str(),
                requests = s.requests,
                client_errors = s.client_errors,
                server_errors = s.server_errors,
                keys = s.keys,
                bytes = s.bytes,
                avg_us = s.avg_latency_us,
                max_us = s.max_latency_us,
                p50_us = s.percentiles.p50,
                p95_us = s.percentiles.p95,
                p99_us = s.percentiles.p99,
                "endpoint metrics"
            );
        }
    }
}

/// Log metric snapshots every `interval` until the task is aborted.
pub fn spawn_reporter(
    metrics: std::sync::Arc<ProxyMetrics>,
    interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            metrics.log_snapshot();
        }
    }))
}
