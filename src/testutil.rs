//! Helpers shared by handler and routing tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use parking_lot::Mutex;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

use crate::app;
use crate::config::{Config, Limits, StoreBackend};
use crate::memory::MemoryStore;
use crate::metrics::ProxyMetrics;
use crate::models::ServerResult;
use crate::state::AppState;
use crate::store::{KvPair, RawKvStore};

/// Memory store that counts every call and can be told to fail them all
pub struct RecordingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
    failure: Option<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Number of store operations issued by handlers
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Insert data without counting it as a handler call
    pub async fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.inner
            .batch_put(vec![KvPair::new(key, value)])
            .await
            .expect("seed store");
    }

    pub async fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .batch_get(vec![key.to_string()])
            .await
            .expect("read store")
            .pop()
            .map(|p| p.value)
    }

    fn record(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => bail!("{}", message),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RawKvStore for RecordingStore {
    async fn batch_get(&self, keys: Vec<String>) -> Result<Vec<KvPair>> {
        self.record()?;
        self.inner.batch_get(keys).await
    }

    async fn batch_put(&self, pairs: Vec<KvPair>) -> Result<()> {
        self.record()?;
        self.inner.batch_put(pairs).await
    }

    async fn batch_delete(&self, keys: Vec<String>) -> Result<()> {
        self.record()?;
        self.inner.batch_delete(keys).await
    }

    async fn scan(&self, start_key: &str, limit: usize) -> Result<Vec<KvPair>> {
        self.record()?;
        self.inner.scan(start_key, limit).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

pub fn test_config(limits: Limits) -> Config {
    Config {
        service_host: "127.0.0.1".to_string(),
        service_port: 3000,
        store_backend: StoreBackend::Memory,
        store_connect_timeout: Duration::from_secs(1),
        limits,
        log_sample_rate: 100,
        metrics_log_interval: Duration::ZERO,
    }
}

pub fn test_state(store: Arc<RecordingStore>, limits: Limits) -> AppState {
    AppState {
        store,
        config: Arc::new(test_config(limits)),
        metrics: Arc::new(ProxyMetrics::new()),
    }
}

pub fn test_app(store: Arc<RecordingStore>, limits: Limits) -> Router {
    app::router(test_state(store, limits))
}

/// Send one request and decode the envelope
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, ServerResult) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let result: ServerResult = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("body is not an envelope ({}): {:?}", e, bytes));
    (status, result)
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Route log events of the current thread here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines emitted under `target`
    pub fn lines_for(&self, target: &str) -> Vec<String> {
        let marker = format!(" {}: ", target);
        String::from_utf8_lossy(&self.buf.lock())
            .lines()
            .filter(|line| line.contains(&marker))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
