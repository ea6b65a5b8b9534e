//! Process startup: bounded store construction, then the listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::app;
use crate::config::Config;
use crate::metrics::{self, ProxyMetrics};
use crate::state::AppState;
use crate::store::SharedStore;

/// Failures that stop the process before or while serving
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store client construction did not finish within {}ms", .0.as_millis())]
    ClientConstructionTimeout(Duration),
    #[error("failed to connect to store: {:#}", .0)]
    Connect(anyhow::Error),
    #[error("store client construction aborted: {0}")]
    ConstructionAborted(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run `construct` on its own task and wait for it at most `deadline`.
///
/// On timeout the task is abandoned, not cancelled: it keeps running in the
/// background and whatever it eventually produces is dropped. Construction
/// code therefore must not rely on being stopped at the deadline.
pub async fn build_with_deadline<T, F>(deadline: Duration, construct: F) -> Result<T, StartupError>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(construct);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(Ok(client))) => Ok(client),
        Ok(Ok(Err(e))) => Err(StartupError::Connect(e)),
        Ok(Err(join_error)) => Err(StartupError::ConstructionAborted(join_error.to_string())),
        Err(_) => Err(StartupError::ClientConstructionTimeout(deadline)),
    }
}

/// Start the proxy and serve until `shutdown` resolves.
///
/// The store handle is built under the configured deadline before anything
/// binds; a failed or slow construction returns without ever listening. On
/// shutdown the store is closed exactly once.
pub async fn run<C, Fut, S>(config: Arc<Config>, connect: C, shutdown: S) -> Result<(), StartupError>
where
    C: FnOnce(Arc<Config>) -> Fut,
    Fut: Future<Output = anyhow::Result<SharedStore>> + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let store = build_with_deadline(config.store_connect_timeout, connect(config.clone())).await?;
    tracing::info!("Store client ready");

    let addr = format!("{}:{}", config.service_host, config.service_port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => {
            close_store(&store).await;
            return Err(StartupError::Bind { addr, source });
        }
    };
    if let Ok(local) = listener.local_addr() {
        tracing::info!("Listening on {}", local);
    }

    let metrics = Arc::new(ProxyMetrics::new());
    let reporter = metrics::spawn_reporter(metrics.clone(), config.metrics_log_interval);

    let state = AppState {
        store: store.clone(),
        config,
        metrics,
    };
    let served = axum::serve(
        listener,
        app::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    close_store(&store).await;
    tracing::info!("Proxy stopped");

    served.map_err(StartupError::Serve)
}

async fn close_store(store: &SharedStore) {
    if let Err(e) = store.close().await {
        tracing::warn!("Failed to close store: {:#}", e);
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
