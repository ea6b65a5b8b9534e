use crate::config::Config;
use crate::metrics::ProxyMetrics;
use crate::store::SharedStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Arc<Config>,
    pub metrics: Arc<ProxyMetrics>,
}
