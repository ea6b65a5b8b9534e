use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the Spanner-backed raw store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannerConfig {
    pub emulator_host: Option<String>,
    pub project: String,
    pub instance: String,
    pub database: String,
}

impl SpannerConfig {
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Spanner(SpannerConfig),
    Memory,
}

/// Per-operation key-count limits. Zero or negative means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_get_keys: i32,
    pub max_del_keys: i32,
    pub max_set_keys: i32,
}

impl Limits {
    pub fn exceeded(limit: i32, count: usize) -> bool {
        limit > 0 && count > limit as usize
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service_host: String,
    pub service_port: u16,
    pub store_backend: StoreBackend,
    pub store_connect_timeout: Duration,
    pub limits: Limits,
    /// Percentage of requests that produce an access log line (0-100)
    pub log_sample_rate: u32,
    /// Zero disables the periodic metrics report
    pub metrics_log_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_host = lookup("SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let service_port: u16 = parse_or(&lookup, "SERVICE_PORT", 3000)?;
        if service_port == 0 {
            return Err(invalid("SERVICE_PORT", "0", "port must be non-zero"));
        }

        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("spanner") => StoreBackend::Spanner(SpannerConfig {
                emulator_host: lookup("SPANNER_EMULATOR_HOST"),
                project: required(&lookup, "SPANNER_PROJECT")?,
                instance: required(&lookup, "SPANNER_INSTANCE")?,
                database: required(&lookup, "SPANNER_DATABASE")?,
            }),
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(invalid(
                    "STORE_BACKEND",
                    other,
                    "expected 'spanner' or 'memory'",
                ));
            }
        };

        let connect_timeout_ms: u64 = parse_or(&lookup, "STORE_CONNECT_TIMEOUT_MS", 5000)?;
        if connect_timeout_ms == 0 {
            return Err(invalid(
                "STORE_CONNECT_TIMEOUT_MS",
                "0",
                "timeout must be positive",
            ));
        }

        let limits = Limits {
            max_get_keys: parse_or(&lookup, "MAX_GET_KEYS", 0)?,
            max_del_keys: parse_or(&lookup, "MAX_DEL_KEYS", 0)?,
            max_set_keys: parse_or(&lookup, "MAX_SET_KEYS", 0)?,
        };

        let log_sample_rate: u32 = parse_or(&lookup, "LOG_SAMPLE_RATE", 100)?;
        if log_sample_rate > 100 {
            return Err(invalid(
                "LOG_SAMPLE_RATE",
                &log_sample_rate.to_string(),
                "must be between 0 and 100",
            ));
        }

        let metrics_interval_secs: u64 = parse_or(&lookup, "METRICS_LOG_INTERVAL_SECS", 60)?;

        Ok(Config {
            service_host,
            service_port,
            store_backend,
            store_connect_timeout: Duration::from_millis(connect_timeout_ms),
            limits,
            log_sample_rate,
            metrics_log_interval: Duration::from_secs(metrics_interval_secs),
        })
    }

    pub fn log_startup(&self) {
        tracing::info!("Configuration loaded:");
        match &self.store_backend {
            StoreBackend::Spanner(spanner) => {
                tracing::info!("  Store backend: spanner");
                tracing::info!(
                    "  Spanner emulator: {}",
                    spanner
                        .emulator_host
                        .as_deref()
                        .unwrap_or("disabled (using production)")
                );
                tracing::info!("  Spanner database: {}", spanner.database_path());
            }
            StoreBackend::Memory => tracing::info!("  Store backend: memory"),
        }
        tracing::info!("  Store connect timeout: {:?}", self.store_connect_timeout);
        tracing::info!(
            "  Key limits: get={} del={} set={}",
            self.limits.max_get_keys,
            self.limits.max_del_keys,
            self.limits.max_set_keys
        );
        tracing::info!("  Log sample rate: {}%", self.log_sample_rate);
        tracing::info!("  Service listening on: {}:{}", self.service_host, self.service_port);
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
