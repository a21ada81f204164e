use std::net::SocketAddr;
use std::time::Duration;

use grantkeeper_core::{AppError, AppResult};

const MIN_INTERVAL_MS: u64 = 1_000;
const MAX_INTERVAL_MS: u64 = 300_000;

/// Google Cloud settings used when real backends are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpConfig {
    pub access_token: Option<String>,
    pub bigquery_endpoint: String,
    pub bigquery_location: String,
    pub directory_endpoint: String,
    pub http_timeout: Duration,
}

/// Runtime configuration of the reconciler worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub central_project: String,
    pub worker_id: String,
    pub interval: Duration,
    pub drift_check_enabled: bool,
    pub joinable_views_enabled: bool,
    pub redis_url: Option<String>,
    pub lease_seconds: u32,
    /// `None` runs with no-op backends.
    pub gcp: Option<GcpConfig>,
    pub metrics_listen_addr: Option<SocketAddr>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let env = EnvLookup { lookup };

        let database_url = env.required("DATABASE_URL")?;
        let central_project = env.required("CENTRAL_DATA_PROJECT")?;
        let worker_id = env
            .optional("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));

        let interval_ms = env.parse("RECONCILER_INTERVAL_MS", 60_000_u64)?;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
            return Err(AppError::Validation(format!(
                "RECONCILER_INTERVAL_MS must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS}"
            )));
        }

        let lease_seconds = env.parse("RECONCILER_LEASE_SECONDS", 300_u32)?;
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "RECONCILER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let database_max_connections = env.parse("DATABASE_MAX_CONNECTIONS", 5_u32)?;
        if database_max_connections == 0 {
            return Err(AppError::Validation(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        let gcp = if env.parse_bool("GCP_BACKENDS_ENABLED", true)? {
            let http_timeout_seconds = env.parse("GCP_HTTP_TIMEOUT_SECONDS", 30_u64)?;
            if http_timeout_seconds == 0 {
                return Err(AppError::Validation(
                    "GCP_HTTP_TIMEOUT_SECONDS must be greater than zero".to_owned(),
                ));
            }

            Some(GcpConfig {
                access_token: env.optional("GCP_ACCESS_TOKEN"),
                bigquery_endpoint: env
                    .optional("BIGQUERY_ENDPOINT")
                    .unwrap_or_else(|| "https://bigquery.googleapis.com/bigquery/v2".to_owned()),
                bigquery_location: env
                    .optional("BIGQUERY_LOCATION")
                    .unwrap_or_else(|| "europe-north1".to_owned()),
                directory_endpoint: env.optional("DIRECTORY_ENDPOINT").unwrap_or_else(|| {
                    "https://admin.googleapis.com/admin/directory/v1".to_owned()
                }),
                http_timeout: Duration::from_secs(http_timeout_seconds),
            })
        } else {
            None
        };

        let metrics_listen_addr = env
            .optional("METRICS_LISTEN_ADDR")
            .map(|value| {
                value.parse::<SocketAddr>().map_err(|error| {
                    AppError::Validation(format!("METRICS_LISTEN_ADDR is invalid: {error}"))
                })
            })
            .transpose()?;

        Ok(Self {
            database_url,
            database_max_connections,
            central_project,
            worker_id,
            interval: Duration::from_millis(interval_ms),
            drift_check_enabled: env.parse_bool("RECONCILER_DRIFT_CHECK_ENABLED", true)?,
            joinable_views_enabled: env.parse_bool("RECONCILER_JOINABLE_VIEWS_ENABLED", true)?,
            redis_url: env.optional("REDIS_URL"),
            lease_seconds,
            gcp,
            metrics_listen_addr,
        })
    }
}

struct EnvLookup<F> {
    lookup: F,
}

impl<F> EnvLookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, with blank values treated as unset.
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn parse<T>(&self, name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.parse::<T>().map_err(|error| {
                AppError::Validation(format!("{name} must be a valid number: {error}"))
            }),
            None => Ok(default),
        }
    }

    fn parse_bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name).map(|value| value.to_ascii_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(AppError::Validation(format!(
                    "{name} must be a boolean, got '{value}'"
                ))),
            },
        }
    }
}
