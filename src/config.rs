//! Operator configuration
//!
//! Read from `RESTORE_OPERATOR_*` environment variables; unset variables
//! fall back to defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::controllers::ExponentialBackoff;
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "RESTORE_OPERATOR_";

/// Runtime settings of the operator
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Number of parallel reconcile workers
    pub workers: usize,
    /// How long startup waits for caches to sync
    pub cache_sync_timeout: Duration,
    /// Retry backoff for failed keys
    pub backoff: ExponentialBackoff,
    /// Port of the metrics and health server
    pub metrics_port: u16,
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cache_sync_timeout: Duration::from_secs(60),
            backoff: ExponentialBackoff::default(),
            metrics_port: 8080,
            namespace: None,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|v| !v.trim().is_empty())
        };

        let workers: usize = parse(&var, "WORKERS")?.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(Error::config(format!("{ENV_PREFIX}WORKERS must be at least 1")));
        }

        let cache_sync_timeout = parse::<u64>(&var, "CACHE_SYNC_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_sync_timeout);

        let base = parse::<u64>(&var, "BACKOFF_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(ExponentialBackoff::DEFAULT_BASE);
        let max = parse::<u64>(&var, "BACKOFF_MAX_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(ExponentialBackoff::DEFAULT_MAX);
        if base.is_zero() || base > max {
            return Err(Error::config(format!(
                "backoff base {:?} must be non-zero and not exceed max {:?}",
                base, max
            )));
        }

        Ok(Self {
            workers,
            cache_sync_timeout,
            backoff: ExponentialBackoff::new(base, max),
            metrics_port: parse(&var, "METRICS_PORT")?.unwrap_or(defaults.metrics_port),
            namespace: var("NAMESPACE"),
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, suffix: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(suffix)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                Error::config(format!("invalid {ENV_PREFIX}{suffix} {:?}: {}", raw, e))
            })
        })
        .transpose()
}
