//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_COMPLETED_TTL_SECS: &str = "IMGJOBS_COMPLETED_TTL_SECS";
pub const ENV_DEQUEUE_TIMEOUT_MS: &str = "IMGJOBS_DEQUEUE_TIMEOUT_MS";

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_DEQUEUE_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Settings shared by registry hosts and dispatch workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub redis_url: String,
    /// TTL given to a job hash once it is completed. `None` keeps it forever.
    pub completed_job_ttl: Option<Duration>,
    /// How long a worker waits on an empty dispatch queue before re-checking
    /// for shutdown.
    pub dequeue_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            completed_job_ttl: None,
            dequeue_timeout: Duration::from_millis(DEFAULT_DEQUEUE_TIMEOUT_MS),
        }
    }
}

impl RegistryConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variables; unset ones fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_REDIS_URL).filter(|v| !v.trim().is_empty()) {
            config.redis_url = url.trim().to_string();
        }

        if let Some(secs) = lookup(ENV_COMPLETED_TTL_SECS) {
            let secs = parse_u64(ENV_COMPLETED_TTL_SECS, &secs)?;
            // 0 means "never expire".
            config.completed_job_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(ms) = lookup(ENV_DEQUEUE_TIMEOUT_MS) {
            let ms = parse_u64(ENV_DEQUEUE_TIMEOUT_MS, &ms)?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: ENV_DEQUEUE_TIMEOUT_MS,
                    message: "must be greater than zero".to_string(),
                });
            }
            config.dequeue_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_completed_job_ttl(mut self, ttl: Duration) -> Self {
        self.completed_job_ttl = Some(ttl);
        self
    }
}

fn parse_u64(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        var,
        message: format!("'{raw}': {e}"),
    })
}
