use std::time::Duration;

use upscale_upscayl::api::UpscaylConfig;
use upscale_upscayl::manager::ManagerConfig;

/// Server configuration loaded from environment variables.
///
/// Everything except the provider credential has a default suitable for
/// running the container as-is.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8046`).
    pub port: u16,
    /// Allowed CORS origins. `["*"]` means any origin, without credentials.
    pub cors_origins: Vec<String>,
    /// Outer HTTP request timeout in seconds (default: `330`).
    pub request_timeout_secs: u64,
    /// Request body limit for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Shared secret required in `X-API-Key` on `/upscale/*`, if set.
    pub service_api_key: Option<String>,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
    /// Upstream provider connection settings.
    pub upscayl: UpscaylConfig,
    /// Correlation layer tunables (sync wait budget, poll cadence).
    pub manager: ManagerConfig,
    /// Task retention job settings.
    pub retention: RetentionConfig,
}

/// Task retention settings.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How long terminal tasks stay pollable after completing.
    pub terminal_ttl: Duration,
    /// Hard cap on any task's age, terminal or not.
    pub max_age: Duration,
    /// How often the retention job runs.
    pub sweep_interval: Duration,
}

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                      |
    /// |--------------------------------|------------------------------|
    /// | `UPSCAYLE_API_KEY`             | (required)                   |
    /// | `UPSCAYLE_API_URL`             | `https://api.upscayl.org`    |
    /// | `UPSCAYLE_FILE_BASE_URL`       | `https://upscayl.org`        |
    /// | `HOST`                         | `0.0.0.0`                    |
    /// | `PORT`                         | `8046`                       |
    /// | `CORS_ORIGINS`                 | `*`                          |
    /// | `REQUEST_TIMEOUT_SECS`         | `330`                        |
    /// | `SYNC_TIMEOUT_SECS`            | `300`                        |
    /// | `SYNC_POLL_INTERVAL_MS`        | `2000`                       |
    /// | `UPSTREAM_SUBMIT_TIMEOUT_SECS` | `30`                         |
    /// | `UPSTREAM_STATUS_TIMEOUT_SECS` | `10`                         |
    /// | `TASK_RETENTION_SECS`          | `3600`                       |
    /// | `TASK_MAX_AGE_SECS`            | `86400`                      |
    /// | `TASK_SWEEP_INTERVAL_SECS`     | `60`                         |
    /// | `MAX_UPLOAD_BYTES`             | `26214400`                   |
    /// | `SERVICE_API_KEY`              | (unset)                      |
    /// | `LOG_FORMAT`                   | `pretty`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("UPSCAYLE_API_KEY").ok_or(ConfigError::Missing("UPSCAYLE_API_KEY"))?;
        let api_url = get("UPSCAYLE_API_URL")
            .unwrap_or_else(|| "https://api.upscayl.org".into())
            .trim_end_matches('/')
            .to_string();
        let file_base_url = get("UPSCAYLE_FILE_BASE_URL")
            .unwrap_or_else(|| "https://upscayl.org".into())
            .trim_end_matches('/')
            .to_string();

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_var(&get, "PORT", 8046)?;

        let cors_origins: Vec<String> = get("CORS_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parse_var(&get, "REQUEST_TIMEOUT_SECS", 330)?;
        let sync_timeout_secs: u64 = parse_var(&get, "SYNC_TIMEOUT_SECS", 300)?;
        let poll_interval_ms: u64 = parse_var(&get, "SYNC_POLL_INTERVAL_MS", 2000)?;
        let submit_timeout_secs: u64 = parse_var(&get, "UPSTREAM_SUBMIT_TIMEOUT_SECS", 30)?;
        let status_timeout_secs: u64 = parse_var(&get, "UPSTREAM_STATUS_TIMEOUT_SECS", 10)?;
        let retention_secs: u64 = parse_var(&get, "TASK_RETENTION_SECS", 3600)?;
        let max_age_secs: u64 = parse_var(&get, "TASK_MAX_AGE_SECS", 86_400)?;
        let sweep_interval_secs: u64 = parse_var(&get, "TASK_SWEEP_INTERVAL_SECS", 60)?;
        let max_upload_bytes: usize = parse_var(&get, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?;

        require_positive("SYNC_TIMEOUT_SECS", sync_timeout_secs)?;
        require_positive("SYNC_POLL_INTERVAL_MS", poll_interval_ms)?;
        require_positive("TASK_SWEEP_INTERVAL_SECS", sweep_interval_secs)?;

        let json_logs = match get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'pretty' or 'json'".into(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            service_api_key: get("SERVICE_API_KEY"),
            json_logs,
            upscayl: UpscaylConfig {
                api_url,
                api_key,
                file_base_url,
                submit_timeout: Duration::from_secs(submit_timeout_secs),
                status_timeout: Duration::from_secs(status_timeout_secs),
            },
            manager: ManagerConfig {
                sync_timeout: Duration::from_secs(sync_timeout_secs),
                poll_interval: Duration::from_millis(poll_interval_ms),
            },
            retention: RetentionConfig {
                terminal_ttl: Duration::from_secs(retention_secs),
                max_age: Duration::from_secs(max_age_secs),
                sweep_interval: Duration::from_secs(sweep_interval_secs),
            },
        })
    }

    /// Whether CORS should allow any origin.
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    /// Whether the outer request timeout leaves room for a full sync wait.
    pub fn request_timeout_covers_sync(&self) -> bool {
        Duration::from_secs(self.request_timeout_secs) > self.manager.sync_timeout
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn require_positive(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}
