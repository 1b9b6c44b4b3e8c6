//! Type-safe configuration with validation.
//!
//! Everything is read from environment variables (after loading `.env`)
//! and validated once at startup. The verifier library itself never reads
//! the environment; it is handed a `VerifierConfig` built from here.

use crud_contract::{AcceptedStatuses, EnvelopeKeys, VerifierConfig};
use rust_common::{HttpConfig, RetryConfig, RetryPolicy, TracingConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default DataSource collection endpoint.
pub const DEFAULT_API_URL: &str = "http://localhost:5001/api/v1/DataSource";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Variable holding the URL
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Zero timeout
    #[error("Invalid timeout {0}: must be greater than 0")]
    InvalidTimeout(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Verification tool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// DataSource collection URL
    pub api_url: Url,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Pause after create and delete before reading
    pub settle_delay: Duration,
    /// Audit actor sent as `deletedBy`, `None` to omit the parameter
    pub deleted_by: Option<String>,
    /// Readiness probes before the run, 0 to skip waiting
    pub ready_attempts: u32,
    /// Pause between readiness probes
    pub ready_interval: Duration,
    /// Log level filter
    pub log_level: String,
    /// JSON log output
    pub log_json: bool,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            api_url: parse_url(&lookup, "DATASOURCE_API_URL", DEFAULT_API_URL)?,
            request_timeout: Duration::from_secs(parse(&lookup, "VERIFIER_TIMEOUT_SECS", 10)?),
            connect_timeout: Duration::from_secs(parse(
                &lookup,
                "VERIFIER_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            settle_delay: Duration::from_millis(parse(&lookup, "VERIFIER_SETTLE_MS", 500)?),
            deleted_by: Some(
                lookup("VERIFIER_DELETED_BY")
                    .map_or_else(|| "AutoTest".to_string(), |v| v.trim().to_string()),
            )
            .filter(|v| !v.is_empty()),
            ready_attempts: parse(&lookup, "VERIFIER_READY_ATTEMPTS", 0)?,
            ready_interval: Duration::from_millis(parse(
                &lookup,
                "VERIFIER_READY_INTERVAL_MS",
                2000,
            )?),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse(&lookup, "LOG_JSON", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.api_url.scheme(), "http" | "https") || self.api_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl {
                field: "DATASOURCE_API_URL".to_string(),
                reason: format!("expected an http(s) URL, got {}", self.api_url),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("VERIFIER_TIMEOUT_SECS".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "VERIFIER_CONNECT_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP client settings.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.request_timeout)
            .with_connect_timeout(self.connect_timeout)
    }

    /// Settings for the CRUD verifier.
    #[must_use]
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            base_url: self.api_url.clone(),
            http: self.http_config(),
            settle_delay: self.settle_delay,
            envelope: EnvelopeKeys::default(),
            deleted_by: self.deleted_by.clone(),
            accepted: AcceptedStatuses::default(),
        }
    }

    /// Readiness policy, if waiting is enabled.
    #[must_use]
    pub fn readiness_policy(&self) -> Option<RetryPolicy> {
        (self.ready_attempts > 0).then(|| {
            RetryPolicy::new(RetryConfig::fixed(self.ready_attempts, self.ready_interval))
        })
    }

    /// Tracing settings for the named tool.
    #[must_use]
    pub fn tracing_config(&self, service_name: &str) -> TracingConfig {
        let config = TracingConfig::default()
            .with_service_name(service_name)
            .with_log_level(&self.log_level);
        if self.log_json {
            config.with_json_output()
        } else {
            config
        }
    }
}

/// Parse a variable with a default value.
fn parse<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a URL variable with a default value.
fn parse_url<F>(lookup: &F, name: &str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url_str = lookup(name).unwrap_or_else(|| default.to_string());
    Url::parse(url_str.trim()).map_err(|e| ConfigError::InvalidUrl {
        field: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.api_url.as_str(), DEFAULT_API_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.deleted_by.as_deref(), Some("AutoTest"));
        assert!(config.readiness_policy().is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_api_url_override() {
        let config = from_vars(&[("DATASOURCE_API_URL", "https://staging.example.com/api/v2/sources")]).unwrap();
        let verifier = config.verifier_config();
        assert_eq!(verifier.base_url.as_str(), "https://staging.example.com/api/v2/sources");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            from_vars(&[("DATASOURCE_API_URL", "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            from_vars(&[("DATASOURCE_API_URL", "ftp://example.com/sources")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            from_vars(&[("VERIFIER_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            from_vars(&[("VERIFIER_SETTLE_MS", "soon")]),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            from_vars(&[("LOG_JSON", "yes please")]),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_empty_deleted_by_disables_audit() {
        let config = from_vars(&[("VERIFIER_DELETED_BY", "")]).unwrap();
        assert_eq!(config.deleted_by, None);
        assert_eq!(config.verifier_config().deleted_by, None);
    }

    #[test]
    fn test_readiness_policy() {
        let config = from_vars(&[
            ("VERIFIER_READY_ATTEMPTS", "30"),
            ("VERIFIER_READY_INTERVAL_MS", "2000"),
        ])
        .unwrap();
        let policy = config.readiness_policy().unwrap();
        assert_eq!(policy.max_retries(), 29);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
    }

    #[test]
    fn test_tracing_config() {
        let config = from_vars(&[("LOG_LEVEL", "debug"), ("LOG_JSON", "true")]).unwrap();
        let tracing = config.tracing_config("verify-empty");
        assert_eq!(tracing.service_name, "verify-empty");
        assert_eq!(tracing.log_level, "debug");
        assert!(tracing.json_output);
    }
}
