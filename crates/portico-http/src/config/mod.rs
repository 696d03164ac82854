//! Client configuration, backoff tuning and retry policy

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use portico_core::error::PorticoError;
use crate::transport::TransportFailure;
use crate::HttpResult;

/// Configuration for exponential backoff between retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Initial delay before first retry
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after `delay`, capped at `max_delay`
    pub fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64),
            self.max_delay,
        )
    }
}

/// Which transport failures are worth another attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Status codes that trigger a retry
    pub statuses: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_network_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            statuses: vec![408, 413, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_network_error: true,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, failure: &TransportFailure) -> bool {
        match failure {
            TransportFailure::Status { status, .. } => self.statuses.contains(status),
            TransportFailure::Timeout => self.retry_on_timeout,
            TransportFailure::Network { .. } => self.retry_on_network_error,
        }
    }
}

/// Immutable per-client configuration.
///
/// Field names follow the shared configuration surface
/// (`baseURL`, `timeout`, `retry`, `headers`, `token`, `cacheTimeout`);
/// durations are expressed in milliseconds when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Prefix for every relative URL
    #[serde(rename = "baseURL", alias = "baseUrl", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Bound on a single attempt
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retry: u32,
    /// Default headers, overridden by per-call headers
    pub headers: BTreeMap<String, String>,
    /// Initial bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// TTL applied to cached reads
    #[serde(with = "duration_ms")]
    pub cache_timeout: Duration,
    pub backoff: BackoffConfig,
    pub retry_policy: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(10),
            retry: 3,
            headers: BTreeMap::new(),
            token: None,
            cache_timeout: Duration::from_secs(5 * 60),
            backoff: BackoffConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cache_timeout(mut self, cache_timeout: Duration) -> Self {
        self.cache_timeout = cache_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// New config with every set override applied on top of `self`
    pub fn merged(&self, overrides: &ClientOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(base_url) = &overrides.base_url {
            merged.base_url = Some(base_url.clone());
        }
        if let Some(timeout) = overrides.timeout {
            merged.timeout = timeout;
        }
        if let Some(retry) = overrides.retry {
            merged.retry = retry;
        }
        if let Some(headers) = &overrides.headers {
            merged.headers = headers.clone();
        }
        if let Some(token) = &overrides.token {
            merged.token = Some(token.clone());
        }
        if let Some(cache_timeout) = overrides.cache_timeout {
            merged.cache_timeout = cache_timeout;
        }
        if let Some(backoff) = &overrides.backoff {
            merged.backoff = backoff.clone();
        }
        if let Some(retry_policy) = &overrides.retry_policy {
            merged.retry_policy = retry_policy.clone();
        }
        merged
    }

    /// Validate field ranges and the base URL shape
    pub fn validate(&self) -> HttpResult<()> {
        if self.timeout.is_zero() {
            return Err(PorticoError::config("timeout", "timeout must be greater than zero"));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(PorticoError::config(
                "backoff.multiplier",
                format!("multiplier must be at least 1.0, got {}", self.backoff.multiplier),
            ));
        }
        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with('/') {
                url::Url::parse(base_url).map_err(|e| {
                    PorticoError::config("baseURL", format!("'{}' is not a valid URL: {}", base_url, e))
                })?;
            }
        }
        for name in self.headers.keys() {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
                return Err(PorticoError::config("headers", format!("invalid header name '{}'", name)));
            }
        }
        Ok(())
    }
}

/// Partial configuration used by `extend`; unset fields keep their value.
///
/// `headers` replaces the whole default header map when set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOverrides {
    #[serde(rename = "baseURL", alias = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(with = "duration_ms::option")]
    pub timeout: Option<Duration>,
    pub retry: Option<u32>,
    pub headers: Option<BTreeMap<String, String>>,
    pub token: Option<String>,
    #[serde(with = "duration_ms::option")]
    pub cache_timeout: Option<Duration>,
    pub backoff: Option<BackoffConfig>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Millisecond (de)serialization for `Duration` fields
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
