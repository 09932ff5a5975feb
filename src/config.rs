use std::{fmt, str::FromStr};

use crate::{ConfigError, RetryPolicy};

/// Base URL used when `API_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://api.mailerlite.com/api/v2";

/// Per-attempt timeout used when `REQUEST_TIMEOUT_MS` is not set.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Process-wide settings, read once at startup.
#[derive(Clone, PartialEq)]
pub struct Config {
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    timeout_ms: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Config {
    /// Creates a config with default base URL, retry policy and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            retry: RetryPolicy::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(base_url.as_ref());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Loads the config from process environment variables.
    ///
    /// Reads:
    /// - `API_KEY` (required)
    /// - `API_BASE_URL`
    /// - `RETRY_MAX_ATTEMPTS`, `RETRY_INITIAL_DELAY_MS`, `RETRY_MAX_DELAY_MS`,
    ///   `RETRY_BACKOFF_FACTOR`
    /// - `REQUEST_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the config through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset, except for `API_KEY` where blank
    /// is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = get("API_KEY").ok_or(ConfigError::MissingApiKey)?;
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            parse_var(&get, "RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts()),
            parse_var(&get, "RETRY_INITIAL_DELAY_MS")?.unwrap_or(defaults.initial_delay_ms()),
            parse_var(&get, "RETRY_MAX_DELAY_MS")?.unwrap_or(defaults.max_delay_ms()),
            parse_var(&get, "RETRY_BACKOFF_FACTOR")?.unwrap_or(defaults.backoff_factor()),
        )?;
        let timeout_ms = parse_var(&get, "REQUEST_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut config = Self::new(api_key.trim())
            .with_retry_policy(retry)
            .with_timeout_ms(timeout_ms);
        if let Some(base_url) = get("API_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `Authorization` header value for the key.
    ///
    /// Keys already carrying a `Bearer` scheme (any case) are sent as is.
    pub fn authorization(&self) -> String {
        let key = self.api_key.trim();
        match key.split_once(' ') {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => key.to_owned(),
            _ => format!("Bearer {key}"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

fn parse_var<T, G>(get: &G, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|value| {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::InvalidValue { name, value })
        })
        .transpose()
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_owned()
}
