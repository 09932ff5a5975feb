use std::fmt;

/// Startup configuration error. Fatal: the process does not proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `API_KEY` is absent or blank.
    #[error("missing API_KEY environment variable")]
    MissingApiKey,
    /// A variable is present but could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    /// Retry policy bounds are inconsistent.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

/// Rejected call descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("endpoint must begin with '/': {0:?}")]
    InvalidEndpoint(String),
    #[error("unsupported HTTP method: {0:?}")]
    UnsupportedMethod(String),
    #[error("GET payload must be a JSON object to become query parameters")]
    NonObjectQuery,
}

/// The last classified cause behind a [`TerminalError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// HTTP 404.
    NotFound { endpoint: String },
    /// HTTP 401.
    Unauthorized,
    /// Any other status below 500: 4xx other than 401/404/429, 1xx, and 3xx
    /// redirects the HTTP client did not follow.
    UnexpectedStatus { status: u16, detail: String },
    /// HTTP 5xx.
    ServerError { status: u16, detail: String },
    /// HTTP 429.
    RateLimited { retry_after_ms: u64, detail: String },
    /// No response was received.
    Transport(String),
    /// The request could not be built.
    InvalidRequest(String),
    /// The caller cancelled the call.
    Cancelled,
}

impl Cause {
    /// Returns the most specific human-readable detail for this cause.
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound { endpoint } => format!("endpoint not found: {endpoint}"),
            Self::Unauthorized => "invalid API key".to_owned(),
            Self::UnexpectedStatus { status, detail } | Self::ServerError { status, detail } => {
                with_status(*status, detail)
            }
            Self::RateLimited { detail, .. } => with_status(429, detail),
            Self::Transport(message) | Self::InvalidRequest(message) => message.clone(),
            Self::Cancelled => "cancelled".to_owned(),
        }
    }

    /// HTTP status behind this cause, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized => Some(401),
            Self::UnexpectedStatus { status, .. } | Self::ServerError { status, .. } => {
                Some(*status)
            }
            Self::RateLimited { .. } => Some(429),
            Self::Transport(_) | Self::InvalidRequest(_) | Self::Cancelled => None,
        }
    }
}

/// `HTTP 502: upstream down`, or just `HTTP 502` when the body said nothing.
fn with_status(status: u16, detail: &str) -> String {
    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail())
    }
}

/// The single final failure of one `execute` call.
///
/// Carries no retry affordance: by the time a caller sees it, the executor
/// has either exhausted its attempts or hit a non-retriable classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TerminalError {
    attempts: u32,
    cause: Cause,
    message: String,
}

impl TerminalError {
    /// Error for a classification that is never retried.
    pub(crate) fn fatal(endpoint: &str, attempts: u32, cause: Cause) -> Self {
        let message = match &cause {
            Cause::NotFound { .. } | Cause::Unauthorized => cause.detail(),
            Cause::UnexpectedStatus { .. } => {
                format!("request to {endpoint} rejected with {}", cause.detail())
            }
            other => format!("request to {endpoint} failed: {}", other.detail()),
        };
        Self {
            attempts,
            cause,
            message,
        }
    }

    /// Error after the last allowed attempt failed transiently.
    pub(crate) fn exhausted(endpoint: &str, attempts: u32, cause: Cause) -> Self {
        let message = match &cause {
            Cause::RateLimited { .. } => format!(
                "request to {endpoint} still rate limited after {attempts} attempt(s): {}",
                cause.detail()
            ),
            other => format!(
                "request to {endpoint} failed after {attempts} attempt(s): {}",
                other.detail()
            ),
        };
        Self {
            attempts,
            cause,
            message,
        }
    }

    pub(crate) fn cancelled(endpoint: &str, attempts: u32) -> Self {
        Self {
            attempts,
            cause: Cause::Cancelled,
            message: format!("request to {endpoint} cancelled after {attempts} attempt(s)"),
        }
    }

    /// Number of HTTP attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, Cause::Cancelled)
    }
}
