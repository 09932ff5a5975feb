use std::{fmt, time::Duration};

use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    outcome::{classify_response, classify_transport_error, AttemptOutcome},
    transport::{HttpRequest, ReqwestTransport, Transport},
    CallDescriptor, Config, Result, RetryPolicy, TerminalError,
};

#[cfg(feature = "tracing")]
const LOG_BODY_LIMIT: usize = 512;

/// Drives one logical call to completion: attempts, classification, backoff.
///
/// Holds only immutable state, so a single executor can be shared across
/// concurrent calls (wrap it in an `Arc` or clone it).
#[derive(Clone)]
pub struct RequestExecutor<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    authorization: String,
    policy: RetryPolicy,
}

impl<T> fmt::Debug for RequestExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("authorization", &"<redacted>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl RequestExecutor<ReqwestTransport> {
    /// Creates an executor sending over `reqwest` with the configured timeout.
    pub fn new(config: &Config) -> Self {
        let transport = ReqwestTransport::new(Duration::from_millis(config.timeout_ms()));
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> RequestExecutor<T> {
    /// Creates an executor over a custom transport.
    pub fn with_transport(transport: T, config: &Config) -> Self {
        Self {
            transport,
            base_url: config.base_url().to_owned(),
            authorization: config.authorization(),
            policy: config.retry_policy().clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes a call, retrying transient failures per the retry policy.
    ///
    /// Returns the response body on 2xx, otherwise exactly one
    /// [`TerminalError`].
    pub async fn execute(&self, descriptor: &CallDescriptor) -> Result<Value> {
        self.execute_with_cancel(descriptor, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel` fires,
    /// whether waiting on a response or sleeping between attempts.
    pub async fn execute_with_cancel(
        &self,
        descriptor: &CallDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let endpoint = descriptor.endpoint();
        let request = self.build_request(descriptor);
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;

        if cancel.is_cancelled() {
            return Err(TerminalError::cancelled(endpoint, attempt));
        }

        loop {
            attempt += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts,
                endpoint,
                method = %descriptor.method(),
                "sending request"
            );

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.cancelled(endpoint, attempt));
                }
                sent = self.transport.send(&request) => sent,
            };

            let outcome = match &sent {
                Ok(response) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        attempt,
                        endpoint,
                        method = %descriptor.method(),
                        status = response.status,
                        body = crate::outcome::truncate(&response.body, LOG_BODY_LIMIT),
                        "received response"
                    );
                    classify_response(endpoint, response)
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt,
                        endpoint,
                        method = %descriptor.method(),
                        error = %err,
                        "request failed without response"
                    );
                    classify_transport_error(err)
                }
            };

            let (delay, cause) = match outcome {
                AttemptOutcome::Success(body) => return Ok(body),
                AttemptOutcome::FatalFailure(cause) => {
                    let err = TerminalError::fatal(endpoint, attempt, cause);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, endpoint, error = %err, "not retrying");
                    return Err(err);
                }
                AttemptOutcome::RateLimited {
                    retry_after_ms,
                    cause,
                } => (Duration::from_millis(retry_after_ms), cause),
                AttemptOutcome::RetriableFailure(cause) => {
                    (self.policy.delay_for_attempt(attempt), cause)
                }
            };

            if attempt >= max_attempts {
                let err = TerminalError::exhausted(endpoint, attempt, cause);
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, endpoint, error = %err, "retry attempts exhausted");
                return Err(err);
            }

            #[cfg(feature = "tracing")]
            tracing::info!(
                attempt,
                endpoint,
                delay = ?delay,
                cause = %cause,
                "retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.cancelled(endpoint, attempt));
                }
                _ = sleep(delay) => {}
            }
        }
    }

    fn build_request(&self, descriptor: &CallDescriptor) -> HttpRequest {
        HttpRequest {
            method: descriptor.method(),
            url: format!("{}{}", self.base_url, descriptor.endpoint()),
            query: descriptor.query_pairs(),
            body: descriptor.body().cloned(),
            authorization: self.authorization.clone(),
        }
    }

    fn cancelled(&self, endpoint: &str, attempt: u32) -> TerminalError {
        #[cfg(feature = "tracing")]
        tracing::info!(attempt, endpoint, "request cancelled");
        TerminalError::cancelled(endpoint, attempt)
    }
}
