use serde_json::Value;

use crate::{
    transport::{HttpResponse, TransportError},
    Cause,
};

/// Delay used when a 429 carries no usable `retry-after` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const DETAIL_BODY_LIMIT: usize = 512;

/// Classified result of a single HTTP attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    /// 2xx with its parsed body.
    Success(Value),
    /// 5xx or no response; retried while attempts remain.
    RetriableFailure(Cause),
    /// Never retried.
    FatalFailure(Cause),
    /// 429; the server-requested wait replaces the backoff delay.
    RateLimited { retry_after_ms: u64, cause: Cause },
}

/// Classifies a received response.
pub fn classify_response(endpoint: &str, response: &HttpResponse) -> AttemptOutcome {
    match response.status {
        200..=299 => AttemptOutcome::Success(parse_body(&response.body)),
        404 => AttemptOutcome::FatalFailure(Cause::NotFound {
            endpoint: endpoint.to_owned(),
        }),
        401 => AttemptOutcome::FatalFailure(Cause::Unauthorized),
        429 => {
            let retry_after_ms = parse_retry_after(response.retry_after.as_deref());
            AttemptOutcome::RateLimited {
                retry_after_ms,
                cause: Cause::RateLimited {
                    retry_after_ms,
                    detail: error_detail(&response.body),
                },
            }
        }
        // 408 and 409 deliberately share this arm with every other 4xx, as do
        // 1xx and any 3xx the HTTP client did not follow.
        status if status < 500 => AttemptOutcome::FatalFailure(Cause::UnexpectedStatus {
            status,
            detail: error_detail(&response.body),
        }),
        status => AttemptOutcome::RetriableFailure(Cause::ServerError {
            status,
            detail: error_detail(&response.body),
        }),
    }
}

/// Classifies a failure where no response was received.
pub fn classify_transport_error(err: &TransportError) -> AttemptOutcome {
    if err.is_retriable() {
        AttemptOutcome::RetriableFailure(Cause::Transport(err.to_string()))
    } else {
        AttemptOutcome::FatalFailure(Cause::InvalidRequest(err.to_string()))
    }
}

/// Converts a `retry-after` header (whole seconds) into milliseconds.
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
        .saturating_mul(1_000)
}

/// Best available description of a failed response body.
///
/// Prefers a descriptive `error` field, then a `message` field, then the raw
/// body (truncated). Boolean and numeric flags such as `"error": true` are
/// not descriptive and are skipped. Empty when the body carries nothing.
pub fn error_detail(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message"] {
            match map.get(field) {
                Some(Value::String(text)) if !text.trim().is_empty() => return text.clone(),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(text)) = inner.get("message") {
                        return text.clone();
                    }
                    return Value::Object(inner.clone()).to_string();
                }
                Some(list @ Value::Array(items)) if !items.is_empty() => {
                    return list.to_string()
                }
                _ => {}
            }
        }
    }

    truncate(body.trim(), DETAIL_BODY_LIMIT).to_owned()
}

/// 2xx bodies pass through opaque: empty becomes `null`, non-JSON a string.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_owned()))
}

/// Cuts `text` to at most `limit` bytes on a char boundary.
pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
