use orgscope_core::ScopeError;
use thiserror::Error;

/// Failures while building a client. Request-time failures are reported as
/// [`ScopeError`] so the resolver can classify them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{0}': must start with http:// or https://")]
    InvalidBaseUrl(String),
}

/// Map an HTTP status and response body onto the scope error taxonomy.
pub(crate) fn classify_status(status: u16, body: &str) -> ScopeError {
    let message = platform_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body.trim().chars().take(200).collect()
        }
    });
    match status {
        403 => ScopeError::Permission(message),
        _ => ScopeError::upstream(Some(status), message),
    }
}

/// The platform reports errors as `{"message": "..."}` or `{"error": "..."}`.
fn platform_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub(crate) fn transport_error(e: reqwest::Error) -> ScopeError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    ScopeError::upstream(None, message)
}
