//! Turns failed responses and transport failures into [`RequestError`]s.

use crate::error::RequestError;
use crate::transport::{HttpResponse, TransportError};

/// Server errors and throttling are worth retrying; every other status is final.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

pub(crate) fn classify_response(response: &HttpResponse, url: &str) -> RequestError {
    let errors = parse_error_body(&response.body);
    let message = if errors.is_empty() {
        format!("Request to {} failed with status {}", url, response.status)
    } else {
        format!(
            "Request to {} failed with status {}: {}",
            url,
            response.status,
            errors.join("; ")
        )
    };

    RequestError {
        message,
        status: Some(response.status),
        retryable: is_retryable_status(response.status),
        errors,
        url: url.to_string(),
    }
}

/// No response was received. Retryable unless it was the final attempt.
pub(crate) fn classify_transport(error: &TransportError, url: &str, last_attempt: bool) -> RequestError {
    RequestError {
        message: format!("Request to {} failed: {}", url, error),
        status: None,
        retryable: !last_attempt,
        errors: vec![error.to_string()],
        url: url.to_string(),
    }
}

/// Best-effort extraction of the backend's `errors` array; falls back to the raw text.
fn parse_error_body(body: &str) -> Vec<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => match map.get("errors") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => vec![trimmed.to_string()],
        },
        _ => vec![trimmed.to_string()],
    }
}
