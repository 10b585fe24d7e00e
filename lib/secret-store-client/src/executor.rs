use crate::auth::SharedSession;
use crate::classify::{classify_response, classify_transport};
use crate::error::{Result, SecretStoreError};
use crate::metrics::MetricsCollector;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub(crate) const TOKEN_HEADER: &str = "X-Vault-Token";
pub(crate) const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Delay before retrying after the given zero-based attempt: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

pub(crate) struct ExecutorSettings {
    pub base_url: String,
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub debug: bool,
}

/// Performs one logical request with per-attempt timeout and exponential backoff.
pub(crate) struct RequestExecutor {
    settings: ExecutorSettings,
    transport: Arc<dyn HttpTransport>,
    session: SharedSession,
    metrics: Arc<MetricsCollector>,
}

impl RequestExecutor {
    pub(crate) fn new(
        settings: ExecutorSettings,
        transport: Arc<dyn HttpTransport>,
        session: SharedSession,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            settings,
            transport,
            session,
            metrics,
        }
    }

    /// Sends `method path` and returns the parsed JSON body (`Null` for empty bodies).
    pub(crate) async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let started = Instant::now();
        let result = self.execute_with_retry(method, path, body).await;
        self.metrics.record_request(started.elapsed(), result.is_ok());
        result
    }

    async fn execute_with_retry(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.settings.base_url, path);
        let request = HttpRequest {
            method,
            url: url.clone(),
            headers: self.headers().await,
            body,
        };

        let mut attempt: u32 = 0;
        loop {
            let last_attempt = attempt >= self.settings.max_retries;

            match self.attempt(request.clone()).await {
                Ok(response) if response.is_success() => return parse_body(&response, &url),
                Ok(response) => {
                    let error = classify_response(&response, &url);
                    if !error.retryable || last_attempt {
                        if self.settings.debug {
                            tracing::debug!(url = %url, status = response.status, attempt, "request failed");
                        }
                        return Err(error.into());
                    }
                    if self.settings.debug {
                        tracing::debug!(url = %url, status = response.status, attempt, "retryable response, backing off");
                    }
                }
                Err(e) => {
                    if last_attempt {
                        if self.settings.debug {
                            tracing::debug!(url = %url, error = %e, attempt, "request failed");
                        }
                        return Err(classify_transport(&e, &url, last_attempt).into());
                    }
                    if self.settings.debug {
                        tracing::debug!(url = %url, error = %e, attempt, "transport failure, backing off");
                    }
                }
            }

            tokio::time::sleep(backoff_delay(self.settings.retry_delay, attempt)).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        match tokio::time::timeout(self.settings.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(ref session) = *self.session.read().await {
            headers.push((TOKEN_HEADER.to_string(), session.token.clone()));
        }
        if let Some(ref namespace) = self.settings.namespace {
            headers.push((NAMESPACE_HEADER.to_string(), namespace.clone()));
        }
        headers
    }
}

fn parse_body(response: &HttpResponse, url: &str) -> Result<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body)
        .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid JSON from {}: {}", url, e)))
}
