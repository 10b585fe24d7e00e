use crate::config::TlsConfig;
use crate::error::SecretStoreError;
use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;

/// A single HTTP call as seen by the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response at all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// The fetch primitive the client sends every request through.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default transport built on reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(tls: Option<&TlsConfig>) -> Result<Self, SecretStoreError> {
        let mut builder = reqwest::Client::builder();

        if let Some(tls) = tls {
            if tls.skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
            if let Some(ref path) = tls.ca_cert {
                let pem = read_pem(path)?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| SecretStoreError::Configuration(format!("Invalid CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
            match (&tls.client_cert, &tls.client_key) {
                (Some(cert_path), Some(key_path)) => {
                    let mut pem = read_pem(cert_path)?;
                    pem.extend_from_slice(b"\n");
                    pem.extend(read_pem(key_path)?);
                    let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                        SecretStoreError::Configuration(format!("Invalid client certificate: {}", e))
                    })?;
                    builder = builder.identity(identity);
                }
                (None, None) => {}
                _ => {
                    return Err(SecretStoreError::Configuration(
                        "TLS client certificate and key must be provided together".to_string(),
                    ));
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| SecretStoreError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, SecretStoreError> {
    std::fs::read(path)
        .map_err(|e| SecretStoreError::Configuration(format!("Failed to read {}: {}", path, e)))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
