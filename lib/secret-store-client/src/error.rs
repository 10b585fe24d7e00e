use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecretStoreError>;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{message}: {source}")]
    Authentication {
        message: String,
        #[source]
        source: Box<SecretStoreError>,
    },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Secret key not found: {key} in {path}")]
    KeyNotFound { path: String, key: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Secret store client has been shut down")]
    ShutDown,
}

impl SecretStoreError {
    pub(crate) fn authentication(message: impl Into<String>, source: SecretStoreError) -> Self {
        Self::Authentication {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// HTTP status of the failed request, looking through authentication wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status,
            Self::Authentication { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.retryable,
            Self::Authentication { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// A failed call against the secret store, after classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    /// Absent when no response was received (network failure or timeout).
    pub status: Option<u16>,
    pub retryable: bool,
    pub errors: Vec<String>,
    pub url: String,
}
