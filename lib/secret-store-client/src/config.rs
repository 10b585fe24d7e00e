use crate::error::{Result, SecretStoreError};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_APPROLE_MOUNT: &str = "approle";

/// How the client obtains its session token.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token {
        token: String,
    },
    AppRole {
        role_id: String,
        secret_id: String,
        mount_path: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { .. } => f.debug_struct("Token").field("token", &"***").finish(),
            Self::AppRole {
                role_id,
                mount_path,
                ..
            } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"***")
                .field("mount_path", mount_path)
                .finish(),
        }
    }
}

/// Name form of the authentication strategy, as carried in string configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethodKind {
    Token,
    AppRole,
}

impl FromStr for AuthMethodKind {
    type Err = SecretStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "approle" => Ok(Self::AppRole),
            other => Err(SecretStoreError::Configuration(format!(
                "Unsupported auth method: {}",
                other
            ))),
        }
    }
}

/// TLS material handed to the transport as PEM file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

/// Fully defaulted and validated client configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub namespace: Option<String>,
    pub debug: bool,
    pub tls: Option<TlsConfig>,
}

/// Raw, unvalidated configuration collected by the client builder.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawConfig {
    pub address: Option<String>,
    pub auth_method: Option<String>,
    pub token: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub mount_path: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub cache_enabled: Option<bool>,
    pub cache_ttl: Option<Duration>,
    pub namespace: Option<String>,
    pub debug: Option<bool>,
    pub tls: Option<TlsConfig>,
}

impl RawConfig {
    pub(crate) fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let flag = |name: &str| var(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        let ca_cert = var("VAULT_CACERT");
        let skip_verify = flag("VAULT_SKIP_VERIFY");
        let tls = (ca_cert.is_some() || skip_verify.is_some()).then(|| TlsConfig {
            skip_verify: skip_verify.unwrap_or(false),
            ca_cert,
            client_cert: var("VAULT_CLIENT_CERT"),
            client_key: var("VAULT_CLIENT_KEY"),
        });

        Self {
            address: var("VAULT_ADDR"),
            token: var("VAULT_TOKEN"),
            role_id: var("VAULT_ROLE_ID"),
            secret_id: var("VAULT_SECRET_ID"),
            mount_path: var("VAULT_APPROLE_MOUNT"),
            namespace: var("VAULT_NAMESPACE"),
            debug: flag("VAULT_DEBUG"),
            tls,
            ..Default::default()
        }
    }

    /// Validates and applies defaults. Performs no I/O.
    pub(crate) fn validate(self) -> Result<ClientConfig> {
        let address = self
            .address
            .map(|a| a.trim().trim_end_matches('/').to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SecretStoreError::Configuration("Address is required".to_string()))?;

        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(SecretStoreError::Configuration(format!(
                "Address must start with http:// or https://, got {}",
                address
            )));
        }

        let method = match self.auth_method.as_deref() {
            Some(name) => name.parse::<AuthMethodKind>()?,
            None if self.token.is_some() => AuthMethodKind::Token,
            None if self.role_id.is_some() || self.secret_id.is_some() => AuthMethodKind::AppRole,
            None => {
                return Err(SecretStoreError::Configuration(
                    "Authentication method is required".to_string(),
                ));
            }
        };

        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let credentials = match method {
            AuthMethodKind::Token => Credentials::Token {
                token: non_empty(self.token).ok_or_else(|| {
                    SecretStoreError::Configuration("Token is required for token authentication".to_string())
                })?,
            },
            AuthMethodKind::AppRole => {
                let (Some(role_id), Some(secret_id)) = (non_empty(self.role_id), non_empty(self.secret_id)) else {
                    return Err(SecretStoreError::Configuration(
                        "AppRole authentication requires roleId and secretId".to_string(),
                    ));
                };
                Credentials::AppRole {
                    role_id,
                    secret_id,
                    mount_path: non_empty(self.mount_path)
                        .map(|m| m.trim_matches('/').to_string())
                        .unwrap_or_else(|| DEFAULT_APPROLE_MOUNT.to_string()),
                }
            }
        };

        Ok(ClientConfig {
            address,
            credentials,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            cache_enabled: self.cache_enabled.unwrap_or(true),
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            namespace: non_empty(self.namespace),
            debug: self.debug.unwrap_or(false),
            tls: self.tls,
        })
    }
}
