mod approle;
mod renewal;
mod token;
mod token_info;

pub(crate) use renewal::TokenRenewalScheduler;
pub use renewal::{ErrorCallback, MIN_RENEWAL_DELAY, RENEWAL_FRACTION, renewal_delay};
pub use token_info::TokenInfo;

use crate::clock::Clock;
use crate::config::Credentials;
use crate::error::{Result, SecretStoreError};
use crate::executor::RequestExecutor;
use crate::metrics::MetricsCollector;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Session state shared by the authenticator, the renewal timer and the executor.
/// Always replaced as a whole so token and expiry never disagree.
pub(crate) type SharedSession = Arc<RwLock<Option<TokenInfo>>>;

/// `auth` block returned by login and renew-self.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: Option<AuthData>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

/// Obtains and renews the session token for the configured strategy.
pub(crate) struct Authenticator {
    credentials: Credentials,
    executor: Arc<RequestExecutor>,
    session: SharedSession,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub(crate) fn new(
        credentials: Credentials,
        executor: Arc<RequestExecutor>,
        session: SharedSession,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            executor,
            session,
            metrics,
            clock,
        }
    }

    /// Logs in with the configured strategy and installs the resulting session.
    pub(crate) async fn authenticate(&self) -> Result<TokenInfo> {
        let info = match &self.credentials {
            Credentials::Token { token } => token::login(&self.executor, &self.session, token, self.clock.now())
                .await
                .map_err(|e| SecretStoreError::authentication("Token authentication failed", e))?,
            Credentials::AppRole {
                role_id,
                secret_id,
                mount_path,
            } => approle::login(&self.executor, mount_path, role_id, secret_id, self.clock.now())
                .await
                .map_err(|e| SecretStoreError::authentication("AppRole authentication failed", e))?,
        };

        self.install(info.clone()).await;
        Ok(info)
    }

    /// Extends the current token via renew-self.
    pub(crate) async fn renew(&self) -> Result<TokenInfo> {
        let response = self
            .executor
            .execute(Method::POST, "/v1/auth/token/renew-self", None)
            .await?;
        let auth = parse_auth(response)?;
        let info = TokenInfo::with_lease(auth.client_token, self.clock.now(), auth.lease_duration);

        self.install(info.clone()).await;
        Ok(info)
    }

    pub(crate) async fn clear(&self) {
        *self.session.write().await = None;
    }

    async fn install(&self, info: TokenInfo) {
        let expires_at = info.expires_at;
        *self.session.write().await = Some(info);
        self.metrics.record_auth(self.clock.now(), expires_at);
    }
}

fn parse_auth(response: serde_json::Value) -> Result<AuthData> {
    let parsed: AuthResponse = serde_json::from_value(response)
        .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid auth response: {}", e)))?;
    parsed
        .auth
        .ok_or_else(|| SecretStoreError::InvalidResponse("Auth response has no auth block".to_string()))
}
